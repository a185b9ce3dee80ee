//! BLE GATT identifiers and discovery filtering for Rayonics-compatible
//! smart keys.

/// Primary service UUID advertised by the key.
pub const SERVICE_UUID: &str = "0000ff12-0000-1000-8000-00805f9b34fb";
/// Characteristic used for write-without-response command frames.
pub const WRITE_CHARACTERISTIC_UUID: &str = "0000ff01-0000-1000-8000-00805f9b34fb";
/// Characteristic the key notifies responses on.
pub const NOTIFY_CHARACTERISTIC_UUID: &str = "0000ff02-0000-1000-8000-00805f9b34fb";

/// Advertised-name prefixes recognized as Rayonics-compatible hardware.
pub const DEVICE_PREFIXES: &[&str] = &["B03005", "B03009", "B03018", "RayonicsKEY", "LSD4BT"];

/// Returns true if `name` matches one of [`DEVICE_PREFIXES`].
pub fn is_recognized_device(name: &str) -> bool {
    DEVICE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// A device observed during a scan, before any connection is attempted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScannedDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_prefixes() {
        assert!(is_recognized_device("B03005-1234"));
        assert!(is_recognized_device("RayonicsKEY_AB"));
        assert!(!is_recognized_device("SomeOtherDevice"));
    }
}
