//! Command layer: the operations the bridge exposes over an
//! authenticated session, plus the enumerations and record types their
//! responses decode into.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::error::Error;
use crate::session::Session;
use crate::Result;

const CMD_GET_KEY_INFO: u8 = 0x11;
const CMD_GET_KEY_VERSION: u8 = 0x34;
const CMD_GET_EVENT_COUNT: u8 = 0x26;
const CMD_GET_EVENT: u8 = 0x27;
const CMD_CLEAN_EVENT: u8 = 0x28;

/// Pause between sequential event reads so the link doesn't get flooded.
const EVENT_READ_PACING: Duration = Duration::from_millis(150);

/// Hardware key type, as reported in a key-info response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyType(pub u8);

impl KeyType {
    const NAMES: &'static [(u8, &'static str)] = &[
        (0x01, "Standard"),
        (0x02, "Master"),
        (0x03, "Sub-master"),
        (0x04, "Maintenance"),
        (0x05, "Emergency"),
        (0x06, "Guest"),
        (0x07, "Construction"),
        (0x08, "OneTime"),
        (0x09, "Scheduled"),
        (0x0A, "Blacklisted"),
        (0x0B, "Supervisor"),
        (0x0C, "Cleaning"),
        (0x0D, "Delivery"),
        (0x0E, "Fire"),
        (0x0F, "Elevator"),
    ];

    pub fn name(&self) -> Option<&'static str> {
        Self::NAMES.iter().find(|(v, _)| *v == self.0).map(|(_, n)| *n)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "Unknown ({})", self.0),
        }
    }
}

/// An event category, as reported in an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventType(pub u8);

impl EventType {
    const NAMES: &'static [(u8, &'static str)] = &[
        (0x01, "Open Success"),
        (0x02, "Open Failed"),
        (0x03, "Lock"),
        (0x04, "DoorOpen"),
        (0x05, "DoorClose"),
        (0x06, "DoorForced"),
        (0x07, "DoorHeldOpen"),
        (0x08, "LowBattery"),
        (0x09, "BatteryCritical"),
        (0x0A, "TamperAlarm"),
        (0x0B, "KeyBlacklisted"),
        (0x0C, "KeyExpired"),
        (0x0D, "SettingChanged"),
        (0x0E, "ClockSet"),
        (0x0F, "FirmwareUpdate"),
        (0x10, "PowerOn"),
        (0x11, "PowerOff"),
        (0x12, "EventsCleared"),
        (0x13, "Unknown19"),
    ];

    pub fn name(&self) -> Option<&'static str> {
        Self::NAMES.iter().find(|(v, _)| *v == self.0).map(|(_, n)| *n)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

/// Decoded response to GET_KEY_INFO + GET_KEY_VERSION.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key_id: u16,
    pub key_type: u8,
    pub key_type_name: String,
    pub group_id: u16,
    pub verify_day: u16,
    #[serde(rename = "isBleOnline")]
    pub ble_online: bool,
    pub power: u8,
    pub version: String,
}

/// A single decoded event record, not yet attached to the position it
/// was read from.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub key_id: u16,
    pub lock_id: u16,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub event_type: u8,
}

impl EventRecord {
    pub fn time_string(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }

    pub fn event_name(&self) -> String {
        EventType(self.event_type).to_string()
    }
}

/// One slot's outcome during a `read_events` sweep: either the decoded
/// record, or an error tagged with the position it came from. A failure
/// at one position never aborts the rest of the sweep.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum EventSlot {
    Record {
        time: String,
        lock_id: u16,
        key_id: u16,
        event: u8,
        event_name: String,
    },
    Error { pos: u16, error: String },
}

impl EventSlot {
    fn from_record(record: EventRecord) -> Self {
        EventSlot::Record {
            time: record.time_string(),
            lock_id: record.lock_id,
            key_id: record.key_id,
            event: record.event_type,
            event_name: record.event_name(),
        }
    }
}

fn bcd_digit_pair(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

/// GET_KEY_INFO (0x11) followed by GET_KEY_VERSION (0x34).
pub async fn read_key_info(session: &Session) -> Result<KeyInfo> {
    let info = session.command(CMD_GET_KEY_INFO, &[]).await?;
    if info.len() < 10 {
        return Err(Error::Protocol("short GET_KEY_INFO response".into()));
    }
    let key_id = u16::from_le_bytes([info[0], info[1]]);
    let key_type = info[2];
    let group_id = u16::from_le_bytes([info[3], info[4]]);
    let verify_day = u16::from_le_bytes([info[6], info[7]]);
    let ble_online = info[8] != 0;
    let power = info[9];

    let version_payload = session.command(CMD_GET_KEY_VERSION, &[]).await?;
    let version = ascii_until_terminator(&version_payload);

    Ok(KeyInfo {
        key_id,
        key_type,
        key_type_name: KeyType(key_type).to_string(),
        group_id,
        verify_day,
        ble_online,
        power,
        version,
    })
}

/// ASCII-decode `payload` up to (not including) the first NUL byte or
/// the first byte outside the 7-bit ASCII range.
fn ascii_until_terminator(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|&b| b == 0x00 || b > 0x7F)
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

/// GET_EVENT_COUNT (0x26).
pub async fn get_event_count(session: &Session) -> Result<u16> {
    let payload = session.command(CMD_GET_EVENT_COUNT, &[]).await?;
    if payload.len() < 2 {
        return Err(Error::Protocol("short GET_EVENT_COUNT response".into()));
    }
    Ok(u16::from_le_bytes([payload[0], payload[1]]))
}

/// GET_EVENT (0x27) for a single 1-based `position`.
pub async fn get_event(session: &Session, position: u16) -> Result<EventRecord> {
    let request = position.to_le_bytes();
    let payload = session.command(CMD_GET_EVENT, &request).await?;
    if payload.len() < 12 {
        return Err(Error::Protocol("short GET_EVENT response".into()));
    }

    let key_id = u16::from_le_bytes([payload[0], payload[1]]);
    let lock_id = u16::from_le_bytes([payload[3], payload[4]]);
    let year = 2000 + bcd_digit_pair(payload[5]) as u16;
    let month = bcd_digit_pair(payload[6]);
    let day = bcd_digit_pair(payload[7]);
    let hour = bcd_digit_pair(payload[8]);
    let minute = bcd_digit_pair(payload[9]);
    let second = bcd_digit_pair(payload[10]);
    let event_type = payload[11];

    Ok(EventRecord {
        key_id,
        lock_id,
        year,
        month,
        day,
        hour,
        minute,
        second,
        event_type,
    })
}

/// CLEAN_EVENT (0x28): clears the event log.
pub async fn clear_events(session: &Session) -> Result<()> {
    session.command(CMD_CLEAN_EVENT, &[]).await?;
    Ok(())
}

/// Reads every event slot in order, pacing reads 150ms apart. A failure
/// reading one position is recorded as an [`EventSlot::Error`] rather
/// than aborting the sweep. If `clear` is set, clears the log afterward.
pub async fn read_events(session: &Session, clear: bool) -> Result<Vec<EventSlot>> {
    let count = get_event_count(session).await?;
    let mut slots = Vec::with_capacity(count as usize);

    for position in 1..=count {
        match get_event(session, position).await {
            Ok(record) => slots.push(EventSlot::from_record(record)),
            Err(e) => {
                warn!(position, error = %e, "failed to read event");
                slots.push(EventSlot::Error {
                    pos: position,
                    error: e.to_string(),
                });
            }
        }
        if position != count {
            tokio::time::sleep(EVENT_READ_PACING).await;
        }
    }

    if clear {
        clear_events(session).await?;
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcd_decodes_digit_pairs() {
        assert_eq!(bcd_digit_pair(0x24), 24);
        assert_eq!(bcd_digit_pair(0x00), 0);
        assert_eq!(bcd_digit_pair(0x59), 59);
    }

    #[test]
    fn key_type_display_falls_back_for_unknown_values() {
        assert_eq!(KeyType(0x01).to_string(), "Standard");
        assert_eq!(KeyType(0xEE).to_string(), "Unknown (238)");
    }

    #[test]
    fn event_type_display_falls_back_for_unknown_values() {
        assert_eq!(EventType(0x01).to_string(), "Open Success");
        assert_eq!(EventType(0xFE).to_string(), "0xFE");
    }

    #[test]
    fn ascii_terminator_stops_at_nul() {
        assert_eq!(ascii_until_terminator(b"1.2\09999"), "1.2");
    }

    #[test]
    fn ascii_terminator_stops_at_high_byte() {
        assert_eq!(ascii_until_terminator(&[b'v', b'2', 0xFF, b'x']), "v2");
    }

    #[test]
    fn event_record_formats_time_like_the_worked_example() {
        let record = EventRecord {
            key_id: 42,
            lock_id: 5,
            year: 2024,
            month: 1,
            day: 15,
            hour: 14,
            minute: 30,
            second: 0,
            event_type: 0x01,
        };
        assert_eq!(record.time_string(), "2024-01-15 14:30:00");
        assert_eq!(record.event_name(), "Open Success");
    }
}
