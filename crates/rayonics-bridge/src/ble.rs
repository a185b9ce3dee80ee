//! Concrete [`BleCentral`]/[`BleLink`] implementation on top of
//! `btleplug`. This is the platform collaborator the protocol crate's
//! transport adapter is written against; everything above this module
//! only ever talks to the traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use rayonics_protocol::device::{is_recognized_device, ScannedDevice, NOTIFY_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID};
use rayonics_protocol::transport::{BleCentral, BleLink};
use rayonics_protocol::{Error, Result};

/// Settle time after subscribing to notifications, before the first
/// write. The firmware drops writes made too soon after subscription.
const POST_SUBSCRIBE_SETTLE: Duration = Duration::from_millis(200);

pub struct BtleplugCentral {
    adapter: Adapter,
}

impl BtleplugCentral {
    pub async fn new() -> anyhow::Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no BLE adapter found on this host"))?;
        Ok(Self { adapter })
    }
}

#[async_trait]
impl BleCentral for BtleplugCentral {
    async fn scan(&self, duration: Duration) -> Result<Vec<ScannedDevice>> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| Error::Link(e.to_string()))?;
        tokio::time::sleep(duration).await;

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| Error::Link(e.to_string()))?;
        let _ = self.adapter.stop_scan().await;

        let mut found = Vec::new();
        for peripheral in peripherals {
            let Some(props) = peripheral
                .properties()
                .await
                .map_err(|e| Error::Link(e.to_string()))?
            else {
                continue;
            };
            let name = props.local_name.unwrap_or_default();
            if is_recognized_device(&name) {
                found.push(ScannedDevice {
                    name,
                    address: peripheral.address().to_string(),
                    rssi: props.rssi,
                });
            }
        }
        debug!(count = found.len(), "scan complete");
        Ok(found)
    }

    async fn connect(&self, address: &str) -> Result<(Arc<dyn BleLink>, mpsc::Receiver<Vec<u8>>)> {
        let peripheral = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| Error::Link(e.to_string()))?
            .into_iter()
            .find(|p| p.address().to_string() == address)
            .ok_or_else(|| Error::Link(format!("device {address} not found; scan first")))?;

        peripheral
            .connect()
            .await
            .map_err(|e| Error::Link(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| Error::Link(e.to_string()))?;

        let write_uuid: Uuid = WRITE_CHARACTERISTIC_UUID
            .parse()
            .expect("write characteristic UUID is a constant");
        let notify_uuid: Uuid = NOTIFY_CHARACTERISTIC_UUID
            .parse()
            .expect("notify characteristic UUID is a constant");

        let characteristics = peripheral.characteristics();
        let write_char = find_characteristic(&characteristics, write_uuid)
            .ok_or_else(|| Error::Link("write characteristic not found on device".into()))?;
        let notify_char = find_characteristic(&characteristics, notify_uuid)
            .ok_or_else(|| Error::Link("notify characteristic not found on device".into()))?;

        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| Error::Link(e.to_string()))?;
        tokio::time::sleep(POST_SUBSCRIBE_SETTLE).await;

        let (tx, rx) = mpsc::channel(32);
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| Error::Link(e.to_string()))?;
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
        });

        let link = BtleplugLink {
            peripheral,
            write_char,
        };
        Ok((Arc::new(link), rx))
    }
}

fn find_characteristic(
    characteristics: &std::collections::BTreeSet<Characteristic>,
    uuid: Uuid,
) -> Option<Characteristic> {
    characteristics.iter().find(|c| c.uuid == uuid).cloned()
}

struct BtleplugLink {
    peripheral: Peripheral,
    write_char: Characteristic,
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let write_type = if self
            .write_char
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };
        self.peripheral
            .write(&self.write_char, data, write_type)
            .await
            .map_err(|e| Error::Link(e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        match self.peripheral.disconnect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "disconnect reported an error, treating as already disconnected");
                Ok(())
            }
        }
    }
}
