//! Transport adapter: wraps a BLE GATT link in a response buffer and a
//! readiness signal so the session layer can `send_and_wait` for a full
//! 19-byte frame instead of juggling notification chunks itself.
//!
//! The actual radio work — scanning, connecting, writing characteristics,
//! subscribing to notifications — is a platform concern and lives behind
//! the [`BleCentral`]/[`BleLink`] traits. This module only owns the
//! buffering and pacing logic that sits on top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::codec::FRAME_LEN;
use crate::device::ScannedDevice;
use crate::error::Error;
use crate::Result;

/// A single open connection to a key, capable of writing command frames
/// and (implicitly, via the channel handed to [`GattTransport::new`])
/// delivering notification chunks.
#[async_trait]
pub trait BleLink: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
}

/// Scanning and connection establishment. Implemented against a real BLE
/// stack outside this crate.
#[async_trait]
pub trait BleCentral: Send + Sync {
    async fn scan(&self, duration: Duration) -> Result<Vec<ScannedDevice>>;

    /// Connect to `address`, subscribe to notifications, and return the
    /// link plus the channel notification chunks arrive on.
    async fn connect(&self, address: &str) -> Result<(Arc<dyn BleLink>, mpsc::Receiver<Vec<u8>>)>;
}

/// Buffers notification chunks into whole frames and exposes a
/// request/response call shape over the raw write/notify primitives.
///
/// Only one `send_and_wait` may be in flight at a time; the internal
/// buffer lock enforces that by serializing callers rather than by
/// rejecting concurrent calls outright, matching the protocol's
/// single-outstanding-command invariant.
pub struct GattTransport {
    link: Arc<dyn BleLink>,
    notifications: Mutex<mpsc::Receiver<Vec<u8>>>,
    buffer: Mutex<Vec<u8>>,
}

impl GattTransport {
    pub fn new(link: Arc<dyn BleLink>, notifications: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            link,
            notifications: Mutex::new(notifications),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Write `frame` and wait up to `timeout` for a full response frame
    /// to accumulate from notifications.
    pub async fn send_and_wait(&self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        self.buffer.lock().await.clear();
        self.link.write(frame).await?;
        self.accumulate_frame(timeout).await
    }

    async fn accumulate_frame(&self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut rx = self.notifications.lock().await;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(chunk)) => {
                    let mut buf = self.buffer.lock().await;
                    buf.extend_from_slice(&chunk);
                    if buf.len() >= FRAME_LEN {
                        let frame = buf[..FRAME_LEN].to_vec();
                        buf.clear();
                        return Ok(frame);
                    }
                }
                Ok(None) => return Err(Error::Link("notification channel closed".into())),
                Err(_) => return Err(Error::Timeout),
            }
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.link.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullLink;

    #[async_trait]
    impl BleLink for NullLink {
        async fn write(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reassembles_frame_split_across_chunks() {
        let (tx, rx) = mpsc::channel(8);
        let transport = GattTransport::new(Arc::new(NullLink), rx);

        let full = vec![0xABu8; FRAME_LEN];
        let (first, second) = full.split_at(10);
        let first = first.to_vec();
        let second = second.to_vec();

        tokio::spawn(async move {
            tx.send(first).await.unwrap();
            tx.send(second).await.unwrap();
        });

        let got = transport
            .send_and_wait(&[0x01], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got, full);
    }

    #[tokio::test]
    async fn times_out_when_nothing_arrives() {
        let (_tx, rx) = mpsc::channel(8);
        let transport = GattTransport::new(Arc::new(NullLink), rx);

        let result = transport
            .send_and_wait(&[0x01], Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
