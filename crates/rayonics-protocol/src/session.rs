//! Session state machine: owns the CONNECT/VERIFY handshake and the
//! authenticated command channel built on top of a [`GattTransport`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::codec::{build_frame, crc16, parse_frame};
use crate::error::Error;
use crate::session_key::derive_session_key;
use crate::transport::GattTransport;
use crate::Result;

const CMD_CONNECT: u8 = 0x0D;
const CMD_VERIFY: u8 = 0x0F;

/// VERIFY's trailing flag byte. Every known firmware revision expects
/// this exact value; nothing documents what the other bit patterns mean.
const VERIFY_FLAGS: u8 = 0x04;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);
/// Pause between CONNECT's ack and sending VERIFY; the firmware needs a
/// moment to switch from the system key to the derived session key.
const CONNECT_TO_VERIFY_DELAY: Duration = Duration::from_millis(300);

const NONCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Fallback codes tried once if the configured syscode/regcode are
/// rejected at CONNECT.
pub const DEFAULT_SYSCODE: [u8; 4] = [0x36, 0x36, 0x36, 0x36];
pub const DEFAULT_REGCODE: [u8; 4] = [0x31, 0x31, 0x31, 0x31];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    LinkUp,
    HandshakeSent,
    Seeded,
    Authenticated,
    Closing,
}

/// Credentials the session authenticates with.
#[derive(Debug, Clone, Copy)]
pub struct Credentials {
    pub syscode: [u8; 4],
    pub regcode: [u8; 4],
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            syscode: DEFAULT_SYSCODE,
            regcode: DEFAULT_REGCODE,
        }
    }
}

/// A handshake-and-command session over a single connected key.
pub struct Session {
    transport: Arc<GattTransport>,
    state: SessionState,
    session_key: Option<[u8; 16]>,
}

impl Session {
    pub fn new(transport: Arc<GattTransport>) -> Self {
        Self {
            transport,
            state: SessionState::LinkUp,
            session_key: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run CONNECT then VERIFY against `credentials`. If CONNECT rejects
    /// the configured codes, retries exactly once with the hardware's
    /// default codes before giving up.
    pub async fn authenticate(&mut self, credentials: Credentials) -> Result<()> {
        match self.try_authenticate(credentials).await {
            Ok(()) => Ok(()),
            Err(Error::AuthRejected { .. }) if credentials.syscode != DEFAULT_SYSCODE => {
                warn!("configured codes rejected, retrying once with default codes");
                self.state = SessionState::LinkUp;
                self.try_authenticate(Credentials {
                    syscode: DEFAULT_SYSCODE,
                    regcode: DEFAULT_REGCODE,
                })
                .await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_authenticate(&mut self, credentials: Credentials) -> Result<()> {
        let (nonce, seed) = self.connect().await?;

        let mut seed10 = [0u8; 10];
        seed10.copy_from_slice(&seed[0..10]);
        let session_key = derive_session_key(&nonce, &seed10, &credentials.syscode);
        self.session_key = Some(session_key);
        self.state = SessionState::Seeded;
        debug!("derived session key, state -> Seeded");

        tokio::time::sleep(CONNECT_TO_VERIFY_DELAY).await;
        self.verify(&credentials, &session_key).await?;

        self.state = SessionState::Authenticated;
        info!("session authenticated");
        Ok(())
    }

    /// Send CONNECT under the system key and return the host nonce and
    /// the device-returned seed.
    async fn connect(&mut self) -> Result<([u8; 10], [u8; 12])> {
        self.state = SessionState::HandshakeSent;
        debug!("sending CONNECT, state -> HandshakeSent");

        let mut rng = rand::thread_rng();
        let mut nonce = [0u8; 10];
        for b in nonce.iter_mut() {
            *b = NONCE_CHARSET[rng.gen_range(0..NONCE_CHARSET.len())];
        }

        let mut payload = [0u8; 12];
        payload[0..10].copy_from_slice(&nonce);
        payload[10..12].copy_from_slice(&crc16(&nonce).to_le_bytes());

        let frame = build_frame(CMD_CONNECT, &payload, None)?;
        let response = self
            .transport
            .send_and_wait(&frame, HANDSHAKE_TIMEOUT)
            .await?;
        let decoded = parse_frame(&response, None)?;

        match decoded.length {
            15 => {
                let mut seed = [0u8; 12];
                seed.copy_from_slice(&decoded.raw_plain[2..14]);
                Ok((nonce, seed))
            }
            4 => {
                self.state = SessionState::Closing;
                Err(Error::AuthRejected {
                    code: decoded.raw_plain[2],
                })
            }
            other => Err(Error::Protocol(format!(
                "unexpected CONNECT response length {other}"
            ))),
        }
    }

    async fn verify(&mut self, credentials: &Credentials, session_key: &[u8; 16]) -> Result<()> {
        let mut payload = [0u8; 9];
        payload[0..4].copy_from_slice(&credentials.regcode);
        payload[4..8].copy_from_slice(&credentials.syscode);
        payload[8] = VERIFY_FLAGS;

        let frame = build_frame(CMD_VERIFY, &payload, Some(session_key))?;
        let response = self
            .transport
            .send_and_wait(&frame, HANDSHAKE_TIMEOUT)
            .await?;
        let decoded = parse_frame(&response, Some(session_key))?;

        if decoded.raw_plain[2] == 0x00 {
            Ok(())
        } else {
            self.state = SessionState::Closing;
            Err(Error::AuthRejected {
                code: decoded.raw_plain[2],
            })
        }
    }

    /// Send a command under the session key and return its response
    /// payload. Requires the session to be authenticated.
    pub async fn command(&self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Authenticated {
            return Err(Error::NotAuthenticated);
        }
        let key = self
            .session_key
            .as_ref()
            .expect("authenticated session has a key");

        let frame = build_frame(cmd, payload, Some(key))?;
        let response = self.transport.send_and_wait(&frame, COMMAND_TIMEOUT).await?;
        let decoded = parse_frame(&response, Some(key))?;
        Ok(decoded.payload)
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.state = SessionState::Closing;
        self.transport.disconnect().await?;
        self.state = SessionState::Disconnected;
        Ok(())
    }
}
