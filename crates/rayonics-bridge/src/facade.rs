//! Dispatch facade: maps inbound JSON actions onto the session layer and
//! emits outbound JSON messages. Every error any action produces is
//! caught here, logged, and surfaced as a single `error` message rather
//! than left to unwind into the connection handler.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use rayonics_protocol::command;
use rayonics_protocol::device::ScannedDevice;
use rayonics_protocol::session::{Credentials, Session, SessionState};
use rayonics_protocol::transport::{BleCentral, GattTransport};
use rayonics_protocol::{Error, Result};

use crate::config::BridgeConfig;
use crate::message::{Inbound, Outbound};

pub struct Facade {
    central: Arc<dyn BleCentral>,
    config: BridgeConfig,
    scanned: HashMap<String, ScannedDevice>,
    session: Option<Session>,
    device_address: Option<String>,
    out: mpsc::Sender<Outbound>,
}

impl Facade {
    pub fn new(central: Arc<dyn BleCentral>, config: BridgeConfig, out: mpsc::Sender<Outbound>) -> Self {
        Self {
            central,
            config,
            scanned: HashMap::new(),
            session: None,
            device_address: None,
            out,
        }
    }

    async fn emit(&self, message: Outbound) {
        let _ = self.out.send(message).await;
    }

    /// Dispatch one inbound action. Never propagates an error: every
    /// failure becomes a logged `error` message instead.
    pub async fn handle(&mut self, inbound: Inbound) {
        let result = match inbound {
            Inbound::Scan => self.scan().await,
            Inbound::Connect { address } => self.connect(address).await,
            Inbound::Disconnect => self.disconnect().await,
            Inbound::ReadKey => self.read_key().await,
            Inbound::ReadEvents { clear } => self.read_events(clear).await,
            Inbound::ClearEvents => self.clear_events().await,
        };

        if let Err(e) = result {
            error!(error = %e, "action failed");
            self.emit(Outbound::error(e.to_string())).await;
        }
    }

    async fn scan(&mut self) -> Result<()> {
        self.emit(Outbound::log("scanning for keys")).await;
        let devices = self.central.scan(self.config.scan_duration).await?;
        self.scanned = devices
            .iter()
            .cloned()
            .map(|d| (d.address.clone(), d))
            .collect();
        self.emit(Outbound::Devices { devices }).await;
        Ok(())
    }

    async fn connect(&mut self, address: String) -> Result<()> {
        if self.session.is_some() {
            self.disconnect_silent().await;
        }
        if !self.scanned.contains_key(&address) {
            return Err(Error::BadRequest(format!(
                "{address} was not seen in the last scan"
            )));
        }

        self.emit(Outbound::log(format!("connecting to {address}"))).await;
        let (link, notifications) = self.central.connect(&address).await?;
        let transport = Arc::new(GattTransport::new(link, notifications));
        let mut session = Session::new(transport);

        session
            .authenticate(Credentials {
                syscode: self.config.syscode,
                regcode: self.config.regcode,
            })
            .await?;

        self.device_address = Some(address);
        self.session = Some(session);
        self.emit_status().await;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.disconnect_silent().await;
        self.emit_status().await;
        Ok(())
    }

    async fn disconnect_silent(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.disconnect().await;
        }
        self.device_address = None;
    }

    async fn read_key(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotAuthenticated)?;
        let data = command::read_key_info(session).await?;
        self.emit(Outbound::KeyInfo { data }).await;
        Ok(())
    }

    async fn read_events(&mut self, clear: bool) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotAuthenticated)?;
        let data = command::read_events(session, clear).await?;
        self.emit(Outbound::Events { data }).await;
        Ok(())
    }

    async fn clear_events(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotAuthenticated)?;
        command::clear_events(session).await?;
        self.emit(Outbound::log("event log cleared")).await;
        Ok(())
    }

    async fn emit_status(&self) {
        let authenticated = self
            .session
            .as_ref()
            .map(|s| s.state() == SessionState::Authenticated)
            .unwrap_or(false);
        self.emit(Outbound::Status {
            connected: self.session.is_some(),
            authenticated,
            device: self.device_address.clone().unwrap_or_default(),
        })
        .await;
    }

    /// Surface a malformed-inbound-message error, for when the outer
    /// connection handler fails to even parse an action.
    pub async fn emit_error(&self, message: impl Into<String>) {
        self.emit(Outbound::error(message)).await;
    }
}
