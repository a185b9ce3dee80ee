//! Rayonics BLE bridge
//!
//! Exposes BLE smart-key hardware to a local WebSocket client as a small
//! JSON action/event protocol.

mod ble;
mod config;
mod facade;
mod message;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rayonics_protocol::transport::BleCentral;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use config::BridgeConfig;
use facade::Facade;
use message::{Inbound, Outbound};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("==============================================");
    info!("   Rayonics BLE bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("==============================================");

    let config = BridgeConfig::load()?;
    let central: Arc<dyn BleCentral> = Arc::new(ble::BtleplugCentral::new().await?);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("new connection from {addr}");
        let central = Arc::clone(&central);
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, central, config).await {
                error!("connection {addr} ended with error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    central: Arc<dyn BleCentral>,
    config: BridgeConfig,
) -> anyhow::Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(32);
    let mut facade = Facade::new(central, config, out_tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = read.next().await {
        let message = message?;
        if !message.is_text() {
            continue;
        }
        let text = message.into_text()?;
        match serde_json::from_str::<Inbound>(&text) {
            Ok(inbound) => facade.handle(inbound).await,
            Err(e) => {
                warn!("could not parse inbound message: {e}");
                facade.emit_error(format!("bad request: {e}")).await;
            }
        }
    }

    drop(facade);
    let _ = writer.await;
    Ok(())
}
