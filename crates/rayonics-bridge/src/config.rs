//! Bridge configuration: environment variables (via `.env`, loaded with
//! `dotenvy`) layered under a `config::Config`, the same two-stage
//! loading shape used elsewhere in this workspace.

use anyhow::{Context, Result};
use serde::Deserialize;

fn parse_hex4(s: &str, field: &str) -> Result<[u8; 4]> {
    let bytes = hex::decode(s).with_context(|| format!("{field} is not valid hex"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("{field} must decode to exactly 4 bytes"))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_bind_addr")]
    bind_addr: String,
    #[serde(default = "default_syscode")]
    syscode: String,
    #[serde(default = "default_regcode")]
    regcode: String,
    #[serde(default = "default_scan_secs")]
    scan_seconds: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8765".to_string()
}
fn default_syscode() -> String {
    "11111bfb".to_string()
}
fn default_regcode() -> String {
    "11111bfb".to_string()
}
fn default_scan_secs() -> u64 {
    5
}

/// Resolved bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: String,
    pub syscode: [u8; 4],
    pub regcode: [u8; 4],
    pub scan_duration: std::time::Duration,
}

impl BridgeConfig {
    /// Load `.env` (if present), then layer `RAYONICS_*` environment
    /// variables over the defaults.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw: RawConfig = config::Config::builder()
            .set_default("bind_addr", default_bind_addr())?
            .set_default("syscode", default_syscode())?
            .set_default("regcode", default_regcode())?
            .set_default("scan_seconds", default_scan_secs() as i64)?
            .add_source(config::Environment::with_prefix("RAYONICS"))
            .build()?
            .try_deserialize()?;

        Ok(Self {
            syscode: parse_hex4(&raw.syscode, "syscode")?,
            regcode: parse_hex4(&raw.regcode, "regcode")?,
            bind_addr: raw.bind_addr,
            scan_duration: std::time::Duration::from_secs(raw.scan_seconds),
        })
    }
}
