//! Rayonics BLE smart-key protocol.
//!
//! Implements the wire codec, session-key derivation, BLE transport
//! adapter, session state machine and command layer used to talk to
//! Rayonics/compatible BLE smart-key hardware.

pub mod codec;
pub mod command;
pub mod device;
pub mod error;
pub mod session;
pub mod session_key;
pub mod transport;

pub use error::Error;
pub use session::{Session, SessionState};

/// Common result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
