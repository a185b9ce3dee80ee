use thiserror::Error;

/// Every failure mode the protocol layer can produce.
///
/// The original SDK this was distilled from signals these conditions by
/// raising distinct exception types and letting them unwind past whatever
/// `try`/`except` happens to be listening. There is no such thing here:
/// every fallible operation returns one of these variants, and callers
/// match on it instead of on a string.
#[derive(Debug, Error)]
pub enum Error {
    /// The BLE link itself failed: connect, write or subscribe errored out
    /// below the protocol layer.
    #[error("link error: {0}")]
    Link(String),

    /// A frame was received but does not parse as a valid Rayonics frame
    /// (bad length, bad CRC, wrong frame tag).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response arrived within the allotted window.
    #[error("timed out waiting for response")]
    Timeout,

    /// The device rejected authentication during the CONNECT/VERIFY
    /// handshake. `code` is the raw status byte the device returned.
    #[error("authentication rejected (code {code:#04x})")]
    AuthRejected { code: u8 },

    /// A command was issued before the session reached the
    /// `Authenticated` state.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// The dispatch facade received a well-formed JSON message whose
    /// `action` is not one it understands.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The dispatch facade received a message that doesn't match the
    /// shape an action requires (e.g. `connect` without `address`).
    #[error("bad request: {0}")]
    BadRequest(String),
}
