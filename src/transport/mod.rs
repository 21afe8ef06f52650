//! Out-of-process transport between traced programs and the collector
//!
//! Each message is one length-delimited TCP frame holding a JSON array
//! `[kind, payload]`. Publishers are fire-and-forget: when nothing is
//! listening their messages are dropped.

mod listener;
mod publisher;
mod recorder;
pub mod wire;

use thiserror::Error;

pub use listener::Listener;
pub use publisher::Publisher;
pub use recorder::Recorder;
pub use wire::WireMessage;

/// Default collector endpoint
pub const DEFAULT_ENDPOINT: &str = "tcp://127.0.0.1:5556";

/// Default bound on messages queued but not yet sent
pub const DEFAULT_HIGH_WATER_MARK: usize = 10_000;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Transport is closed")]
    Closed,
    #[error("Invalid endpoint {0:?}, expected tcp://host:port")]
    InvalidEndpoint(String),
}

/// `host:port` part of a `tcp://host:port` endpoint.
pub fn socket_address(endpoint: &str) -> Result<&str, TransportError> {
    let address = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(address),
        _ => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
    }
}
