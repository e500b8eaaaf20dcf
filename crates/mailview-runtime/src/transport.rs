#![forbid(unsafe_code)]

//! Duplex transport seam.
//!
//! A [`Transport`] opens [`Connection`]s to an [`Endpoint`]. Connections are
//! blocking but must return from [`Connection::recv`] within a bounded time
//! ([`Inbound::Idle`]) so the owning worker can notice cancellation and push
//! outbound values.

use std::fmt;

use url::Url;

/// Address of one logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Parse an endpoint from a string.
    pub fn parse(s: &str) -> Result<Self, url::ParseError> {
        Url::parse(s).map(Self::new)
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Result of one receive poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete text payload.
    Text(String),
    /// Nothing arrived within the poll interval.
    Idle,
    /// The remote end closed the stream gracefully.
    Closed,
}

/// Failures of the underlying transport. All of them are recoverable by
/// reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("handshake with {endpoint} failed: {reason}")]
    Handshake { endpoint: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// One open duplex stream.
pub trait Connection: Send {
    /// Wait up to the connection's poll interval for the next payload.
    fn recv(&mut self) -> Result<Inbound, TransportError>;

    /// Write one text payload.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the stream. Errors are ignored; the stream is gone either way.
    fn close(&mut self);
}

/// Factory for connections.
pub trait Transport: Send + Sync {
    /// Open a new connection to `endpoint`.
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        (**self).connect(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parses_and_displays() {
        let e = Endpoint::parse("ws://localhost:8080/mails/sync/a1").unwrap();
        assert_eq!(e.to_string(), "ws://localhost:8080/mails/sync/a1");
        assert_eq!(e.url().path(), "/mails/sync/a1");
    }

    #[test]
    fn endpoint_rejects_garbage() {
        assert!(Endpoint::parse("not a url").is_err());
    }

    #[test]
    fn io_errors_convert() {
        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, TransportError::Io(ref m) if m.contains("reset")));
    }
}
