#![forbid(unsafe_code)]

//! Blocking WebSocket transport.

use std::io;
use std::net::TcpStream;

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};
use web_time::Duration;

use crate::transport::{Connection, Endpoint, Inbound, Transport, TransportError};

/// [`Transport`] over `ws://` endpoints. Other schemes fail the handshake.
///
/// Each connection's socket gets a read timeout of `poll_interval`, so
/// [`Connection::recv`] returns [`Inbound::Idle`] when nothing arrives in
/// time.
#[derive(Debug, Clone)]
pub struct WsTransport {
    poll_interval: Duration,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl WsTransport {
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Transport for WsTransport {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        if endpoint.url().scheme() != "ws" {
            return Err(TransportError::Handshake {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme {:?}", endpoint.url().scheme()),
            });
        }
        let (mut socket, _response) =
            tungstenite::connect(endpoint.as_str()).map_err(|error| match error {
                WsError::Io(error) => TransportError::from(error),
                other => TransportError::Handshake {
                    endpoint: endpoint.to_string(),
                    reason: other.to_string(),
                },
            })?;

        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream.set_read_timeout(Some(self.poll_interval))?;
            stream.set_nodelay(true)?;
        }

        tracing::debug!(
            target: "mailview.channel",
            endpoint = %endpoint,
            "websocket connected"
        );
        Ok(Box::new(WsConnection { socket }))
    }
}

struct WsConnection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    fn recv(&mut self) -> Result<Inbound, TransportError> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Inbound::Text(text.to_string())),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(bytes.as_ref()) {
                Ok(text) => Ok(Inbound::Text(text.to_owned())),
                Err(error) => Err(TransportError::Protocol(format!(
                    "binary frame is not UTF-8: {error}"
                ))),
            },
            Ok(Message::Close(_)) => Ok(Inbound::Closed),
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(Inbound::Idle),
            Err(WsError::Io(error))
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(Inbound::Idle)
            }
            Err(WsError::ConnectionClosed) => Ok(Inbound::Closed),
            Err(WsError::AlreadyClosed) => Err(TransportError::Closed),
            Err(WsError::Io(error)) => Err(error.into()),
            Err(other) => Err(TransportError::Protocol(other.to_string())),
        }
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.to_owned().into()))
            .map_err(|error| match error {
                WsError::Io(error) => TransportError::from(error),
                WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
                other => TransportError::Protocol(other.to_string()),
            })
    }

    fn close(&mut self) {
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }
}
