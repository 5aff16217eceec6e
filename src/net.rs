//! The boundary to the byte stream carrying MQTT.

use crate::{
    codec::{ConnectReturnCode, FramingError},
    eio::{self, ErrorKind},
};

/// Underlying transport of MQTT. Must provide an ordered, lossless stream of bytes from client
/// to broker and broker to client.
///
/// The client only tells the transport what to do. Readiness, received bytes and closure are
/// reported back through [`crate::Client::on_ready_to_write`],
/// [`crate::Client::on_bytes_received`] and [`crate::Client::on_closed`].
pub trait Transport {
    /// Error reported by the transport. Its [`ErrorKind`] is surfaced in [`crate::MqttError::Transport`].
    type Error: eio::Error;

    /// Starts opening a connection. Success means the attempt started, not that it completed.
    fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<(), Self::Error>;

    /// Hands over the next bytes of the outgoing stream: the complete wire form of one packet,
    /// or one piece of a PUBLISH whose payload is streamed.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Closes the connection. Must be idempotent.
    fn close(&mut self);
}

/// Why a connection ended. Passed to the disconnect handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisconnectReason {
    /// The transport reported an orderly close.
    Closed,
    /// The transport failed.
    Transport(ErrorKind),
    /// The broker sent bytes that violate the MQTT framing.
    Framing(FramingError),
    /// Nothing was received within the keep alive interval.
    KeepAliveTimeout,
    /// The broker refused the connection in its CONNACK.
    Refused(ConnectReturnCode),
    /// The source of a streamed PUBLISH payload failed mid-packet.
    PayloadSource(ErrorKind),
    /// A DISCONNECT packet requested by the application was sent.
    Requested,
}
