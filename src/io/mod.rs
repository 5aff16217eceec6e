//! Drives a [`Client`] over an `embedded-io-async` byte stream.
//!
//! [`StreamTransport`] collects the bytes the client writes. [`transmit`] moves them into the
//! stream, [`receive`] feeds bytes read from the stream back to the client. Opening the stream
//! to the [`Endpoint`] the client asked for is left to the caller.

use alloc::{string::String, vec::Vec};
use core::fmt;

use crate::{
    client::{Client, MqttError},
    eio::{Error as _, ErrorKind, Read, Write},
    fmt::{debug, trace},
    net::{DisconnectReason, Transport},
    time::Instant,
};

/// Where the client asked to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// A [`Transport`] buffering written packets until [`transmit`] moves them into a stream.
#[derive(Debug, Default)]
pub struct StreamTransport {
    endpoint: Option<Endpoint>,
    outbox: Vec<u8>,
    open: bool,
}

impl StreamTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The endpoint of the last connection attempt.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Whether the client considers the connection open. Once this turns false, the stream
    /// should be closed after a final [`transmit`].
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Removes and returns all bytes written since the last call.
    pub fn take_outbox(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.outbox)
    }
}

impl Transport for StreamTransport {
    type Error = ErrorKind;

    fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<(), Self::Error> {
        self.endpoint = Some(Endpoint {
            host: host.into(),
            port,
            tls,
        });
        self.outbox.clear();
        self.open = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.open {
            return Err(ErrorKind::NotConnected);
        }
        self.outbox.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// An error of [`transmit`] or [`receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<E> {
    /// The stream failed. The client has been notified and is disconnected.
    Network(E),
    /// The client failed.
    Mqtt(MqttError),
}

impl<E> From<MqttError> for StreamError<E> {
    fn from(e: MqttError) -> Self {
        Self::Mqtt(e)
    }
}

impl<E: fmt::Debug> fmt::Display for StreamError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "stream error: {:?}", e),
            Self::Mqtt(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for StreamError<E> {}

/// Transmits everything the client has to send: the pending CONNECT and the whole request
/// queue. Returns the number of bytes written to `net`.
pub async fn transmit<N: Write, const QUEUE_SIZE: usize, const MAX_IN_FLIGHT: usize>(
    client: &mut Client<StreamTransport, QUEUE_SIZE, MAX_IN_FLIGHT>,
    net: &mut N,
    now: Instant,
) -> Result<usize, StreamError<N::Error>> {
    while client.on_ready_to_write(now)?.is_some() {}

    let outbox = client.transport_mut().take_outbox();
    if outbox.is_empty() {
        return Ok(0);
    }

    trace!("transmitting {} bytes", outbox.len());

    if let Err(e) = write_flush(net, &outbox).await {
        debug!("stream failed while writing: {:?}", e.kind());
        client.on_closed(DisconnectReason::Transport(e.kind()));
        return Err(StreamError::Network(e));
    }

    Ok(outbox.len())
}

async fn write_flush<N: Write>(net: &mut N, bytes: &[u8]) -> Result<(), N::Error> {
    net.write_all(bytes).await?;
    net.flush().await
}

/// Reads once from `net` into `buf` and hands the bytes to the client. Returns the number of
/// bytes read. 0 means the stream reached EOF, which the client treats as an orderly close.
pub async fn receive<N: Read, const QUEUE_SIZE: usize, const MAX_IN_FLIGHT: usize>(
    client: &mut Client<StreamTransport, QUEUE_SIZE, MAX_IN_FLIGHT>,
    net: &mut N,
    buf: &mut [u8],
    now: Instant,
) -> Result<usize, StreamError<N::Error>> {
    let n = match net.read(buf).await {
        Ok(n) => n,
        Err(e) => {
            debug!("stream failed while reading: {:?}", e.kind());
            client.on_closed(DisconnectReason::Transport(e.kind()));
            return Err(StreamError::Network(e));
        }
    };

    if n == 0 {
        client.on_closed(DisconnectReason::Closed);
        return Ok(0);
    }

    client.on_bytes_received(&buf[..n], now)?;
    Ok(n)
}
