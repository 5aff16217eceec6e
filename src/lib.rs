//! Event-driven MQTT 3.1.1 client session.
//!
//! The [`Client`] owns the session state machine: a bounded request queue, the pending
//! CONNECT slot, keep-alive scheduling, the incremental packet assembler and a handler
//! table keyed by [`PacketType`]. It performs no I/O on its own. A [`Transport`]
//! implementation carries the bytes and reports back through
//! [`Client::on_ready_to_write`], [`Client::on_bytes_received`] and [`Client::on_closed`].
//! The [`io`] module drives a client over any `embedded-io-async` stream.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_debug_implementations)]

extern crate alloc;

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("the `log` and `defmt` features are mutually exclusive");

pub(crate) mod fmt;

pub(crate) use embedded_io_async as eio;

pub mod client;
pub mod codec;
pub mod config;
pub mod header;
pub mod io;
pub mod net;
pub mod packet;
pub mod queue;
pub mod session;
pub mod time;
pub mod types;

#[cfg(test)]
pub(crate) mod test;

pub use client::{Client, MqttError};
pub use header::PacketType;
pub use net::{DisconnectReason, Transport};
pub use time::Instant;
pub use types::{BrokerUrl, PublishFlags, QoS};
