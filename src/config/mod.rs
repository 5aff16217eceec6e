//! Contains configuration primitives for the client.

mod client;

pub use client::Config as ClientConfig;
