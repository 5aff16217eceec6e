//! MQTT 3.1.1 wire codec: a serializer for outgoing packets and an incremental parser
//! for packets sent by the broker.

mod encode;
mod header;
mod incoming;
mod parser;

pub use encode::encode;
pub use incoming::{Connack, ConnectReturnCode, Incoming, Suback, SubackReturnCode};
pub use parser::{ParseEvent, Parser, PublishHeader};

use crate::header::PacketType;

/// Largest body of a packet other than PUBLISH the parser buffers.
pub const MAX_CONTROL_BODY: usize = 64;

/// The inbound byte stream violates the MQTT framing. Always fatal to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramingError {
    /// Reserved packet type, malformed remaining length, wrong fixed header flags,
    /// reserved field values or a length that contradicts the packet's contents.
    MalformedPacket,
    /// The broker sent a packet only a client may send.
    UnexpectedPacketType(PacketType),
    /// The topic of an incoming PUBLISH is not valid UTF-8 or contains wildcards.
    InvalidTopicName,
    /// The body of a packet other than PUBLISH exceeds [`MAX_CONTROL_BODY`].
    PacketTooLarge,
}

impl core::fmt::Display for FramingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MalformedPacket => f.write_str("malformed packet"),
            Self::UnexpectedPacketType(t) => write!(f, "unexpected packet type {:?}", t),
            Self::InvalidTopicName => f.write_str("invalid topic name"),
            Self::PacketTooLarge => f.write_str("packet too large"),
        }
    }
}

impl core::error::Error for FramingError {}
