//! Outgoing MQTT control packets.

mod connect;
mod publish;
mod subscribe;

use alloc::vec::Vec;

pub use connect::ConnectPacket;
pub use publish::{PayloadSource, PublishPacket, StreamedPublishPacket};
pub use subscribe::{SubscribePacket, UnsubscribePacket};

use crate::header::PacketType;

/// A packet that can be serialized into its wire form.
pub trait TxPacket {
    /// The type written into the fixed header.
    fn packet_type(&self) -> PacketType;

    /// The lower nibble of the fixed header's first byte.
    fn flags(&self) -> u8 {
        self.packet_type().required_flags().unwrap_or(0)
    }

    /// Returns the remaining length of a packet.
    /// This is the value which will ultimately be encoded as the remaining length
    /// in the fixed header.
    fn remaining_len(&self) -> usize;

    /// Number of trailing body bytes that [`TxPacket::write_body`] leaves out because they are
    /// streamed separately.
    fn streamed_len(&self) -> usize {
        0
    }

    /// Appends everything after the fixed header, up to the streamed part.
    fn write_body(&self, out: &mut Vec<u8>);
}

/// A fully formed outgoing control packet, owned by the request queue until transmitted.
#[derive(Debug, PartialEq, Eq)]
pub enum Packet {
    /// Connection request. Only ever held in the client's pending CONNECT slot.
    Connect(ConnectPacket),
    /// Publication.
    Publish(PublishPacket),
    /// Publication with a streamed payload.
    PublishStream(StreamedPublishPacket),
    /// Acknowledgment of a QoS 1 PUBLISH.
    Puback(u16),
    /// First acknowledgment of a QoS 2 PUBLISH.
    Pubrec(u16),
    /// Release of a QoS 2 PUBLISH.
    Pubrel(u16),
    /// Completion of a QoS 2 handshake.
    Pubcomp(u16),
    /// Subscription request.
    Subscribe(SubscribePacket),
    /// Unsubscription request.
    Unsubscribe(UnsubscribePacket),
    /// Ping request.
    Pingreq,
    /// Graceful disconnect.
    Disconnect,
}

impl Packet {
    /// The packet identifier, if this type of packet carries one.
    pub fn packet_identifier(&self) -> Option<u16> {
        match self {
            Self::Publish(p) => p.packet_identifier,
            Self::PublishStream(p) => p.packet_identifier,
            Self::Puback(pid) | Self::Pubrec(pid) | Self::Pubrel(pid) | Self::Pubcomp(pid) => {
                Some(*pid)
            }
            Self::Subscribe(p) => Some(p.packet_identifier),
            Self::Unsubscribe(p) => Some(p.packet_identifier),
            Self::Connect(_) | Self::Pingreq | Self::Disconnect => None,
        }
    }
}

impl TxPacket for Packet {
    fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::Publish(_) | Self::PublishStream(_) => PacketType::Publish,
            Self::Puback(_) => PacketType::Puback,
            Self::Pubrec(_) => PacketType::Pubrec,
            Self::Pubrel(_) => PacketType::Pubrel,
            Self::Pubcomp(_) => PacketType::Pubcomp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::Pingreq => PacketType::Pingreq,
            Self::Disconnect => PacketType::Disconnect,
        }
    }

    fn flags(&self) -> u8 {
        match self {
            Self::Publish(p) => p.flags(),
            Self::PublishStream(p) => p.flags(),
            p => p.packet_type().required_flags().unwrap_or(0),
        }
    }

    fn remaining_len(&self) -> usize {
        match self {
            Self::Connect(p) => p.remaining_len(),
            Self::Publish(p) => p.remaining_len(),
            Self::PublishStream(p) => p.remaining_len(),
            Self::Subscribe(p) => p.remaining_len(),
            Self::Unsubscribe(p) => p.remaining_len(),
            Self::Puback(_) | Self::Pubrec(_) | Self::Pubrel(_) | Self::Pubcomp(_) => 2,
            Self::Pingreq | Self::Disconnect => 0,
        }
    }

    fn streamed_len(&self) -> usize {
        match self {
            Self::PublishStream(p) => p.streamed_len(),
            _ => 0,
        }
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        match self {
            Self::Connect(p) => p.write_body(out),
            Self::Publish(p) => p.write_body(out),
            Self::PublishStream(p) => p.write_body(out),
            Self::Subscribe(p) => p.write_body(out),
            Self::Unsubscribe(p) => p.write_body(out),
            Self::Puback(pid) | Self::Pubrec(pid) | Self::Pubrel(pid) | Self::Pubcomp(pid) => {
                put_u16(out, *pid)
            }
            Self::Pingreq | Self::Disconnect => {}
        }
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Writes a two byte length prefix followed by the bytes.
///
/// # Invariants
/// `bytes.len()` is at most [`crate::types::MAX_STRING_LEN`], which every constructor checks.
pub(crate) fn put_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u16(out, bytes.len() as u16);
    out.extend_from_slice(bytes);
}

/// Length of a length-prefixed field.
pub(crate) const fn prefixed_len(len: usize) -> usize {
    2 + len
}
