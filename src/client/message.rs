//! Contains the completed packets the client dispatches to event handlers.

use crate::{
    codec::{Connack, Incoming, Suback},
    header::PacketType,
    types::PublishFlags,
};

/// A PUBLISH packet received from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Publish<'m> {
    pub topic: &'m str,
    pub flags: PublishFlags,
    pub dup: bool,
    /// Present if and only if QoS > 0.
    pub packet_identifier: Option<u16>,
    /// The payload bytes staged by the payload parser. With the default parser this is the
    /// whole payload.
    pub payload: &'m [u8],
    /// The payload length declared by the packet.
    pub payload_len: usize,
}

/// A completely received packet, dispatched to the handler registered for its type.
///
/// Acknowledgments required by the protocol are queued by the client before dispatch:
/// - PUBLISH QoS 1: PUBACK
/// - PUBLISH QoS 2: PUBREC, and the packet identifier is tracked until PUBREL
/// - PUBREC: PUBREL
/// - PUBREL: PUBCOMP
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message<'m> {
    /// The broker answered CONNECT. A refusal closes the connection after dispatch.
    Connack(Connack),
    /// The broker forwarded a publication.
    Publish(Publish<'m>),
    /// A QoS 1 publication is complete.
    Puback(u16),
    /// The first handshake of a QoS 2 publication is complete.
    Pubrec(u16),
    /// The broker released a QoS 2 publication.
    Pubrel(u16),
    /// A QoS 2 publication is complete.
    Pubcomp(u16),
    /// The broker answered SUBSCRIBE.
    Suback(Suback),
    /// The broker answered UNSUBSCRIBE.
    Unsuback(u16),
    /// The broker answered PINGREQ.
    Pingresp,
}

impl Message<'_> {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connack(_) => PacketType::Connack,
            Self::Publish(_) => PacketType::Publish,
            Self::Puback(_) => PacketType::Puback,
            Self::Pubrec(_) => PacketType::Pubrec,
            Self::Pubrel(_) => PacketType::Pubrel,
            Self::Pubcomp(_) => PacketType::Pubcomp,
            Self::Suback(_) => PacketType::Suback,
            Self::Unsuback(_) => PacketType::Unsuback,
            Self::Pingresp => PacketType::Pingresp,
        }
    }

    /// The packet identifier, if this type of packet carries one.
    pub fn packet_identifier(&self) -> Option<u16> {
        match self {
            Self::Publish(p) => p.packet_identifier,
            Self::Puback(pid)
            | Self::Pubrec(pid)
            | Self::Pubrel(pid)
            | Self::Pubcomp(pid)
            | Self::Unsuback(pid) => Some(*pid),
            Self::Suback(s) => Some(s.packet_identifier),
            Self::Connack(_) | Self::Pingresp => None,
        }
    }
}

impl Message<'static> {
    /// Converts a completed packet other than PUBLISH.
    pub(crate) fn from_control(incoming: Incoming) -> Option<Self> {
        Some(match incoming {
            Incoming::Connack(c) => Self::Connack(c),
            Incoming::Puback(pid) => Self::Puback(pid),
            Incoming::Pubrec(pid) => Self::Pubrec(pid),
            Incoming::Pubrel(pid) => Self::Pubrel(pid),
            Incoming::Pubcomp(pid) => Self::Pubcomp(pid),
            Incoming::Suback(s) => Self::Suback(s),
            Incoming::Unsuback(pid) => Self::Unsuback(pid),
            Incoming::Pingresp => Self::Pingresp,
            Incoming::Publish => return None,
        })
    }
}
