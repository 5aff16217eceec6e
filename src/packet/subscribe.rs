use alloc::vec::Vec;

use crate::{
    header::PacketType,
    packet::{TxPacket, prefixed_len, put_prefixed, put_u16},
    types::{QoS, TopicFilter},
};

/// SUBSCRIBE packet carrying a single topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    /// Packet identifier matched by the SUBACK.
    pub packet_identifier: u16,
    /// Topic filter to subscribe to.
    pub filter: TopicFilter,
    /// Maximum QoS requested for matching publications.
    pub qos: QoS,
}

impl TxPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn remaining_len(&self) -> usize {
        2 + prefixed_len(self.filter.as_str().len()) + 1
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        put_u16(out, self.packet_identifier);
        put_prefixed(out, self.filter.as_str().as_bytes());
        out.push(self.qos.into_bits(0));
    }
}

/// UNSUBSCRIBE packet carrying a single topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    /// Packet identifier matched by the UNSUBACK.
    pub packet_identifier: u16,
    /// Topic filter to unsubscribe from.
    pub filter: TopicFilter,
}

impl TxPacket for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn remaining_len(&self) -> usize {
        2 + prefixed_len(self.filter.as_str().len())
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        put_u16(out, self.packet_identifier);
        put_prefixed(out, self.filter.as_str().as_bytes());
    }
}
