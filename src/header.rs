//! The fixed header every MQTT control packet starts with.

use alloc::vec::Vec;

use crate::types::VarByteInt;

/// First byte (packet type and flags) plus the remaining length of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FixedHeader {
    pub(crate) type_and_flags: u8,
    pub(crate) remaining_len: VarByteInt,
}

impl FixedHeader {
    pub(crate) fn new(packet_type: PacketType, flags: u8, remaining_len: VarByteInt) -> Self {
        let packet_type = (packet_type as u8) << 4;
        Self {
            type_and_flags: packet_type | flags,
            remaining_len,
        }
    }

    /// The lower nibble of the first byte.
    pub fn flags(&self) -> u8 {
        self.type_and_flags & 0x0F
    }

    /// The number of bytes following the fixed header.
    pub fn remaining_len(&self) -> usize {
        self.remaining_len.size()
    }

    /// Decodes the packet type from the upper nibble of the first byte.
    pub fn packet_type(&self) -> Result<PacketType, Reserved> {
        PacketType::from_type_and_flags(self.type_and_flags)
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.type_and_flags);
        self.remaining_len.encode(out);
    }
}

/// Returned if packet type is reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reserved;

/// The closed set of MQTT 3.1.1 control packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    /// Client request to connect to the broker.
    Connect = 1,
    /// Connect acknowledgment.
    Connack = 2,
    /// Publish message.
    Publish = 3,
    /// Publish acknowledgment (QoS 1).
    Puback = 4,
    /// Publish received (QoS 2, part 1).
    Pubrec = 5,
    /// Publish release (QoS 2, part 2).
    Pubrel = 6,
    /// Publish complete (QoS 2, part 3).
    Pubcomp = 7,
    /// Subscribe request.
    Subscribe = 8,
    /// Subscribe acknowledgment.
    Suback = 9,
    /// Unsubscribe request.
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment.
    Unsuback = 11,
    /// Ping request.
    Pingreq = 12,
    /// Ping response.
    Pingresp = 13,
    /// Client is disconnecting.
    Disconnect = 14,
}

impl PacketType {
    /// Number of distinct packet type values, including the reserved 0 and 15.
    pub const COUNT: usize = 16;

    /// Decodes the upper nibble of a fixed header's first byte.
    pub fn from_type_and_flags(type_and_flags: u8) -> Result<Self, Reserved> {
        match type_and_flags >> 4 {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(Reserved),
        }
    }

    /// The fixed header flags this packet type is required to carry.
    ///
    /// `None` for PUBLISH, whose flags encode dup, QoS and retain.
    pub const fn required_flags(&self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::Pubrel | Self::Subscribe | Self::Unsubscribe => Some(0b0010),
            _ => Some(0),
        }
    }

    pub(crate) const fn index(&self) -> usize {
        *self as usize
    }
}
