/// MQTT's Quality of Service
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// Quality of Service Level 0. Publications with this level are only sent once.
    #[default]
    AtMostOnce = 0,
    /// Quality of Service Level 1. Publications with this level are acknowledged by a PUBACK.
    AtLeastOnce = 1,
    /// Quality of Service Level 2. Publications with this level are followed by a handshake assuring it is received once.
    ExactlyOnce = 2,
}

impl QoS {
    pub(crate) const fn into_bits(self, left_shift: u8) -> u8 {
        let bits = match self {
            Self::AtMostOnce => 0x00,
            Self::AtLeastOnce => 0x01,
            Self::ExactlyOnce => 0x02,
        };

        bits << left_shift
    }

    pub(crate) fn try_from_bits(bits: u8) -> Result<Self, InvalidQoS> {
        match bits {
            0x00 => Ok(Self::AtMostOnce),
            0x01 => Ok(Self::AtLeastOnce),
            0x02 => Ok(Self::ExactlyOnce),
            _ => Err(InvalidQoS),
        }
    }
}

/// The reserved QoS value 3 was encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidQoS;

/// Retain flag and QoS of a publication or will.
///
/// The packed form used by the wire and by callers coming from a flags byte is
/// `retain | (qos << 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishFlags {
    /// The broker should retain the message on its topic.
    pub retain: bool,
    /// Quality of service of the publication.
    pub qos: QoS,
}

impl PublishFlags {
    /// Flags with the given QoS and the retain flag unset.
    pub const fn new(qos: QoS) -> Self {
        Self { retain: false, qos }
    }

    /// Sets the retain flag.
    pub const fn retain(mut self) -> Self {
        self.retain = true;
        self
    }

    /// Unpacks `retain | (qos << 1)`. Bits above the QoS field must be zero.
    pub fn from_bits(bits: u8) -> Result<Self, InvalidQoS> {
        if bits & !0x07 != 0 {
            return Err(InvalidQoS);
        }

        Ok(Self {
            retain: bits & 0x01 != 0,
            qos: QoS::try_from_bits((bits >> 1) & 0x03)?,
        })
    }

    /// Packs into `retain | (qos << 1)`.
    pub const fn into_bits(self) -> u8 {
        self.retain as u8 | self.qos.into_bits(1)
    }
}

impl TryFrom<u8> for PublishFlags {
    type Error = InvalidQoS;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

#[cfg(test)]
mod unit {
    use crate::types::{PublishFlags, QoS};

    #[test_log::test]
    fn packed_layout() {
        assert_eq!(PublishFlags::default().into_bits(), 0);
        assert_eq!(PublishFlags::new(QoS::AtMostOnce).retain().into_bits(), 1);
        assert_eq!(PublishFlags::new(QoS::AtLeastOnce).into_bits(), 2);
        assert_eq!(PublishFlags::new(QoS::ExactlyOnce).retain().into_bits(), 5);
    }

    #[test_log::test]
    fn unpack() {
        let f = PublishFlags::from_bits(3).unwrap();
        assert!(f.retain);
        assert_eq!(f.qos, QoS::AtLeastOnce);

        assert!(PublishFlags::from_bits(0b110).is_err());
        assert!(PublishFlags::from_bits(0b1000).is_err());
    }
}
