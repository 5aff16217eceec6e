use crate::{
    codec::{FramingError, MAX_CONTROL_BODY},
    header::PacketType,
    types::QoS,
};

/// Return code of a CONNACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReturnCode {
    /// Connection accepted.
    Accepted = 0,
    /// The broker does not support protocol level 4.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not allowed by the broker.
    IdentifierRejected = 2,
    /// The MQTT service is unavailable.
    ServerUnavailable = 3,
    /// The user name or password is malformed.
    BadUserNameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    fn try_from_u8(code: u8) -> Result<Self, FramingError> {
        Ok(match code {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => return Err(FramingError::MalformedPacket),
        })
    }

    /// Whether the broker accepted the connection.
    pub fn is_accepted(&self) -> bool {
        *self == Self::Accepted
    }
}

/// CONNACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Connack {
    /// Whether the broker resumed a previous session.
    pub session_present: bool,
    /// Outcome of the connection attempt.
    pub return_code: ConnectReturnCode,
}

/// Return code of a single SUBACK entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubackReturnCode {
    /// Subscription granted with the given maximum QoS.
    Granted(QoS),
    /// Subscription refused.
    Failure,
}

/// SUBACK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Suback {
    /// Identifier of the acknowledged SUBSCRIBE.
    pub packet_identifier: u16,
    /// One return code per requested filter.
    pub return_codes: heapless::Vec<SubackReturnCode, { MAX_CONTROL_BODY - 2 }>,
}

/// A completely received packet from the broker.
///
/// PUBLISH fields arrive earlier through [`crate::codec::ParseEvent::DataBegin`] and the payload
/// through [`crate::codec::ParseEvent::DataPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Incoming {
    Connack(Connack),
    Publish,
    Puback(u16),
    Pubrec(u16),
    Pubrel(u16),
    Pubcomp(u16),
    Suback(Suback),
    Unsuback(u16),
    Pingresp,
}

impl Incoming {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connack(_) => PacketType::Connack,
            Self::Publish => PacketType::Publish,
            Self::Puback(_) => PacketType::Puback,
            Self::Pubrec(_) => PacketType::Pubrec,
            Self::Pubrel(_) => PacketType::Pubrel,
            Self::Pubcomp(_) => PacketType::Pubcomp,
            Self::Suback(_) => PacketType::Suback,
            Self::Unsuback(_) => PacketType::Unsuback,
            Self::Pingresp => PacketType::Pingresp,
        }
    }

    /// Decodes the body of a packet other than PUBLISH.
    pub(crate) fn decode(packet_type: PacketType, body: &[u8]) -> Result<Self, FramingError> {
        match packet_type {
            PacketType::Connack => match *body {
                [ack_flags, code] if ack_flags & 0xFE == 0 => Ok(Self::Connack(Connack {
                    session_present: ack_flags & 0x01 != 0,
                    return_code: ConnectReturnCode::try_from_u8(code)?,
                })),
                _ => Err(FramingError::MalformedPacket),
            },
            PacketType::Puback => packet_identifier(body).map(Self::Puback),
            PacketType::Pubrec => packet_identifier(body).map(Self::Pubrec),
            PacketType::Pubrel => packet_identifier(body).map(Self::Pubrel),
            PacketType::Pubcomp => packet_identifier(body).map(Self::Pubcomp),
            PacketType::Unsuback => packet_identifier(body).map(Self::Unsuback),
            PacketType::Suback => {
                if body.len() < 3 {
                    return Err(FramingError::MalformedPacket);
                }
                let (pid, codes) = body.split_at(2);

                let mut return_codes = heapless::Vec::new();
                for code in codes {
                    let code = match code {
                        0x80 => SubackReturnCode::Failure,
                        c => SubackReturnCode::Granted(
                            QoS::try_from_bits(*c).map_err(|_| FramingError::MalformedPacket)?,
                        ),
                    };
                    return_codes
                        .push(code)
                        .map_err(|_| FramingError::PacketTooLarge)?;
                }

                Ok(Self::Suback(Suback {
                    packet_identifier: packet_identifier(pid)?,
                    return_codes,
                }))
            }
            PacketType::Pingresp if body.is_empty() => Ok(Self::Pingresp),
            PacketType::Pingresp => Err(FramingError::MalformedPacket),
            PacketType::Connect
            | PacketType::Publish
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::Pingreq
            | PacketType::Disconnect => Err(FramingError::UnexpectedPacketType(packet_type)),
        }
    }
}

fn packet_identifier(body: &[u8]) -> Result<u16, FramingError> {
    match *body {
        [0, 0] => Err(FramingError::MalformedPacket),
        [hi, lo] => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(FramingError::MalformedPacket),
    }
}

#[cfg(test)]
mod unit {
    use tokio_test::{assert_err, assert_ok};

    use crate::{
        codec::{Connack, ConnectReturnCode, FramingError, Incoming, SubackReturnCode},
        header::PacketType,
        types::QoS,
    };

    #[test_log::test]
    fn connack() {
        assert_eq!(
            assert_ok!(Incoming::decode(PacketType::Connack, &[0x01, 0x00])),
            Incoming::Connack(Connack {
                session_present: true,
                return_code: ConnectReturnCode::Accepted,
            })
        );
        assert_eq!(
            assert_ok!(Incoming::decode(PacketType::Connack, &[0x00, 0x05])),
            Incoming::Connack(Connack {
                session_present: false,
                return_code: ConnectReturnCode::NotAuthorized,
            })
        );

        assert_err!(Incoming::decode(PacketType::Connack, &[0x02, 0x00]));
        assert_err!(Incoming::decode(PacketType::Connack, &[0x00, 0x06]));
        assert_err!(Incoming::decode(PacketType::Connack, &[0x00]));
    }

    #[test_log::test]
    fn suback() {
        let Incoming::Suback(suback) = assert_ok!(Incoming::decode(
            PacketType::Suback,
            &[0x00, 0x07, 0x01, 0x80]
        )) else {
            panic!("expected SUBACK");
        };

        assert_eq!(suback.packet_identifier, 7);
        assert_eq!(
            suback.return_codes.as_slice(),
            [
                SubackReturnCode::Granted(QoS::AtLeastOnce),
                SubackReturnCode::Failure
            ]
        );

        assert_err!(Incoming::decode(PacketType::Suback, &[0x00, 0x07]));
        assert_err!(Incoming::decode(PacketType::Suback, &[0x00, 0x07, 0x03]));
    }

    #[test_log::test]
    fn identifiers() {
        assert_eq!(
            assert_ok!(Incoming::decode(PacketType::Puback, &[0x12, 0x34])),
            Incoming::Puback(0x1234)
        );
        assert_err!(Incoming::decode(PacketType::Puback, &[0x00, 0x00]));
        assert_err!(Incoming::decode(PacketType::Unsuback, &[0x00, 0x01, 0x00]));
    }

    #[test_log::test]
    fn client_only_types() {
        assert_eq!(
            assert_err!(Incoming::decode(PacketType::Subscribe, &[])),
            FramingError::UnexpectedPacketType(PacketType::Subscribe)
        );
    }
}
