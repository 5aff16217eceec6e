use alloc::{string::String, vec::Vec};

use crate::{
    header::PacketType,
    packet::{TxPacket, prefixed_len, put_prefixed, put_u16},
    types::Will,
};

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// CONNECT packet opening an MQTT 3.1.1 session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    /// Client identifier, at most 23 bytes for guaranteed broker support and never above 65535.
    pub client_identifier: String,
    /// Keep alive in seconds.
    pub keep_alive: u16,
    /// Clean session flag.
    pub clean_session: bool,
    /// User name from the broker address.
    pub user_name: Option<String>,
    /// Password from the broker address.
    pub password: Option<String>,
    /// Last will.
    pub will: Option<Will>,
}

impl ConnectPacket {
    const USER_NAME: u8 = 0x80;
    const PASSWORD: u8 = 0x40;
    const WILL_RETAIN: u8 = 0x20;
    const WILL: u8 = 0x04;
    const CLEAN_SESSION: u8 = 0x02;

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;

        if self.user_name.is_some() {
            flags |= Self::USER_NAME;
        }
        if self.password.is_some() {
            flags |= Self::PASSWORD;
        }
        if let Some(will) = &self.will {
            flags |= Self::WILL;
            flags |= will.flags.qos.into_bits(3);
            if will.flags.retain {
                flags |= Self::WILL_RETAIN;
            }
        }
        if self.clean_session {
            flags |= Self::CLEAN_SESSION;
        }

        flags
    }
}

impl TxPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn remaining_len(&self) -> usize {
        // protocol name + protocol level + connect flags + keep alive
        let variable_header_len = prefixed_len(PROTOCOL_NAME.len()) + 1 + 1 + 2;

        let will_len = self.will.as_ref().map_or(0, |w| {
            prefixed_len(w.topic.as_str().len()) + prefixed_len(w.message.len())
        });

        variable_header_len
            + prefixed_len(self.client_identifier.len())
            + will_len
            + self.user_name.as_ref().map_or(0, |u| prefixed_len(u.len()))
            + self.password.as_ref().map_or(0, |p| prefixed_len(p.len()))
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        put_prefixed(out, PROTOCOL_NAME);
        out.push(PROTOCOL_LEVEL);
        out.push(self.connect_flags());
        put_u16(out, self.keep_alive);

        put_prefixed(out, self.client_identifier.as_bytes());
        if let Some(will) = &self.will {
            put_prefixed(out, will.topic.as_str().as_bytes());
            put_prefixed(out, &will.message);
        }
        if let Some(user_name) = &self.user_name {
            put_prefixed(out, user_name.as_bytes());
        }
        if let Some(password) = &self.password {
            put_prefixed(out, password.as_bytes());
        }
    }
}

#[cfg(test)]
mod unit {
    use alloc::vec::Vec;

    use crate::{
        packet::{ConnectPacket, TxPacket},
        types::{PublishFlags, QoS, TopicName, Will},
    };

    fn body(packet: &ConnectPacket) -> Vec<u8> {
        let mut out = Vec::new();
        packet.write_body(&mut out);
        assert_eq!(out.len(), packet.remaining_len());
        out
    }

    #[test_log::test]
    fn minimal() {
        let packet = ConnectPacket {
            client_identifier: "c".into(),
            keep_alive: 60,
            clean_session: true,
            user_name: None,
            password: None,
            will: None,
        };

        assert_eq!(
            body(&packet),
            [
                0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
                0x04, // protocol level
                0x02, // clean session
                0x00, 0x3C, // keep alive
                0x00, 0x01, b'c', // client identifier
            ]
        );
    }

    #[test_log::test]
    fn full() {
        let packet = ConnectPacket {
            client_identifier: "id".into(),
            keep_alive: 10,
            clean_session: false,
            user_name: Some("u".into()),
            password: Some("p".into()),
            will: Some(Will {
                topic: TopicName::new("w").unwrap(),
                message: b"bye".into(),
                flags: PublishFlags::new(QoS::AtLeastOnce).retain(),
            }),
        };

        assert_eq!(
            body(&packet),
            [
                0x00, 0x04, b'M', b'Q', b'T', b'T', //
                0x04, //
                0b1110_1100, // user, password, will retain, will qos 1, will
                0x00, 0x0A, //
                0x00, 0x02, b'i', b'd', //
                0x00, 0x01, b'w', //
                0x00, 0x03, b'b', b'y', b'e', //
                0x00, 0x01, b'u', //
                0x00, 0x01, b'p', //
            ]
        );
    }
}
