use alloc::{boxed::Box, vec::Vec};

use crate::{
    eio::ErrorKind,
    header::PacketType,
    packet::{TxPacket, prefixed_len, put_prefixed, put_u16},
    types::{PublishFlags, QoS, TooLargeToEncode, TopicName, VarByteInt},
};

/// Outgoing PUBLISH packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    /// Topic the message is published on.
    pub topic: TopicName,
    /// Application message.
    pub payload: Vec<u8>,
    /// Retain flag and QoS.
    pub flags: PublishFlags,
    /// Whether this is a redelivery.
    pub dup: bool,
    /// Present if and only if QoS > 0.
    pub packet_identifier: Option<u16>,
}

impl PublishPacket {
    /// Creates a PUBLISH packet, checking that its remaining length is encodable.
    ///
    /// `packet_identifier` is ignored for QoS 0.
    pub fn new(
        topic: TopicName,
        payload: &[u8],
        flags: PublishFlags,
        packet_identifier: u16,
    ) -> Result<Self, TooLargeToEncode> {
        let packet_identifier = match flags.qos {
            QoS::AtMostOnce => None,
            _ => Some(packet_identifier),
        };

        let packet = Self {
            topic,
            payload: payload.into(),
            flags,
            dup: false,
            packet_identifier,
        };
        VarByteInt::try_from(packet.remaining_len())?;

        Ok(packet)
    }
}

impl TxPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let dup = if self.dup { 0x08 } else { 0x00 };
        dup | self.flags.into_bits()
    }

    fn remaining_len(&self) -> usize {
        let pid_len = if self.packet_identifier.is_some() { 2 } else { 0 };

        prefixed_len(self.topic.as_str().len()) + pid_len + self.payload.len()
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        put_prefixed(out, self.topic.as_str().as_bytes());
        if let Some(pid) = self.packet_identifier {
            put_u16(out, pid);
        }
        out.extend_from_slice(&self.payload);
    }
}

/// Where the payload of a streamed PUBLISH is pulled from.
///
/// Implemented for every blocking [`embedded_io::Read`], e.g. `&'static [u8]`.
pub trait PayloadSource {
    /// Reads the next bytes of the payload into `buf` and returns how many were read.
    /// Returning 0 before the declared payload length was read is an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind>;
}

impl<R: embedded_io::Read> PayloadSource for R {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        embedded_io::Read::read(self, buf).map_err(|e| embedded_io::Error::kind(&e))
    }
}

/// Outgoing PUBLISH packet whose payload is read from a [`PayloadSource`] while it is written.
pub struct StreamedPublishPacket {
    /// Topic the message is published on.
    pub topic: TopicName,
    /// Retain flag and QoS.
    pub flags: PublishFlags,
    /// Whether this is a redelivery.
    pub dup: bool,
    /// Present if and only if QoS > 0.
    pub packet_identifier: Option<u16>,
    /// Number of payload bytes the source provides.
    pub payload_len: usize,

    pub(crate) source: Box<dyn PayloadSource>,
}

impl StreamedPublishPacket {
    /// Creates a streamed PUBLISH packet, checking that its remaining length is encodable.
    ///
    /// `packet_identifier` is ignored for QoS 0.
    pub fn new(
        topic: TopicName,
        source: Box<dyn PayloadSource>,
        payload_len: usize,
        flags: PublishFlags,
        packet_identifier: u16,
    ) -> Result<Self, TooLargeToEncode> {
        let packet_identifier = match flags.qos {
            QoS::AtMostOnce => None,
            _ => Some(packet_identifier),
        };

        let packet = Self {
            topic,
            flags,
            dup: false,
            packet_identifier,
            payload_len,
            source,
        };
        VarByteInt::try_from(packet.remaining_len())?;

        Ok(packet)
    }

    pub(crate) fn into_source(self) -> (Box<dyn PayloadSource>, usize) {
        (self.source, self.payload_len)
    }
}

impl core::fmt::Debug for StreamedPublishPacket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamedPublishPacket")
            .field("topic", &self.topic)
            .field("flags", &self.flags)
            .field("dup", &self.dup)
            .field("packet_identifier", &self.packet_identifier)
            .field("payload_len", &self.payload_len)
            .finish_non_exhaustive()
    }
}

/// Compares everything except the payload source.
impl PartialEq for StreamedPublishPacket {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic
            && self.flags == other.flags
            && self.dup == other.dup
            && self.packet_identifier == other.packet_identifier
            && self.payload_len == other.payload_len
    }
}

impl Eq for StreamedPublishPacket {}

impl TxPacket for StreamedPublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let dup = if self.dup { 0x08 } else { 0x00 };
        dup | self.flags.into_bits()
    }

    fn remaining_len(&self) -> usize {
        let pid_len = if self.packet_identifier.is_some() { 2 } else { 0 };

        prefixed_len(self.topic.as_str().len()) + pid_len + self.payload_len
    }

    fn streamed_len(&self) -> usize {
        self.payload_len
    }

    /// Writes the topic and packet identifier. The payload follows from the source.
    fn write_body(&self, out: &mut Vec<u8>) {
        put_prefixed(out, self.topic.as_str().as_bytes());
        if let Some(pid) = self.packet_identifier {
            put_u16(out, pid);
        }
    }
}

#[cfg(test)]
mod unit {
    use alloc::vec::Vec;

    use alloc::boxed::Box;

    use crate::{
        packet::{PublishPacket, StreamedPublishPacket, TxPacket},
        types::{PublishFlags, QoS, TopicName},
    };

    #[test_log::test]
    fn qos0_has_no_identifier() {
        let p = PublishPacket::new(
            TopicName::new("a/b").unwrap(),
            b"x",
            PublishFlags::default(),
            7,
        )
        .unwrap();

        assert_eq!(p.packet_identifier, None);
        assert_eq!(p.flags(), 0);

        let mut out = Vec::new();
        p.write_body(&mut out);
        assert_eq!(out, [0x00, 0x03, b'a', b'/', b'b', b'x']);
    }

    #[test_log::test]
    fn qos2_retained_dup() {
        let mut p = PublishPacket::new(
            TopicName::new("t").unwrap(),
            b"",
            PublishFlags::new(QoS::ExactlyOnce).retain(),
            0x0102,
        )
        .unwrap();
        p.dup = true;

        assert_eq!(p.flags(), 0b1101);
        assert_eq!(p.remaining_len(), 5);

        let mut out = Vec::new();
        p.write_body(&mut out);
        assert_eq!(out, [0x00, 0x01, b't', 0x01, 0x02]);
    }

    #[test_log::test]
    fn streamed_body_stops_before_payload() {
        let p = StreamedPublishPacket::new(
            TopicName::new("t").unwrap(),
            Box::new(&b"hello"[..]),
            5,
            PublishFlags::new(QoS::AtLeastOnce),
            9,
        )
        .unwrap();

        assert_eq!(p.remaining_len(), 10);
        assert_eq!(p.streamed_len(), 5);

        let mut out = Vec::new();
        p.write_body(&mut out);
        assert_eq!(out, [0x00, 0x01, b't', 0x00, 0x09]);
    }
}
