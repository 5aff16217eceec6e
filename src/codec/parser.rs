use alloc::{string::String, vec::Vec};

use crate::{
    codec::{FramingError, Incoming, MAX_CONTROL_BODY, header::HeaderState},
    fmt::trace,
    header::{FixedHeader, PacketType},
    types::{PublishFlags, QoS, TopicName},
};

/// Fields of an incoming PUBLISH known before its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishHeader {
    /// Topic the message was published on.
    pub topic: String,
    /// Retain flag and QoS.
    pub flags: PublishFlags,
    /// Whether the broker marked this as a redelivery.
    pub dup: bool,
    /// Present if and only if QoS > 0.
    pub packet_identifier: Option<u16>,
    /// Number of payload bytes following the variable header.
    pub payload_len: usize,
}

/// One step of the incremental parse of an inbound packet.
///
/// Every packet yields `MessageBegin` first and `MessageEnd` last. A PUBLISH yields
/// `DataBegin`, any number of `DataPayload` chunks and `DataEnd` in between.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseEvent<'b> {
    /// A fixed header was read.
    MessageBegin(FixedHeader),
    /// The variable header of a PUBLISH was read. Its payload follows.
    DataBegin(PublishHeader),
    /// A chunk of PUBLISH payload, borrowed from the input.
    DataPayload(&'b [u8]),
    /// The whole PUBLISH payload was yielded.
    DataEnd,
    /// The packet is complete.
    MessageEnd(Incoming),
}

#[derive(Debug)]
enum State {
    Header(HeaderState),
    Begun(FixedHeader),
    VariableHeader {
        flags: PublishFlags,
        dup: bool,
        remaining_len: usize,
        buffer: Vec<u8>,
    },
    Payload {
        remaining: usize,
    },
    PublishEnd,
    Body {
        packet_type: PacketType,
        len: usize,
        buffer: heapless::Vec<u8, MAX_CONTROL_BODY>,
    },
}

/// Incremental parser of the byte stream sent by a broker.
///
/// Bytes may be fed in arbitrary chunks. The parser keeps the partially read fixed header,
/// the PUBLISH variable header and bodies of other packets. PUBLISH payloads are never
/// buffered and are yielded as slices of the input instead.
#[derive(Debug)]
pub struct Parser {
    state: State,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser awaiting the first byte of a fixed header.
    pub fn new() -> Self {
        Self {
            state: State::Header(HeaderState::new()),
        }
    }

    /// Discards all in-progress state.
    pub fn reset(&mut self) {
        self.state = State::Header(HeaderState::new());
    }

    /// Whether the parser is between two packets.
    pub fn is_idle(&self) -> bool {
        matches!(&self.state, State::Header(h) if h.is_empty())
    }

    /// Consumes bytes from the front of `input` until the next event is complete.
    ///
    /// Returns `Ok(None)` once `input` is exhausted and more bytes are needed. At most one
    /// event is returned per call; call repeatedly until `Ok(None)`. An error resets the parser.
    pub fn next_event<'b>(
        &mut self,
        input: &mut &'b [u8],
    ) -> Result<Option<ParseEvent<'b>>, FramingError> {
        let result = self.step(input);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn step<'b>(&mut self, input: &mut &'b [u8]) -> Result<Option<ParseEvent<'b>>, FramingError> {
        loop {
            match &mut self.state {
                State::Header(header_state) => {
                    while let Some((&byte, rest)) = input.split_first() {
                        *input = rest;

                        if let Some(header) = header_state.push(byte)? {
                            Self::check_header(&header)?;
                            self.state = State::Begun(header);
                            return Ok(Some(ParseEvent::MessageBegin(header)));
                        }
                    }
                    return Ok(None);
                }
                State::Begun(header) => {
                    let header = *header;
                    self.state = Self::body_state(&header)?;
                }
                State::VariableHeader {
                    flags,
                    dup,
                    remaining_len,
                    buffer,
                } => {
                    let needed = Self::variable_header_len(buffer, flags);
                    if needed > *remaining_len {
                        return Err(FramingError::MalformedPacket);
                    }

                    if buffer.len() < needed {
                        if input.is_empty() {
                            return Ok(None);
                        }
                        take_into(input, needed - buffer.len(), |chunk| {
                            buffer.extend_from_slice(chunk)
                        });
                        // The needed length grows once the topic length is known.
                        continue;
                    }

                    let publish = Self::publish_header(buffer, *flags, *dup, *remaining_len)?;
                    trace!(
                        "received PUBLISH variable header, payload of {} bytes follows",
                        publish.payload_len
                    );

                    self.state = State::Payload {
                        remaining: publish.payload_len,
                    };
                    return Ok(Some(ParseEvent::DataBegin(publish)));
                }
                State::Payload { remaining } => {
                    if *remaining == 0 {
                        self.state = State::PublishEnd;
                        return Ok(Some(ParseEvent::DataEnd));
                    }
                    if input.is_empty() {
                        return Ok(None);
                    }

                    let n = (*remaining).min(input.len());
                    let (chunk, rest) = input.split_at(n);
                    *input = rest;
                    *remaining -= n;

                    trace!("received {} bytes of payload, {} left", n, *remaining);
                    return Ok(Some(ParseEvent::DataPayload(chunk)));
                }
                State::PublishEnd => {
                    self.reset();
                    return Ok(Some(ParseEvent::MessageEnd(Incoming::Publish)));
                }
                State::Body {
                    packet_type,
                    len,
                    buffer,
                } => {
                    if buffer.len() < *len {
                        if input.is_empty() {
                            return Ok(None);
                        }
                        let missing = *len - buffer.len();
                        let mut overflow = false;
                        take_into(input, missing, |chunk| {
                            overflow = buffer.extend_from_slice(chunk).is_err();
                        });
                        if overflow {
                            return Err(FramingError::PacketTooLarge);
                        }
                        continue;
                    }

                    let incoming = Incoming::decode(*packet_type, buffer)?;
                    self.reset();
                    return Ok(Some(ParseEvent::MessageEnd(incoming)));
                }
            }
        }
    }

    fn check_header(header: &FixedHeader) -> Result<(), FramingError> {
        // Reserved types are rejected by the header state with the first byte.
        let packet_type = header
            .packet_type()
            .map_err(|_| FramingError::MalformedPacket)?;

        match packet_type {
            PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::Pingreq
            | PacketType::Disconnect => {
                return Err(FramingError::UnexpectedPacketType(packet_type));
            }
            _ => {}
        }

        match packet_type.required_flags() {
            Some(flags) if flags != header.flags() => Err(FramingError::MalformedPacket),
            _ => Ok(()),
        }
    }

    fn body_state(header: &FixedHeader) -> Result<State, FramingError> {
        let packet_type = header
            .packet_type()
            .map_err(|_| FramingError::MalformedPacket)?;
        let remaining_len = header.remaining_len();

        if packet_type == PacketType::Publish {
            let flags = PublishFlags::from_bits(header.flags() & 0x07)
                .map_err(|_| FramingError::MalformedPacket)?;

            return Ok(State::VariableHeader {
                flags,
                dup: header.flags() & 0x08 != 0,
                remaining_len,
                buffer: Vec::new(),
            });
        }

        if remaining_len > MAX_CONTROL_BODY {
            return Err(FramingError::PacketTooLarge);
        }

        Ok(State::Body {
            packet_type,
            len: remaining_len,
            buffer: heapless::Vec::new(),
        })
    }

    /// Length of the PUBLISH variable header as far as it is known from the bytes read so far.
    fn variable_header_len(buffer: &[u8], flags: &PublishFlags) -> usize {
        let pid_len = if flags.qos == QoS::AtMostOnce { 0 } else { 2 };

        match buffer {
            [hi, lo, ..] => 2 + u16::from_be_bytes([*hi, *lo]) as usize + pid_len,
            _ => 2,
        }
    }

    fn publish_header(
        buffer: &[u8],
        flags: PublishFlags,
        dup: bool,
        remaining_len: usize,
    ) -> Result<PublishHeader, FramingError> {
        let (topic_len, rest) = buffer.split_at(2);
        let topic_len = u16::from_be_bytes([topic_len[0], topic_len[1]]) as usize;
        let (topic, pid) = rest.split_at(topic_len);

        let topic = core::str::from_utf8(topic).map_err(|_| FramingError::InvalidTopicName)?;
        if TopicName::new(topic).is_none() {
            return Err(FramingError::InvalidTopicName);
        }

        let packet_identifier = match *pid {
            [] => None,
            [0, 0] => return Err(FramingError::MalformedPacket),
            [hi, lo] => Some(u16::from_be_bytes([hi, lo])),
            _ => return Err(FramingError::MalformedPacket),
        };

        Ok(PublishHeader {
            topic: topic.into(),
            flags,
            dup,
            packet_identifier,
            payload_len: remaining_len - buffer.len(),
        })
    }
}

/// Moves up to `max` bytes from the front of `input` into `f`.
fn take_into(input: &mut &[u8], max: usize, f: impl FnOnce(&[u8])) {
    let n = max.min(input.len());
    let (chunk, rest) = input.split_at(n);
    *input = rest;
    f(chunk);
}
