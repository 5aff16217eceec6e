//! Incremental consumers of PUBLISH payloads.

use alloc::vec::Vec;

use crate::codec::PublishHeader;

/// A step of a PUBLISH payload passed to a [`PayloadParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEvent<'p> {
    /// The payload starts. `PayloadParserState::length` holds its declared length.
    Start,
    /// A chunk of the payload. `PayloadParserState::offset` is the position of its first byte.
    Chunk(&'p [u8]),
    /// The whole payload was passed.
    End,
}

/// Per-PUBLISH state shared between the client and its payload parser. Reset for every PUBLISH.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PayloadParserState {
    /// Number of payload bytes passed before the current chunk.
    pub offset: usize,
    /// The declared payload length.
    pub length: usize,
    /// Bytes the parser wants dispatched as [`crate::client::Publish::payload`].
    pub staged: Vec<u8>,
}

impl PayloadParserState {
    pub(crate) fn reset(&mut self, length: usize) {
        self.offset = 0;
        self.length = length;
        self.staged.clear();
    }
}

/// The payload parser refused a PUBLISH payload. The message is dropped without dispatch,
/// but still acknowledged, and the connection stays up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    /// The payload exceeds the number of bytes the parser stages.
    CapacityExceeded {
        /// The parser's cap in bytes.
        limit: usize,
    },
    /// The parser rejected the payload for another reason.
    Rejected,
}

impl core::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CapacityExceeded { limit } => {
                write!(f, "payload exceeds the staging limit of {} bytes", limit)
            }
            Self::Rejected => f.write_str("payload rejected"),
        }
    }
}

impl core::error::Error for PayloadError {}

/// Consumes PUBLISH payloads chunk by chunk as they arrive, so payloads larger than any single
/// read never need to be held in memory as a whole.
///
/// Closures with the signature of [`PayloadParser::parse`] implement this trait.
pub trait PayloadParser {
    /// Handles one step of the payload of `publish`.
    fn parse(
        &mut self,
        state: &mut PayloadParserState,
        publish: &PublishHeader,
        event: PayloadEvent<'_>,
    ) -> Result<(), PayloadError>;
}

impl<F> PayloadParser for F
where
    F: FnMut(&mut PayloadParserState, &PublishHeader, PayloadEvent<'_>) -> Result<(), PayloadError>,
{
    fn parse(
        &mut self,
        state: &mut PayloadParserState,
        publish: &PublishHeader,
        event: PayloadEvent<'_>,
    ) -> Result<(), PayloadError> {
        self(state, publish, event)
    }
}

/// The default parser: stages the whole payload up to `limit` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingParser {
    pub limit: usize,
}

impl StagingParser {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl PayloadParser for StagingParser {
    fn parse(
        &mut self,
        state: &mut PayloadParserState,
        _publish: &PublishHeader,
        event: PayloadEvent<'_>,
    ) -> Result<(), PayloadError> {
        let exceeded = PayloadError::CapacityExceeded { limit: self.limit };

        match event {
            PayloadEvent::Start if state.length > self.limit => Err(exceeded),
            PayloadEvent::Start => {
                state.staged.reserve(state.length);
                Ok(())
            }
            PayloadEvent::Chunk(chunk) if state.staged.len() + chunk.len() > self.limit => {
                Err(exceeded)
            }
            PayloadEvent::Chunk(chunk) => {
                state.staged.extend_from_slice(chunk);
                Ok(())
            }
            PayloadEvent::End => Ok(()),
        }
    }
}

#[cfg(test)]
mod unit {
    use tokio_test::{assert_err, assert_ok};

    use crate::{
        client::payload::{
            PayloadError, PayloadEvent, PayloadParser, PayloadParserState, StagingParser,
        },
        codec::PublishHeader,
        types::PublishFlags,
    };

    fn header(payload_len: usize) -> PublishHeader {
        PublishHeader {
            topic: "t".into(),
            flags: PublishFlags::default(),
            dup: false,
            packet_identifier: None,
            payload_len,
        }
    }

    #[test_log::test]
    fn stages_within_limit() {
        let mut parser = StagingParser::new(4);
        let mut state = PayloadParserState::default();
        let h = header(4);
        state.reset(4);

        assert_ok!(parser.parse(&mut state, &h, PayloadEvent::Start));
        assert_ok!(parser.parse(&mut state, &h, PayloadEvent::Chunk(b"ab")));
        assert_ok!(parser.parse(&mut state, &h, PayloadEvent::Chunk(b"cd")));
        assert_ok!(parser.parse(&mut state, &h, PayloadEvent::End));

        assert_eq!(state.staged, b"abcd");
    }

    #[test_log::test]
    fn rejects_declared_length_above_limit() {
        let mut parser = StagingParser::new(4);
        let mut state = PayloadParserState::default();
        state.reset(5);

        assert_eq!(
            assert_err!(parser.parse(&mut state, &header(5), PayloadEvent::Start)),
            PayloadError::CapacityExceeded { limit: 4 }
        );
    }

    #[test_log::test]
    fn closures_are_parsers() {
        let mut seen = 0;
        let mut parser = |_: &mut PayloadParserState, _: &PublishHeader, e: PayloadEvent<'_>| {
            if let PayloadEvent::Chunk(c) = e {
                seen += c.len();
            }
            Ok::<(), PayloadError>(())
        };

        let mut state = PayloadParserState::default();
        assert_ok!(PayloadParser::parse(
            &mut parser,
            &mut state,
            &header(3),
            PayloadEvent::Chunk(b"abc")
        ));
        drop(parser);
        assert_eq!(seen, 3);
    }
}
