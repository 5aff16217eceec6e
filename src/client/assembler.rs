use crate::{
    client::payload::{PayloadEvent, PayloadParser, PayloadParserState},
    codec::{Incoming, ParseEvent, PublishHeader},
    fmt::{trace, warn},
    header::FixedHeader,
};

/// A completely assembled inbound packet.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Assembled {
    Publish {
        publish: PublishHeader,
        /// The payload parser refused the payload.
        dropped: bool,
    },
    Control(Incoming),
}

/// Reconstructs one inbound packet at a time from the parser's events and forwards PUBLISH
/// payload chunks to the payload parser.
#[derive(Debug, Default)]
pub(crate) struct Assembler {
    header: Option<FixedHeader>,
    publish: Option<PublishHeader>,
    dropped: bool,
}

impl Assembler {
    pub(crate) fn reset(&mut self) {
        self.header = None;
        self.publish = None;
        self.dropped = false;
    }

    /// Whether a packet is partially assembled.
    pub(crate) fn in_progress(&self) -> bool {
        self.header.is_some()
    }

    pub(crate) fn on_event(
        &mut self,
        event: ParseEvent<'_>,
        parser: &mut dyn PayloadParser,
        state: &mut PayloadParserState,
    ) -> Option<Assembled> {
        match event {
            ParseEvent::MessageBegin(header) => {
                self.reset();
                self.header = Some(header);
                None
            }
            ParseEvent::DataBegin(publish) => {
                debug_assert!(self.header.is_some(), "DataBegin before MessageBegin");

                state.reset(publish.payload_len);
                self.feed(parser, state, &publish, PayloadEvent::Start);
                self.publish = Some(publish);
                None
            }
            ParseEvent::DataPayload(chunk) => {
                if let Some(publish) = self.publish.take() {
                    self.feed(parser, state, &publish, PayloadEvent::Chunk(chunk));
                    state.offset += chunk.len();
                    self.publish = Some(publish);
                }
                None
            }
            ParseEvent::DataEnd => {
                if let Some(publish) = self.publish.take() {
                    trace!("assembled {} payload bytes", state.offset);
                    self.feed(parser, state, &publish, PayloadEvent::End);
                    self.publish = Some(publish);
                }
                None
            }
            ParseEvent::MessageEnd(Incoming::Publish) => {
                let dropped = self.dropped;
                let publish = self.publish.take();
                self.reset();

                publish.map(|publish| Assembled::Publish { publish, dropped })
            }
            ParseEvent::MessageEnd(incoming) => {
                self.reset();
                Some(Assembled::Control(incoming))
            }
        }
    }

    fn feed(
        &mut self,
        parser: &mut dyn PayloadParser,
        state: &mut PayloadParserState,
        publish: &PublishHeader,
        event: PayloadEvent<'_>,
    ) {
        if self.dropped {
            return;
        }

        if let Err(e) = parser.parse(state, publish, event) {
            warn!(
                "dropping PUBLISH on {} with {} payload bytes: {:?}",
                publish.topic.as_str(),
                publish.payload_len,
                e
            );
            self.dropped = true;
            state.staged.clear();
        }
    }
}
