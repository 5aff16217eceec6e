//! Implements the client session: the pending CONNECT slot, the request queue, keep alive
//! scheduling, inbound packet assembly and dispatch to event handlers.

use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::cell::RefCell;

use crate::{
    client::{
        assembler::{Assembled, Assembler},
        handler::{EventHandler, HandlerTable},
        payload::{PayloadParser, PayloadParserState, StagingParser},
    },
    codec::{self, Connack, Incoming, Parser, PublishHeader},
    config::ClientConfig,
    eio::{Error as _, ErrorKind},
    fmt::{debug, error, info, trace, warn},
    header::PacketType,
    net::{DisconnectReason, Transport},
    packet::{
        ConnectPacket, Packet, PayloadSource, PublishPacket, StreamedPublishPacket,
        SubscribePacket, TxPacket, UnsubscribePacket,
    },
    queue::{DEFAULT_QUEUE_SIZE, RequestQueue},
    session::{
        CPublishFlightState, DEFAULT_MAX_IN_FLIGHT, FlightTableFull, KeepAlive, Phase, Session,
    },
    time::Instant,
    types::{
        BrokerUrl, MAX_STRING_LEN, PublishFlags, QoS, TooLargeToEncode, TopicFilter, TopicName,
        Will,
    },
};

mod assembler;
mod err;

pub mod handler;
pub mod message;
pub mod payload;

pub use err::Error as MqttError;
pub use message::{Message, Publish};

/// Handler notified when a connection ends.
pub type DisconnectHandler<C> = Box<dyn FnMut(&mut C, DisconnectReason)>;

/// Transmission state of the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendState {
    /// Nothing is being transmitted.
    #[default]
    Ready,
    /// The bytes of a packet are being handed to the transport.
    SendingData,
}

/// The rest of a streamed PUBLISH payload still to be written.
struct OutgoingPayload {
    source: Box<dyn PayloadSource>,
    remaining: usize,
}

/// An event-driven MQTT 3.1.1 client.
///
/// The client performs no I/O itself. It tells its [`Transport`] to connect, write and close,
/// and reacts to the transport's notifications:
/// - [`Client::on_ready_to_write`] transmits the pending CONNECT or the oldest queued packet.
/// - [`Client::on_bytes_received`] parses, acknowledges and dispatches inbound packets.
/// - [`Client::on_closed`] tears the session down.
/// - [`Client::check_keep_alive`] is driven by a host timer.
///
/// `QUEUE_SIZE` bounds the request queue, `MAX_IN_FLIGHT` bounds the tables tracking
/// unacknowledged QoS 1 and 2 publications and subscription requests.
pub struct Client<
    T: Transport,
    const QUEUE_SIZE: usize = DEFAULT_QUEUE_SIZE,
    const MAX_IN_FLIGHT: usize = DEFAULT_MAX_IN_FLIGHT,
> {
    transport: T,
    config: ClientConfig,
    session: Session<MAX_IN_FLIGHT>,

    queue: RequestQueue<QUEUE_SIZE>,
    /// Always transmitted before anything in the queue.
    pending_connect: Option<ConnectPacket>,
    will: Option<Will>,
    send_state: SendState,
    tx_buffer: Vec<u8>,
    /// Present while the transport is in the middle of a streamed PUBLISH.
    outgoing: Option<OutgoingPayload>,

    parser: Parser,
    assembler: Assembler,
    payload_parser: Box<dyn PayloadParser>,
    payload_state: PayloadParserState,

    handlers: HandlerTable<Self>,
    disconnect_handler: Option<DisconnectHandler<Self>>,

    packet_identifier_counter: u16,
    /// sent SUBSCRIBE packets
    pending_suback: heapless::Vec<u16, MAX_IN_FLIGHT>,
    /// sent UNSUBSCRIBE packets
    pending_unsuback: heapless::Vec<u16, MAX_IN_FLIGHT>,

    /// Incremented whenever a connection is started or torn down.
    connection: u32,
}

impl<T: Transport + core::fmt::Debug, const QUEUE_SIZE: usize, const MAX_IN_FLIGHT: usize>
    core::fmt::Debug for Client<T, QUEUE_SIZE, MAX_IN_FLIGHT>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("session", &self.session)
            .field("queue", &self.queue)
            .field("pending_connect", &self.pending_connect)
            .field("send_state", &self.send_state)
            .field("parser", &self.parser)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, const QUEUE_SIZE: usize, const MAX_IN_FLIGHT: usize>
    Client<T, QUEUE_SIZE, MAX_IN_FLIGHT>
{
    /// Creates a new, disconnected client with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Creates a new, disconnected client.
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            session: Session::new(config.keep_alive, config.ping_repeat_time),

            queue: RequestQueue::new(),
            pending_connect: None,
            will: None,
            send_state: SendState::Ready,
            tx_buffer: Vec::new(),
            outgoing: None,

            parser: Parser::new(),
            assembler: Assembler::default(),
            payload_parser: Box::new(StagingParser::new(config.payload_limit)),
            payload_state: PayloadParserState::default(),

            handlers: HandlerTable::new(),
            disconnect_handler: None,

            packet_identifier_counter: 1,
            pending_suback: heapless::Vec::new(),
            pending_unsuback: heapless::Vec::new(),

            connection: 0,
        }
    }

    /// Returns configuration for this client.
    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns session related configuration and tracking information.
    #[inline]
    pub fn session(&self) -> &Session<MAX_IN_FLIGHT> {
        &self.session
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Whether the broker accepted the current connection.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    #[inline]
    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    /// Number of packets in the request queue. The pending CONNECT is not counted.
    #[inline]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn queue(&self) -> &RequestQueue<QUEUE_SIZE> {
        &self.queue
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn is_packet_identifier_used(&self, packet_identifier: u16) -> bool {
        self.session
            .is_used_cpublish_packet_identifier(packet_identifier)
            || self.pending_suback.contains(&packet_identifier)
            || self.pending_unsuback.contains(&packet_identifier)
    }

    fn packet_identifier(&mut self) -> u16 {
        loop {
            let packet_identifier = self.packet_identifier_counter;
            self.packet_identifier_counter = match self.packet_identifier_counter {
                u16::MAX => 1,
                i => i + 1,
            };

            if !self.is_packet_identifier_used(packet_identifier) {
                break packet_identifier;
            }
        }
    }

    fn topic_name(&self, topic: &str) -> Result<TopicName, MqttError> {
        if topic.len() > self.config.max_topic_length {
            return Err(MqttError::InvalidTopic);
        }
        TopicName::new(topic).ok_or(MqttError::InvalidTopic)
    }

    fn topic_filter(&self, filter: &str) -> Result<TopicFilter, MqttError> {
        if filter.len() > self.config.max_topic_length {
            return Err(MqttError::InvalidTopic);
        }
        TopicFilter::new(filter).ok_or(MqttError::InvalidTopic)
    }

    /// Starts connecting to a broker.
    ///
    /// Builds the CONNECT packet from the address's credentials, `client_identifier`, the keep
    /// alive interval and the will, then asks the transport to open a connection. A previous
    /// connection is closed first. The CONNECT is transmitted with the next
    /// [`Client::on_ready_to_write`], before anything in the queue.
    ///
    /// Success means the attempt started. The CONNACK dispatched to the
    /// [`PacketType::Connack`] handler tells whether the broker accepted it.
    pub fn connect(&mut self, url: &BrokerUrl, client_identifier: &str) -> Result<(), MqttError> {
        url.validate()?;
        if client_identifier.len() > MAX_STRING_LEN {
            return Err(MqttError::InvalidClientIdentifier);
        }

        if self.session.phase() != Phase::Disconnected {
            debug!("closing the previous connection");
            self.transport.close();
            self.teardown();
        }

        if self.config.clean_session {
            self.clear_in_flight();
        }

        let connect = ConnectPacket {
            client_identifier: client_identifier.into(),
            keep_alive: self.session.keep_alive(),
            clean_session: self.config.clean_session,
            user_name: url.user.clone(),
            password: url.password.clone(),
            will: self.will.clone(),
        };
        info!(
            "connecting to {}:{} (tls: {})",
            url.host.as_str(),
            url.port(),
            url.is_tls()
        );

        self.transport
            .connect(&url.host, url.port(), url.is_tls())
            .map_err(|e| {
                let kind = e.kind();
                error!("transport failed to connect: {:?}", kind);
                MqttError::Transport(kind)
            })?;

        self.pending_connect = Some(connect);
        self.connection = self.connection.wrapping_add(1);
        self.session.set_phase(Phase::Connecting);

        Ok(())
    }

    /// Forgets in-flight state of the previous session but keeps tracking publications that
    /// are still queued.
    fn clear_in_flight(&mut self) {
        self.session.clear();
        self.pending_suback.clear();
        self.pending_unsuback.clear();

        for packet in self.queue.iter() {
            let result = match packet {
                Packet::Publish(PublishPacket {
                    flags,
                    packet_identifier: Some(pid),
                    ..
                })
                | Packet::PublishStream(StreamedPublishPacket {
                    flags,
                    packet_identifier: Some(pid),
                    ..
                }) => match flags.qos {
                    QoS::AtMostOnce => Ok(()),
                    QoS::AtLeastOnce => self.session.await_puback(*pid),
                    QoS::ExactlyOnce => self.session.await_pubrec(*pid),
                },
                Packet::Subscribe(s) => self
                    .pending_suback
                    .push(s.packet_identifier)
                    .map_err(|_| FlightTableFull),
                Packet::Unsubscribe(u) => self
                    .pending_unsuback
                    .push(u.packet_identifier)
                    .map_err(|_| FlightTableFull),
                _ => Ok(()),
            };

            // The tables were empty and hold at least as many entries as were tracked before.
            debug_assert!(result.is_ok());
        }
    }

    /// Queues a DISCONNECT packet. The transport is closed once it has been written.
    ///
    /// Without a connection nothing is queued and the transport is closed right away.
    pub fn disconnect(&mut self) -> Result<(), MqttError> {
        if self.session.phase() == Phase::Disconnected {
            debug!("not connected, closing the transport");
            self.transport.close();
            return Ok(());
        }

        self.queue
            .enqueue(Packet::Disconnect)
            .map_err(|_| MqttError::QueueFull)
    }

    /// Queues a PUBLISH packet and returns its packet identifier, 0 for QoS 0.
    ///
    /// QoS 1 and 2 publications are tracked as in flight until acknowledged.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        flags: PublishFlags,
    ) -> Result<u16, MqttError> {
        let topic = self.topic_name(topic)?;

        self.enqueue_publish(flags, |packet_identifier| {
            PublishPacket::new(topic, payload, flags, packet_identifier).map(Packet::Publish)
        })
    }

    /// Queues a PUBLISH packet whose `payload_len` bytes of payload are read from `source`
    /// while it is transmitted, and returns its packet identifier, 0 for QoS 0.
    ///
    /// The payload is handed to the transport in pieces of `ClientConfig::stream_chunk_len`
    /// bytes, one per [`Client::on_ready_to_write`]. Nothing else is transmitted in between.
    pub fn publish_stream<S: PayloadSource + 'static>(
        &mut self,
        topic: &str,
        source: S,
        payload_len: usize,
        flags: PublishFlags,
    ) -> Result<u16, MqttError> {
        let topic = self.topic_name(topic)?;

        self.enqueue_publish(flags, |packet_identifier| {
            StreamedPublishPacket::new(
                topic,
                Box::new(source),
                payload_len,
                flags,
                packet_identifier,
            )
            .map(Packet::PublishStream)
        })
    }

    fn enqueue_publish(
        &mut self,
        flags: PublishFlags,
        build: impl FnOnce(u16) -> Result<Packet, TooLargeToEncode>,
    ) -> Result<u16, MqttError> {
        if self.queue.is_full() {
            return Err(MqttError::QueueFull);
        }

        let packet_identifier = match flags.qos {
            QoS::AtMostOnce => 0,
            _ if self.session.pending_client_publishes.remaining_capacity() == 0 => {
                return Err(MqttError::SessionBuffer);
            }
            _ => self.packet_identifier(),
        };

        let packet = build(packet_identifier).map_err(|_| MqttError::PacketTooLong)?;

        self.queue
            .enqueue(packet)
            .map_err(|_| MqttError::QueueFull)?;

        match flags.qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => self.session.await_puback(packet_identifier),
            QoS::ExactlyOnce => self.session.await_pubrec(packet_identifier),
        }
        .map_err(|_| MqttError::SessionBuffer)?;

        debug!(
            "queued PUBLISH with {:?} and packet identifier {}",
            flags.qos, packet_identifier
        );

        Ok(packet_identifier)
    }

    /// Queues a SUBSCRIBE packet requesting QoS 0 and returns its packet identifier.
    pub fn subscribe(&mut self, filter: &str) -> Result<u16, MqttError> {
        self.subscribe_with_qos(filter, QoS::AtMostOnce)
    }

    /// Queues a SUBSCRIBE packet requesting `qos` and returns its packet identifier.
    pub fn subscribe_with_qos(&mut self, filter: &str, qos: QoS) -> Result<u16, MqttError> {
        let filter = self.topic_filter(filter)?;

        if self.queue.is_full() {
            return Err(MqttError::QueueFull);
        }
        if self.pending_suback.is_full() {
            return Err(MqttError::SessionBuffer);
        }

        let packet_identifier = self.packet_identifier();
        self.queue
            .enqueue(Packet::Subscribe(SubscribePacket {
                packet_identifier,
                filter,
                qos,
            }))
            .map_err(|_| MqttError::QueueFull)?;
        self.pending_suback
            .push(packet_identifier)
            .map_err(|_| MqttError::SessionBuffer)?;

        debug!("queued SUBSCRIBE with packet identifier {}", packet_identifier);

        Ok(packet_identifier)
    }

    /// Queues an UNSUBSCRIBE packet and returns its packet identifier.
    pub fn unsubscribe(&mut self, filter: &str) -> Result<u16, MqttError> {
        let filter = self.topic_filter(filter)?;

        if self.queue.is_full() {
            return Err(MqttError::QueueFull);
        }
        if self.pending_unsuback.is_full() {
            return Err(MqttError::SessionBuffer);
        }

        let packet_identifier = self.packet_identifier();
        self.queue
            .enqueue(Packet::Unsubscribe(UnsubscribePacket {
                packet_identifier,
                filter,
            }))
            .map_err(|_| MqttError::QueueFull)?;
        self.pending_unsuback
            .push(packet_identifier)
            .map_err(|_| MqttError::SessionBuffer)?;

        debug!(
            "queued UNSUBSCRIBE with packet identifier {}",
            packet_identifier
        );

        Ok(packet_identifier)
    }

    /// Drops every queued packet that has not been transmitted yet. A streamed PUBLISH already
    /// being transmitted is completed.
    ///
    /// In-flight tracking of dropped publications and subscription requests ends with them.
    pub fn clear_queue(&mut self) {
        while let Some(packet) = self.queue.dequeue() {
            match packet {
                Packet::Publish(PublishPacket {
                    packet_identifier: Some(pid),
                    ..
                })
                | Packet::PublishStream(StreamedPublishPacket {
                    packet_identifier: Some(pid),
                    ..
                }) => {
                    self.session.remove_cpublish(pid);
                }
                Packet::Subscribe(s) => {
                    remove_packet_identifier(&mut self.pending_suback, s.packet_identifier);
                }
                Packet::Unsubscribe(u) => {
                    remove_packet_identifier(&mut self.pending_unsuback, u.packet_identifier);
                }
                Packet::Pingreq => self.session.on_ping_cancelled(),
                _ => {}
            }
        }

        debug!("cleared the request queue");
    }

    /// Sets the will sent with the next CONNECT.
    pub fn set_will(
        &mut self,
        topic: &str,
        message: &[u8],
        flags: PublishFlags,
    ) -> Result<(), MqttError> {
        let topic = self.topic_name(topic)?;
        self.will = Some(Will::new(topic, message, flags).ok_or(MqttError::PacketTooLong)?);
        Ok(())
    }

    /// Removes the will. Takes effect with the next CONNECT.
    pub fn clear_will(&mut self) {
        self.will = None;
    }

    /// Sets the keep alive interval in seconds. It is sent with the next CONNECT and applies
    /// to the keep alive scheduling immediately. 0 disables the keep alive timeout.
    pub fn set_keep_alive(&mut self, seconds: u16) {
        self.config.keep_alive = seconds;
        self.session.set_keep_alive(seconds);
    }

    /// Sets the interval of silence in seconds after which a PINGREQ is queued.
    /// Never exceeds half of a non-zero keep alive interval.
    pub fn set_ping_repeat_time(&mut self, seconds: u16) {
        self.config.ping_repeat_time = seconds;
        self.session.set_ping_repeat_time(seconds);
    }

    /// Registers the handler for a packet type, replacing the previous one.
    pub fn set_event_handler<F>(&mut self, packet_type: PacketType, handler: F)
    where
        F: FnMut(&mut Self, &Message<'_>) -> i32 + 'static,
    {
        self.handlers.set(packet_type, Box::new(handler));
    }

    /// Unregisters the handler for a packet type. Returns whether one was registered.
    pub fn remove_event_handler(&mut self, packet_type: PacketType) -> bool {
        let registered = self.handlers.is_registered(packet_type);
        self.handlers.remove(packet_type);
        registered
    }

    /// Registers the handler for CONNACK packets.
    pub fn set_connected_handler<F>(&mut self, mut handler: F)
    where
        F: FnMut(&mut Self, &Connack) -> i32 + 'static,
    {
        self.set_event_handler(PacketType::Connack, move |client, message| match message {
            Message::Connack(connack) => handler(client, connack),
            _ => 0,
        });
    }

    /// Registers one handler for both PUBACK and PUBREC packets, which acknowledge the
    /// receipt of QoS 1 and QoS 2 publications.
    pub fn set_published_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Self, &Message<'_>) -> i32 + 'static,
    {
        let handler = Rc::new(RefCell::new(handler));

        for packet_type in [PacketType::Puback, PacketType::Pubrec] {
            let handler = handler.clone();
            let shared: EventHandler<Self> =
                Box::new(move |client: &mut Self, message: &Message<'_>| {
                    match handler.try_borrow_mut() {
                        Ok(mut h) => (*h)(client, message),
                        Err(_) => 0,
                    }
                });
            self.handlers.set(packet_type, shared);
        }
    }

    /// Registers the handler for PUBLISH packets.
    pub fn set_message_handler<F>(&mut self, mut handler: F)
    where
        F: FnMut(&mut Self, &Publish<'_>) -> i32 + 'static,
    {
        self.set_event_handler(PacketType::Publish, move |client, message| match message {
            Message::Publish(publish) => handler(client, publish),
            _ => 0,
        });
    }

    /// Registers the handler notified when a connection ends for any reason other than a
    /// replacement by [`Client::connect`].
    pub fn set_disconnect_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Self, DisconnectReason) + 'static,
    {
        self.disconnect_handler = Some(Box::new(handler));
    }

    /// Replaces the consumer of PUBLISH payloads. Whatever it stages in
    /// [`PayloadParserState::staged`] is dispatched as [`Publish::payload`].
    pub fn set_payload_parser<P: PayloadParser + 'static>(&mut self, parser: P) {
        self.payload_parser = Box::new(parser);
    }

    /// Restores the default parser staging up to `ClientConfig::payload_limit` bytes.
    pub fn clear_payload_parser(&mut self) {
        self.payload_parser = Box::new(StagingParser::new(self.config.payload_limit));
    }

    /// The transport is ready to accept bytes.
    ///
    /// Transmits at most one packet: the pending CONNECT if there is one, otherwise the oldest
    /// queued packet. A PUBLISH with a streamed payload takes one call per chunk and keeps the
    /// client in [`SendState::SendingData`] until its last chunk was written. Returns the type of
    /// the transmitted packet, or `None` if there was nothing to send. Nothing is sent while
    /// disconnected. Call repeatedly to drain the queue.
    pub fn on_ready_to_write(&mut self, now: Instant) -> Result<Option<PacketType>, MqttError> {
        if self.session.phase() == Phase::Disconnected {
            return Ok(None);
        }

        self.tx_buffer.clear();

        if self.send_state == SendState::SendingData {
            self.fill_payload_chunk()?;
            self.write_tx_buffer(PacketType::Publish, now)?;
            return Ok(Some(PacketType::Publish));
        }

        let packet = match self.pending_connect.take() {
            Some(connect) => {
                self.session.start(now);
                Packet::Connect(connect)
            }
            None => match self.queue.dequeue() {
                Some(packet) => packet,
                None => return Ok(None),
            },
        };

        let packet_type = packet.packet_type();
        self.send_state = SendState::SendingData;

        if codec::encode(&packet, &mut self.tx_buffer).is_err() {
            // Constructors reject packets whose remaining length is not encodable.
            self.send_state = SendState::Ready;
            error!("failed to encode {:?} packet", packet_type);
            return Err(MqttError::PacketTooLong);
        }

        if let Packet::PublishStream(publish) = packet {
            let (source, remaining) = publish.into_source();
            self.outgoing = Some(OutgoingPayload { source, remaining });
            self.fill_payload_chunk()?;
        }

        self.write_tx_buffer(packet_type, now)?;

        if packet_type == PacketType::Disconnect {
            info!("disconnected");
            self.shutdown(DisconnectReason::Requested);
        }

        Ok(Some(packet_type))
    }

    /// Appends the next chunk of the streamed payload to the transmit buffer.
    fn fill_payload_chunk(&mut self) -> Result<(), MqttError> {
        let Some(outgoing) = &mut self.outgoing else {
            return Ok(());
        };

        let chunk_len = outgoing.remaining.min(self.config.stream_chunk_len.max(1));
        let start = self.tx_buffer.len();
        self.tx_buffer.resize(start + chunk_len, 0);

        let mut filled = start;
        let result = loop {
            if filled == self.tx_buffer.len() {
                break Ok(());
            }
            let buf = &mut self.tx_buffer[filled..];
            match PayloadSource::read(&mut *outgoing.source, buf) {
                Ok(0) => break Err(ErrorKind::InvalidData),
                Ok(n) => filled += n.min(buf.len()),
                Err(kind) => break Err(kind),
            }
        };

        match result {
            Ok(()) => {
                outgoing.remaining -= chunk_len;
                trace!("{} bytes of streamed payload left", outgoing.remaining);
                if outgoing.remaining == 0 {
                    self.outgoing = None;
                }
                Ok(())
            }
            Err(kind) => {
                error!("payload source failed mid-packet: {:?}", kind);
                self.shutdown(DisconnectReason::PayloadSource(kind));
                Err(MqttError::PayloadSource(kind))
            }
        }
    }

    /// Hands the transmit buffer to the transport.
    fn write_tx_buffer(&mut self, packet_type: PacketType, now: Instant) -> Result<(), MqttError> {
        trace!("writing {} bytes", self.tx_buffer.len());

        if let Err(e) = self.transport.write(&self.tx_buffer) {
            let kind = e.kind();
            error!("transport failed to write {:?} packet: {:?}", packet_type, kind);
            self.shutdown(DisconnectReason::Transport(kind));
            return Err(MqttError::Transport(kind));
        }

        self.session.on_sent(now);

        if self.outgoing.is_none() {
            self.send_state = SendState::Ready;
            debug!("sent {:?} packet", packet_type);
        }

        Ok(())
    }

    /// The transport received bytes from the broker.
    ///
    /// Parses them incrementally, queues the acknowledgments the protocol requires and
    /// dispatches every completed packet to its handler. Packets may span any number of calls.
    /// A framing error closes the connection.
    pub fn on_bytes_received(&mut self, bytes: &[u8], now: Instant) -> Result<(), MqttError> {
        if self.session.phase() == Phase::Disconnected {
            warn!("dropping {} bytes received while disconnected", bytes.len());
            return Ok(());
        }

        trace!("received {} bytes", bytes.len());
        self.session.on_received(now);

        let connection = self.connection;
        let mut input = bytes;

        loop {
            let event = match self.parser.next_event(&mut input) {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!("closing connection after framing error: {:?}", e);
                    self.shutdown(DisconnectReason::Framing(e));
                    return Err(MqttError::Framing(e));
                }
            };

            let assembled = self.assembler.on_event(
                event,
                &mut *self.payload_parser,
                &mut self.payload_state,
            );

            if let Some(assembled) = assembled {
                self.complete(assembled);

                // A handler or a refused CONNACK ended this connection.
                if self.connection != connection {
                    if !input.is_empty() {
                        debug!("discarding {} bytes of the ended connection", input.len());
                    }
                    return Ok(());
                }
            }
        }
    }

    /// The transport closed. Ignored while disconnected.
    pub fn on_closed(&mut self, reason: DisconnectReason) {
        if self.session.phase() == Phase::Disconnected {
            return;
        }

        info!("connection closed: {:?}", reason);
        self.shutdown(reason);
    }

    /// Drives the keep alive scheduling. Call periodically, at least once per second for
    /// timely pings.
    ///
    /// Queues a PINGREQ after the ping repeat interval of outbound or inbound silence. Closes the
    /// connection and returns [`MqttError::KeepAliveTimeout`] if nothing has been received for
    /// the keep alive interval.
    pub fn check_keep_alive(&mut self, now: Instant) -> Result<(), MqttError> {
        match self.session.poll_keep_alive(now) {
            KeepAlive::Idle => Ok(()),
            KeepAlive::Ping => {
                match self.queue.enqueue(Packet::Pingreq) {
                    Ok(()) => {
                        debug!("queued PINGREQ");
                        self.session.on_ping_queued();
                    }
                    Err(_) => warn!("request queue full, deferring PINGREQ"),
                }
                Ok(())
            }
            KeepAlive::Expired => {
                warn!(
                    "nothing received within the keep alive interval of {}s",
                    self.session.keep_alive()
                );
                self.shutdown(DisconnectReason::KeepAliveTimeout);
                Err(MqttError::KeepAliveTimeout)
            }
        }
    }

    fn complete(&mut self, assembled: Assembled) {
        match assembled {
            Assembled::Publish { publish, dropped } => {
                debug!(
                    "received PUBLISH on {} with {:?}",
                    publish.topic.as_str(),
                    publish.flags.qos
                );

                match (publish.flags.qos, publish.packet_identifier) {
                    (QoS::AtLeastOnce, Some(pid)) => self.queue_ack(Packet::Puback(pid)),
                    (QoS::ExactlyOnce, Some(pid)) => {
                        if self.session.await_pubrel(pid).is_err() {
                            warn!("in-flight table full, not tracking PUBREL for {}", pid);
                        }
                        self.queue_ack(Packet::Pubrec(pid));
                    }
                    _ => {}
                }

                if !dropped {
                    self.dispatch_publish(publish);
                }
            }
            Assembled::Control(incoming) => self.handle_control(incoming),
        }
    }

    fn handle_control(&mut self, incoming: Incoming) {
        let packet_type = incoming.packet_type();
        debug!("received {:?} packet", packet_type);

        let mut refused = None;

        match &incoming {
            Incoming::Connack(connack) if connack.return_code.is_accepted() => {
                if connack.session_present {
                    info!("connected, resuming session");
                } else {
                    info!("connected");
                }
                self.session.set_phase(Phase::Connected);
            }
            Incoming::Connack(connack) => {
                warn!("broker refused connection: {:?}", connack.return_code);
                refused = Some(connack.return_code);
            }
            Incoming::Puback(pid) => match self.session.cpublish_flight_state(*pid) {
                Some(CPublishFlightState::AwaitingPuback) => {
                    self.session.remove_cpublish(*pid);
                }
                _ => warn!("PUBACK for {} which is not awaiting one", pid),
            },
            Incoming::Pubrec(pid) => {
                match self.session.cpublish_flight_state(*pid) {
                    Some(
                        CPublishFlightState::AwaitingPubrec
                        | CPublishFlightState::AwaitingPubcomp,
                    ) => {
                        // Replaces the existing entry, so there is capacity.
                        let _ = self.session.await_pubcomp(*pid);
                    }
                    _ => warn!("PUBREC for {} which is not awaiting one", pid),
                }
                self.queue_ack(Packet::Pubrel(*pid));
            }
            Incoming::Pubrel(pid) => {
                if self.session.remove_spublish(*pid).is_none() {
                    warn!("PUBREL for {} which is not awaiting one", pid);
                }
                self.queue_ack(Packet::Pubcomp(*pid));
            }
            Incoming::Pubcomp(pid) => match self.session.cpublish_flight_state(*pid) {
                Some(CPublishFlightState::AwaitingPubcomp) => {
                    self.session.remove_cpublish(*pid);
                }
                _ => warn!("PUBCOMP for {} which is not awaiting one", pid),
            },
            Incoming::Suback(suback) => {
                if !remove_packet_identifier(&mut self.pending_suback, suback.packet_identifier) {
                    warn!("SUBACK for {} which is not awaiting one", suback.packet_identifier);
                }
            }
            Incoming::Unsuback(pid) => {
                if !remove_packet_identifier(&mut self.pending_unsuback, *pid) {
                    warn!("UNSUBACK for {} which is not awaiting one", pid);
                }
            }
            Incoming::Pingresp | Incoming::Publish => {}
        }

        if let Some(message) = Message::from_control(incoming) {
            self.dispatch(&message);
        }

        if let Some(code) = refused {
            self.shutdown(DisconnectReason::Refused(code));
        }
    }

    fn dispatch_publish(&mut self, publish: PublishHeader) {
        let mut staged = core::mem::take(&mut self.payload_state.staged);

        let message = Message::Publish(Publish {
            topic: &publish.topic,
            flags: publish.flags,
            dup: publish.dup,
            packet_identifier: publish.packet_identifier,
            payload: &staged,
            payload_len: publish.payload_len,
        });
        self.dispatch(&message);

        staged.clear();
        self.payload_state.staged = staged;
    }

    /// Invokes the handler registered for the message's type and passes its result through.
    /// Messages without a handler are dropped.
    fn dispatch(&mut self, message: &Message<'_>) -> Option<i32> {
        let packet_type = message.packet_type();

        let Some(mut handler) = self.handlers.take(packet_type) else {
            trace!("no handler for {:?} packet", packet_type);
            return None;
        };

        let result = handler(self, message);
        self.handlers.restore(packet_type, handler);

        Some(result)
    }

    fn queue_ack(&mut self, packet: Packet) {
        if let Err(packet) = self.queue.enqueue(packet) {
            error!(
                "request queue full, dropping {:?} packet",
                packet.packet_type()
            );
        }
    }

    /// Resets the per-connection state.
    fn teardown(&mut self) {
        if self.assembler.in_progress() {
            debug!("discarding a partially received packet");
        }

        self.session.stop();
        self.parser.reset();
        self.assembler.reset();
        self.payload_state.reset(0);
        self.pending_connect = None;
        self.outgoing = None;
        self.send_state = SendState::Ready;
        self.connection = self.connection.wrapping_add(1);

        // DISCONNECT and PINGREQ belong to the connection they were queued for.
        self.queue
            .retain(|p| !matches!(p, Packet::Disconnect | Packet::Pingreq));
    }

    /// Closes the transport, ends the connection and notifies the disconnect handler.
    fn shutdown(&mut self, reason: DisconnectReason) {
        self.transport.close();
        self.teardown();

        if let Some(mut handler) = self.disconnect_handler.take() {
            handler(self, reason);
            if self.disconnect_handler.is_none() {
                self.disconnect_handler = Some(handler);
            }
        }
    }
}

/// Returns true if the packet identifier existed.
fn remove_packet_identifier<const M: usize>(vec: &mut heapless::Vec<u16, M>, pid: u16) -> bool {
    if let Some(i) = vec.iter().position(|p| *p == pid) {
        vec.swap_remove(i);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod unit {
    use alloc::{rc::Rc, vec::Vec};
    use core::cell::{Cell, RefCell};

    use tokio_test::{assert_err, assert_ok};

    use crate::{
        BrokerUrl, Client, DisconnectReason, Instant, MqttError, PacketType, PublishFlags, QoS,
        client::SendState,
        codec::encode,
        eio::ErrorKind,
        packet::{Packet, PublishPacket},
        session::{CPublishFlightState, Phase},
        test::transport::MockTransport,
        types::TopicName,
    };

    type TestClient = Client<MockTransport, 4, 2>;

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn connected() -> TestClient {
        let mut c = TestClient::new(MockTransport::default());
        assert_ok!(c.connect(&BrokerUrl::mqtt("broker"), "id"));
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Connect)
        );
        assert_ok!(c.on_bytes_received(&CONNACK, Instant::ZERO));
        assert!(c.is_connected());
        c
    }

    fn record_disconnects(c: &mut TestClient) -> Rc<RefCell<Vec<DisconnectReason>>> {
        let reasons = Rc::new(RefCell::new(Vec::new()));
        let r = reasons.clone();
        c.set_disconnect_handler(move |_, reason| r.borrow_mut().push(reason));
        reasons
    }

    #[test_log::test]
    fn packet_identifiers_wrap_and_skip_used() {
        let mut c = connected();
        let qos1 = PublishFlags::new(QoS::AtLeastOnce);

        c.packet_identifier_counter = u16::MAX;
        assert_eq!(assert_ok!(c.publish("t", b"", qos1)), u16::MAX);
        assert_eq!(assert_ok!(c.publish("t", b"", qos1)), 1);

        c.packet_identifier_counter = 1;
        assert_eq!(assert_ok!(c.subscribe("t")), 2);
    }

    #[test_log::test]
    fn in_flight_capacity() {
        let mut c = connected();
        let qos1 = PublishFlags::new(QoS::AtLeastOnce);

        assert_ok!(c.publish("t", b"", qos1));
        assert_ok!(c.publish("t", b"", qos1));
        assert_eq!(
            assert_err!(c.publish("t", b"", qos1)),
            MqttError::SessionBuffer
        );
        assert_eq!(assert_ok!(c.publish("t", b"", PublishFlags::default())), 0);
    }

    #[test_log::test]
    fn clear_queue_ends_tracking() {
        let mut c = connected();

        assert_ok!(c.publish("t", b"x", PublishFlags::new(QoS::ExactlyOnce)));
        assert_ok!(c.subscribe("t"));
        c.clear_queue();

        assert_eq!(c.queued(), 0);
        assert_eq!(c.session().in_flight_cpublishes(), 0);
        assert!(c.pending_suback.is_empty());
    }

    #[test_log::test]
    fn reconnect_keeps_queued_publications() {
        let mut c = connected();
        let disconnects = record_disconnects(&mut c);

        let pid = assert_ok!(c.publish("t", b"x", PublishFlags::new(QoS::AtLeastOnce)));
        assert_ok!(c.connect(&BrokerUrl::mqtt("other"), "id"));

        assert_eq!(c.transport().closes, 1);
        assert!(disconnects.borrow().is_empty());
        assert_eq!(c.phase(), Phase::Connecting);
        assert_eq!(
            c.session().cpublish_flight_state(pid),
            Some(CPublishFlightState::AwaitingPuback)
        );

        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Connect)
        );
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Publish)
        );
    }

    #[test_log::test]
    fn reconnect_in_handler_discards_remaining_bytes() {
        let mut c = TestClient::new(MockTransport::default());
        let pings = Rc::new(Cell::new(0));

        let p = pings.clone();
        c.set_event_handler(PacketType::Pingresp, move |_, _| {
            p.set(p.get() + 1);
            0
        });
        c.set_connected_handler(|client, _| {
            let _ = client.connect(&BrokerUrl::mqtt("other"), "id");
            0
        });

        assert_ok!(c.connect(&BrokerUrl::mqtt("broker"), "id"));
        assert_ok!(c.on_ready_to_write(Instant::ZERO));
        assert_ok!(c.on_bytes_received(&[0x20, 0x02, 0x00, 0x00, 0xD0, 0x00], Instant::ZERO));

        assert_eq!(pings.get(), 0);
        assert_eq!(c.phase(), Phase::Connecting);
        assert_eq!(c.transport().connects.len(), 2);
    }

    #[test_log::test]
    fn published_handler_sees_puback_and_pubrec() {
        let mut c = connected();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        c.set_published_handler(move |_, message| {
            s.borrow_mut()
                .push((message.packet_type(), message.packet_identifier()));
            0
        });

        let p1 = assert_ok!(c.publish("t", b"1", PublishFlags::new(QoS::AtLeastOnce)));
        let p2 = assert_ok!(c.publish("t", b"2", PublishFlags::new(QoS::ExactlyOnce)));
        while assert_ok!(c.on_ready_to_write(Instant::ZERO)).is_some() {}

        let [h1, l1] = p1.to_be_bytes();
        let [h2, l2] = p2.to_be_bytes();
        assert_ok!(c.on_bytes_received(&[0x40, 0x02, h1, l1, 0x50, 0x02, h2, l2], Instant::ZERO));

        assert_eq!(
            *seen.borrow(),
            [
                (PacketType::Puback, Some(p1)),
                (PacketType::Pubrec, Some(p2))
            ]
        );
        assert_eq!(c.session().cpublish_flight_state(p1), None);
        assert_eq!(
            c.session().cpublish_flight_state(p2),
            Some(CPublishFlightState::AwaitingPubcomp)
        );
        assert_eq!(c.queued(), 1);
    }

    #[test_log::test]
    fn write_failure_disconnects() {
        let mut c = connected();
        let disconnects = record_disconnects(&mut c);

        assert_ok!(c.subscribe("t"));
        c.transport_mut().fail_write = Some(ErrorKind::BrokenPipe);

        assert_eq!(
            assert_err!(c.on_ready_to_write(Instant::ZERO)),
            MqttError::Transport(ErrorKind::BrokenPipe)
        );
        assert_eq!(c.phase(), Phase::Disconnected);
        assert_eq!(c.transport().closes, 1);
        assert_eq!(
            *disconnects.borrow(),
            [DisconnectReason::Transport(ErrorKind::BrokenPipe)]
        );
    }

    #[test_log::test]
    fn connect_failure_stays_disconnected() {
        let mut c = TestClient::new(MockTransport::default());
        c.transport_mut().fail_connect = Some(ErrorKind::ConnectionRefused);

        assert_eq!(
            assert_err!(c.connect(&BrokerUrl::mqtt("broker"), "id")),
            MqttError::Transport(ErrorKind::ConnectionRefused)
        );
        assert_eq!(c.phase(), Phase::Disconnected);
        assert_eq!(assert_ok!(c.on_ready_to_write(Instant::ZERO)), None);
    }

    #[test_log::test]
    fn disconnect_closes_after_sending() {
        let mut c = connected();
        let disconnects = record_disconnects(&mut c);

        assert_ok!(c.disconnect());
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Disconnect)
        );

        assert_eq!(c.transport().written_types(), [0x10, 0xE0]);
        assert_eq!(c.phase(), Phase::Disconnected);
        assert_eq!(*disconnects.borrow(), [DisconnectReason::Requested]);
    }

    #[test_log::test]
    fn unsent_disconnect_ends_with_its_connection() {
        let mut c = connected();
        let disconnects = record_disconnects(&mut c);

        assert_ok!(c.disconnect());
        assert_ok!(c.check_keep_alive(Instant::from_secs(20)));
        assert_ok!(c.publish("t", b"x", PublishFlags::default()));
        assert_eq!(c.queued(), 3);

        c.on_closed(DisconnectReason::Closed);
        assert_eq!(c.queued(), 1);
        assert!(!c.session().is_ping_outstanding());

        assert_ok!(c.connect(&BrokerUrl::mqtt("broker"), "id"));
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Connect)
        );
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Publish)
        );
        assert_eq!(assert_ok!(c.on_ready_to_write(Instant::ZERO)), None);

        assert_eq!(c.phase(), Phase::Connecting);
        assert_eq!(*disconnects.borrow(), [DisconnectReason::Closed]);
    }

    #[test_log::test]
    fn disconnect_without_connection_only_closes() {
        let mut c = TestClient::new(MockTransport::default());

        assert_ok!(c.disconnect());
        assert_eq!(c.queued(), 0);
        assert_eq!(c.transport().closes, 1);

        assert_ok!(c.connect(&BrokerUrl::mqtt("broker"), "id"));
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Connect)
        );
        assert_eq!(assert_ok!(c.on_ready_to_write(Instant::ZERO)), None);
        assert_eq!(c.phase(), Phase::Connecting);
    }

    static PAYLOAD: [u8; 2500] = [0x5A; 2500];

    #[test_log::test]
    fn streamed_publish_spans_several_writes() {
        let mut c = connected();
        let flags = PublishFlags::new(QoS::AtLeastOnce);

        let pid = assert_ok!(c.publish_stream("t", &PAYLOAD[..], PAYLOAD.len(), flags));
        assert_ok!(c.subscribe("s"));
        assert_eq!(
            c.session().cpublish_flight_state(pid),
            Some(CPublishFlightState::AwaitingPuback)
        );

        let mut sent = Vec::new();
        while let Some(packet_type) = assert_ok!(c.on_ready_to_write(Instant::ZERO)) {
            sent.push((packet_type, c.send_state()));
        }
        assert_eq!(
            sent,
            [
                (PacketType::Publish, SendState::SendingData),
                (PacketType::Publish, SendState::SendingData),
                (PacketType::Publish, SendState::Ready),
                (PacketType::Subscribe, SendState::Ready),
            ]
        );

        // CONNECT, three pieces of the PUBLISH, SUBSCRIBE
        let written = &c.transport().written;
        assert_eq!(written.len(), 5);
        // fixed header 3 bytes, topic 3 bytes, packet identifier 2 bytes
        assert_eq!(written[1].len(), 8 + 1024);
        assert_eq!(written[2].len(), 1024);
        assert_eq!(written[3].len(), 452);

        let copied = assert_ok!(PublishPacket::new(
            TopicName::new("t").unwrap(),
            &PAYLOAD,
            flags,
            pid
        ));
        let mut expected = Vec::new();
        assert_ok!(encode(&Packet::Publish(copied), &mut expected));
        assert_eq!(written[1..4].concat(), expected);
    }

    #[test_log::test]
    fn short_payload_source_disconnects() {
        let mut c = connected();
        let disconnects = record_disconnects(&mut c);

        assert_ok!(c.publish_stream("t", &b"abc"[..], 10, PublishFlags::default()));
        assert_eq!(
            assert_err!(c.on_ready_to_write(Instant::ZERO)),
            MqttError::PayloadSource(ErrorKind::InvalidData)
        );

        assert_eq!(c.phase(), Phase::Disconnected);
        assert_eq!(c.send_state(), SendState::Ready);
        assert_eq!(c.transport().written_types(), [0x10]);
        assert_eq!(
            *disconnects.borrow(),
            [DisconnectReason::PayloadSource(ErrorKind::InvalidData)]
        );
    }

    #[test_log::test]
    fn closing_mid_stream_drops_the_rest() {
        let mut c = connected();
        assert_ok!(c.publish_stream("t", &PAYLOAD[..], PAYLOAD.len(), PublishFlags::default()));

        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Publish)
        );
        assert_eq!(c.send_state(), SendState::SendingData);

        c.on_closed(DisconnectReason::Closed);
        assert_eq!(c.send_state(), SendState::Ready);

        assert_ok!(c.connect(&BrokerUrl::mqtt("broker"), "id"));
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Connect)
        );
        assert_eq!(assert_ok!(c.on_ready_to_write(Instant::ZERO)), None);
    }

    #[test_log::test]
    fn partial_packet_is_discarded_on_close() {
        let mut c = connected();

        // PUBLISH "a/b" cut before its payload
        assert_ok!(c.on_bytes_received(&[0x30, 0x06, 0x00, 0x03, b'a'], Instant::ZERO));
        assert!(c.assembler.in_progress());

        c.on_closed(DisconnectReason::Closed);
        assert!(!c.assembler.in_progress());

        assert_ok!(c.connect(&BrokerUrl::mqtt("broker"), "id"));
        assert_eq!(
            assert_ok!(c.on_ready_to_write(Instant::ZERO)),
            Some(PacketType::Connect)
        );
        assert_ok!(c.on_bytes_received(&CONNACK, Instant::ZERO));
        assert!(c.is_connected());
    }
}
