#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use rust_mqtt_session::{
    BrokerUrl, Client, DisconnectReason, Instant, PacketType, PublishFlags,
    codec::encode,
    config::ClientConfig,
    io::StreamTransport,
    packet::PublishPacket,
    types::TopicName,
};
use tokio_test::assert_ok;

pub type TestClient = Client<StreamTransport>;

pub const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
pub const PINGREQ: [u8; 2] = [0xC0, 0x00];
pub const PINGRESP: [u8; 2] = [0xD0, 0x00];

pub fn ack(packet_type: PacketType, packet_identifier: u16) -> [u8; 4] {
    let first = match packet_type {
        PacketType::Puback => 0x40,
        PacketType::Pubrec => 0x50,
        PacketType::Pubrel => 0x62,
        PacketType::Pubcomp => 0x70,
        PacketType::Unsuback => 0xB0,
        other => panic!("{other:?} is not an acknowledgment"),
    };
    let [hi, lo] = packet_identifier.to_be_bytes();
    [first, 0x02, hi, lo]
}

pub fn publish_bytes(topic: &str, payload: &[u8], flags: PublishFlags, pid: u16) -> Vec<u8> {
    let packet = assert_ok!(PublishPacket::new(
        TopicName::new(topic).unwrap(),
        payload,
        flags,
        pid
    ));
    let mut bytes = Vec::new();
    assert_ok!(encode(&packet, &mut bytes));
    bytes
}

pub fn connecting(config: ClientConfig) -> TestClient {
    let mut client = Client::with_config(StreamTransport::new(), config);
    assert_ok!(client.connect(&BrokerUrl::mqtt("broker"), "rust-mqtt-session"));
    client
}

pub fn connected(now: Instant) -> TestClient {
    connected_with(ClientConfig::default(), now)
}

pub fn connected_with(config: ClientConfig, now: Instant) -> TestClient {
    let mut client = connecting(config);
    let sent = transmit(&mut client, now);
    assert_eq!(packet_types(&sent), [0x10]);

    assert_ok!(client.on_bytes_received(&CONNACK_ACCEPTED, now));
    assert!(client.is_connected());
    client
}

/// Lets the client write everything it has to send and returns the bytes.
pub fn transmit(client: &mut TestClient, now: Instant) -> Vec<u8> {
    while assert_ok!(client.on_ready_to_write(now)).is_some() {}
    client.transport_mut().take_outbox()
}

/// Splits concatenated packets into their wire forms.
pub fn packets(mut bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();

    while !bytes.is_empty() {
        let mut remaining_len = 0usize;
        let mut i = 1;
        loop {
            let byte = bytes[i];
            remaining_len |= ((byte & 0x7F) as usize) << (7 * (i - 1));
            i += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }

        let (packet, rest) = bytes.split_at(i + remaining_len);
        packets.push(packet.to_vec());
        bytes = rest;
    }

    packets
}

/// The first byte of each of the concatenated packets.
pub fn packet_types(bytes: &[u8]) -> Vec<u8> {
    packets(bytes).iter().map(|p| p[0]).collect()
}

pub fn record_disconnects(client: &mut TestClient) -> Rc<RefCell<Vec<DisconnectReason>>> {
    let reasons = Rc::new(RefCell::new(Vec::new()));
    let r = reasons.clone();
    client.set_disconnect_handler(move |_, reason| r.borrow_mut().push(reason));
    reasons
}

/// A PUBLISH as seen by a message handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub topic: String,
    pub payload: Vec<u8>,
    pub flags: PublishFlags,
    pub packet_identifier: Option<u16>,
    pub payload_len: usize,
}

pub fn record_messages(client: &mut TestClient) -> Rc<RefCell<Vec<Received>>> {
    let messages = Rc::new(RefCell::new(Vec::new()));
    let m = messages.clone();
    client.set_message_handler(move |_, publish| {
        m.borrow_mut().push(Received {
            topic: publish.topic.into(),
            payload: publish.payload.to_vec(),
            flags: publish.flags,
            packet_identifier: publish.packet_identifier,
            payload_len: publish.payload_len,
        });
        0
    });
    messages
}
