use std::{
    cell::Cell,
    net::{Ipv4Addr, SocketAddr},
    rc::Rc,
    time::Duration,
};

use embedded_io_adapters::tokio_1::FromTokio;
use log::{error, info, warn};

use rust_mqtt_session::{
    BrokerUrl, Client, DisconnectReason, Instant, PacketType, PublishFlags, QoS,
    client::Message,
    config::ClientConfig,
    io::{self, StreamTransport},
};
use tokio::{net::TcpStream, time::timeout};

const TOPIC: &str = "rust-mqtt-session/demo";

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut config = ClientConfig::default();
    config.keep_alive = 10;
    config.ping_repeat_time = 4;

    let mut client = Client::<_, 10, 4>::with_config(StreamTransport::new(), config);
    let received = Rc::new(Cell::new(0));

    client.set_connected_handler(|client, connack| {
        info!("CONNACK: {:?}", connack);
        if let Err(e) = client.subscribe_with_qos(TOPIC, QoS::AtLeastOnce) {
            error!("Failed to subscribe: {:?}", e);
        }
        for i in 0..2u8 {
            let payload = [b'0' + i];
            if let Err(e) = client.publish(TOPIC, &payload, PublishFlags::new(QoS::AtLeastOnce)) {
                error!("Failed to publish: {:?}", e);
            }
        }
        let streamed: &'static [u8] = b"payload read while it is sent";
        if let Err(e) = client.publish_stream(
            TOPIC,
            streamed,
            streamed.len(),
            PublishFlags::new(QoS::AtLeastOnce),
        ) {
            error!("Failed to publish: {:?}", e);
        }
        0
    });

    let r = received.clone();
    client.set_message_handler(move |client, publish| {
        info!(
            "Received {:?} on {}: {:?}",
            publish.flags.qos,
            publish.topic,
            core::str::from_utf8(publish.payload)
        );
        r.set(r.get() + 1);
        if r.get() == 3 {
            if let Err(e) = client.disconnect() {
                warn!("Failed to queue DISCONNECT: {:?}", e);
            }
        }
        0
    });

    client.set_published_handler(|_, message| {
        info!("Publication acknowledged: {:?}", message);
        0
    });

    client.set_event_handler(PacketType::Suback, |_, message| {
        if let Message::Suback(suback) = message {
            info!("Subscribed: {:?}", suback.return_codes);
        }
        0
    });

    client.set_disconnect_handler(|_, reason| match reason {
        DisconnectReason::Requested => info!("Disconnected"),
        reason => warn!("Connection lost: {:?}", reason),
    });

    let url = BrokerUrl::mqtt("127.0.0.1").with_credentials("test", Some("testPass"));
    if let Err(e) = client.connect(&url, "rust-mqtt-session-demo") {
        error!("Failed to start connecting: {:?}", e);
        return;
    }

    let endpoint = match client.transport().endpoint() {
        Some(e) => e.clone(),
        None => return,
    };
    let addr = SocketAddr::new(
        endpoint.host.parse().unwrap_or(Ipv4Addr::LOCALHOST.into()),
        endpoint.port,
    );
    let connection = match TcpStream::connect(addr).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to connect to {}: {}", addr, e);
            client.on_closed(DisconnectReason::Transport(embedded_io_async::Error::kind(&e)));
            return;
        }
    };
    let mut connection = FromTokio::new(connection);

    let start = tokio::time::Instant::now();
    let now = || Instant::from_millis(start.elapsed().as_millis() as u64);
    let mut buf = [0; 1024];

    while client.transport().is_open() {
        if let Err(e) = io::transmit(&mut client, &mut connection, now()).await {
            error!("Failed to transmit: {:?}", e);
            break;
        }
        if !client.transport().is_open() {
            break;
        }

        let read = io::receive(&mut client, &mut connection, &mut buf, now());
        match timeout(Duration::from_millis(500), read).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) | Err(_) => {}
            Ok(Err(e)) => {
                error!("Failed to receive: {:?}", e);
                break;
            }
        }

        if let Err(e) = client.check_keep_alive(now()) {
            error!("{}", e);
            break;
        }
    }

    info!("Received {} messages", received.get());
}
