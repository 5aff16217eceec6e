//! Contains utilities for session management: connection phase, keep alive scheduling
//! and in-flight publication tracking.

use core::time::Duration;

use crate::time::Instant;

mod flight;

pub use flight::{
    CPublishFlightState, FlightTable, FlightTableFull, InFlightPublish, SPublishFlightState,
};

/// Default capacity of the in-flight publication tables.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Lifecycle phase of the connection to the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No transport connection exists or was requested.
    #[default]
    Disconnected,
    /// The transport connection was requested and CONNECT is pending or awaiting its CONNACK.
    Connecting,
    /// The broker accepted the connection.
    Connected,
}

/// What the keep alive scheduler asks the client to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeepAlive {
    /// Nothing to do.
    Idle,
    /// Queue a PINGREQ.
    Ping,
    /// Nothing was received for the keep alive interval. The connection is dead.
    Expired,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Liveness {
    last_sent: Instant,
    last_received: Instant,
    ping_outstanding: bool,
}

/// Session-associated information
///
/// Client identifier is not stored here. It is part of the pending CONNECT packet.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session<const MAX_IN_FLIGHT: usize> {
    phase: Phase,

    keep_alive: u16,
    ping_repeat_time: u16,

    /// Present while bytes flow over a transport connection.
    liveness: Option<Liveness>,

    /// The currently in-flight outgoing publications.
    pub pending_client_publishes: FlightTable<CPublishFlightState, MAX_IN_FLIGHT>,
    /// The currently in-flight incoming publications.
    pub pending_server_publishes: FlightTable<SPublishFlightState, MAX_IN_FLIGHT>,
}

impl<const MAX_IN_FLIGHT: usize> Session<MAX_IN_FLIGHT> {
    /// Creates a disconnected session with the given keep alive and ping repeat intervals in seconds.
    pub fn new(keep_alive: u16, ping_repeat_time: u16) -> Self {
        Self {
            phase: Phase::Disconnected,
            keep_alive,
            ping_repeat_time,
            liveness: None,
            pending_client_publishes: FlightTable::default(),
            pending_server_publishes: FlightTable::default(),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the broker accepted the current connection.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Keep alive interval in seconds as sent in CONNECT. 0 disables the timeout.
    #[inline]
    pub fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    pub(crate) fn set_keep_alive(&mut self, seconds: u16) {
        self.keep_alive = seconds;
    }

    /// The configured ping repeat interval in seconds.
    #[inline]
    pub fn ping_repeat_time(&self) -> u16 {
        self.ping_repeat_time
    }

    pub(crate) fn set_ping_repeat_time(&mut self, seconds: u16) {
        self.ping_repeat_time = seconds;
    }

    /// The ping repeat interval in effect: the configured one, but never longer than half
    /// a non-zero keep alive interval. Zero means no pings are scheduled.
    pub fn effective_ping_repeat_time(&self) -> Duration {
        let repeat = secs(self.ping_repeat_time);
        match self.keep_alive {
            0 => repeat,
            k => repeat.min(Duration::from_millis(k as u64 * 500)),
        }
    }

    /// Whether a PINGREQ was queued and nothing has been received since.
    pub fn is_ping_outstanding(&self) -> bool {
        self.liveness.is_some_and(|l| l.ping_outstanding)
    }

    /// Starts keep alive tracking for a fresh transport connection.
    pub(crate) fn start(&mut self, now: Instant) {
        self.liveness = Some(Liveness {
            last_sent: now,
            last_received: now,
            ping_outstanding: false,
        });
    }

    /// Stops keep alive tracking and returns to [`Phase::Disconnected`].
    pub(crate) fn stop(&mut self) {
        self.liveness = None;
        self.phase = Phase::Disconnected;
    }

    pub(crate) fn on_sent(&mut self, now: Instant) {
        if let Some(l) = &mut self.liveness {
            l.last_sent = now;
        }
    }

    pub(crate) fn on_received(&mut self, now: Instant) {
        if let Some(l) = &mut self.liveness {
            l.last_received = now;
            l.ping_outstanding = false;
        }
    }

    pub(crate) fn on_ping_queued(&mut self) {
        if let Some(l) = &mut self.liveness {
            l.ping_outstanding = true;
        }
    }

    /// The queued PINGREQ was dropped before it was sent.
    pub(crate) fn on_ping_cancelled(&mut self) {
        if let Some(l) = &mut self.liveness {
            l.ping_outstanding = false;
        }
    }

    /// Decides whether the connection needs a PINGREQ or is dead.
    pub fn poll_keep_alive(&self, now: Instant) -> KeepAlive {
        let Some(l) = &self.liveness else {
            return KeepAlive::Idle;
        };

        let silent_for = now.saturating_duration_since(l.last_received);

        if self.keep_alive > 0 && silent_for >= secs(self.keep_alive) {
            return KeepAlive::Expired;
        }

        let repeat = self.effective_ping_repeat_time();
        if repeat.is_zero() || l.ping_outstanding {
            return KeepAlive::Idle;
        }

        let idle_for = now.saturating_duration_since(l.last_sent);
        if idle_for >= repeat || silent_for >= repeat {
            KeepAlive::Ping
        } else {
            KeepAlive::Idle
        }
    }

    /// Returns whether the packet identifier is currently in-flight in a client->server publication process.
    pub fn is_used_cpublish_packet_identifier(&self, packet_identifier: u16) -> bool {
        self.pending_client_publishes.contains(packet_identifier)
    }

    /// Returns the state of the publication of the packet identifier if the packet identifier is in-flight in an outgoing publication.
    pub fn cpublish_flight_state(&self, packet_identifier: u16) -> Option<CPublishFlightState> {
        self.pending_client_publishes.get(packet_identifier)
    }
    /// Returns the state of the publication of the packet identifier if the packet identifier is in-flight in an incoming publication.
    pub fn spublish_flight_state(&self, packet_identifier: u16) -> Option<SPublishFlightState> {
        self.pending_server_publishes.get(packet_identifier)
    }

    /// Returns the amount of currently in-flight outgoing publications.
    pub fn in_flight_cpublishes(&self) -> usize {
        self.pending_client_publishes.len()
    }
    /// Returns the amount of currently in-flight incoming publications.
    pub fn in_flight_spublishes(&self) -> usize {
        self.pending_server_publishes.len()
    }

    pub(crate) fn await_puback(&mut self, packet_identifier: u16) -> Result<(), FlightTableFull> {
        self.pending_client_publishes
            .insert(packet_identifier, CPublishFlightState::AwaitingPuback)
    }
    pub(crate) fn await_pubrec(&mut self, packet_identifier: u16) -> Result<(), FlightTableFull> {
        self.pending_client_publishes
            .insert(packet_identifier, CPublishFlightState::AwaitingPubrec)
    }
    pub(crate) fn await_pubcomp(&mut self, packet_identifier: u16) -> Result<(), FlightTableFull> {
        self.pending_client_publishes
            .insert(packet_identifier, CPublishFlightState::AwaitingPubcomp)
    }
    pub(crate) fn await_pubrel(&mut self, packet_identifier: u16) -> Result<(), FlightTableFull> {
        self.pending_server_publishes
            .insert(packet_identifier, SPublishFlightState::AwaitingPubrel)
    }

    pub(crate) fn remove_cpublish(&mut self, packet_identifier: u16) -> Option<CPublishFlightState> {
        self.pending_client_publishes.remove(packet_identifier)
    }
    pub(crate) fn remove_spublish(&mut self, packet_identifier: u16) -> Option<SPublishFlightState> {
        self.pending_server_publishes.remove(packet_identifier)
    }

    pub(crate) fn clear(&mut self) {
        self.pending_client_publishes.clear();
        self.pending_server_publishes.clear();
    }
}

const fn secs(seconds: u16) -> Duration {
    Duration::from_secs(seconds as u64)
}

#[cfg(test)]
mod unit {
    use core::time::Duration;

    use crate::{
        session::{KeepAlive, Phase, Session},
        time::Instant,
    };

    fn started(keep_alive: u16, ping_repeat_time: u16) -> Session<4> {
        let mut s = Session::new(keep_alive, ping_repeat_time);
        s.start(Instant::ZERO);
        s
    }

    #[test_log::test]
    fn idle_without_connection() {
        let s = Session::<4>::new(60, 20);
        assert_eq!(s.poll_keep_alive(Instant::from_secs(1000)), KeepAlive::Idle);
    }

    #[test_log::test]
    fn ping_then_expire() {
        let mut s = started(60, 20);

        assert_eq!(s.poll_keep_alive(Instant::from_secs(19)), KeepAlive::Idle);
        assert_eq!(s.poll_keep_alive(Instant::from_secs(20)), KeepAlive::Ping);

        s.on_ping_queued();
        s.on_sent(Instant::from_secs(20));
        assert!(s.is_ping_outstanding());
        assert_eq!(s.poll_keep_alive(Instant::from_secs(59)), KeepAlive::Idle);
        assert_eq!(s.poll_keep_alive(Instant::from_secs(60)), KeepAlive::Expired);
    }

    #[test_log::test]
    fn received_bytes_refresh() {
        let mut s = started(60, 20);

        s.on_ping_queued();
        s.on_received(Instant::from_secs(50));
        assert!(!s.is_ping_outstanding());
        assert_eq!(s.poll_keep_alive(Instant::from_secs(100)), KeepAlive::Ping);
        assert_eq!(s.poll_keep_alive(Instant::from_secs(110)), KeepAlive::Expired);
    }

    #[test_log::test]
    fn outbound_silence_pings() {
        let mut s = started(60, 20);

        s.on_received(Instant::from_secs(15));
        assert_eq!(s.poll_keep_alive(Instant::from_secs(20)), KeepAlive::Ping);
    }

    #[test_log::test]
    fn zero_keep_alive_never_expires() {
        let s = started(0, 20);

        assert_eq!(s.poll_keep_alive(Instant::from_secs(20)), KeepAlive::Ping);
        assert_eq!(s.effective_ping_repeat_time(), Duration::from_secs(20));
    }

    #[test_log::test]
    fn ping_repeat_clamped() {
        let s = started(10, 20);
        assert_eq!(s.effective_ping_repeat_time(), Duration::from_secs(5));
        assert_eq!(s.poll_keep_alive(Instant::from_secs(4)), KeepAlive::Idle);
        assert_eq!(s.poll_keep_alive(Instant::from_secs(5)), KeepAlive::Ping);

        assert_eq!(
            started(3, 20).effective_ping_repeat_time(),
            Duration::from_millis(1500)
        );
        assert!(started(60, 0).effective_ping_repeat_time().is_zero());
    }

    #[test_log::test]
    fn one_second_keep_alive_pings_first() {
        let mut s = started(1, 20);
        assert_eq!(s.effective_ping_repeat_time(), Duration::from_millis(500));

        assert_eq!(s.poll_keep_alive(Instant::from_millis(499)), KeepAlive::Idle);
        assert_eq!(s.poll_keep_alive(Instant::from_millis(500)), KeepAlive::Ping);

        s.on_ping_queued();
        s.on_sent(Instant::from_millis(500));
        assert_eq!(s.poll_keep_alive(Instant::from_millis(999)), KeepAlive::Idle);
        assert_eq!(s.poll_keep_alive(Instant::from_millis(1000)), KeepAlive::Expired);
    }

    #[test_log::test]
    fn stop_resets_phase() {
        let mut s = started(60, 20);
        s.set_phase(Phase::Connected);
        assert!(s.is_connected());

        s.stop();
        assert_eq!(s.phase(), Phase::Disconnected);
        assert_eq!(s.poll_keep_alive(Instant::from_secs(1000)), KeepAlive::Idle);
    }
}
