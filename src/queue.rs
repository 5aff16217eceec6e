//! Bounded FIFO of outgoing packets awaiting transmission.

use heapless::Deque;

use crate::packet::Packet;

/// Default capacity of a client's request queue.
pub const DEFAULT_QUEUE_SIZE: usize = 10;

/// Bounded FIFO of outgoing packets.
///
/// Admission fails once `N` packets are queued, which surfaces overload to the caller
/// synchronously instead of buffering without bound.
#[derive(Debug)]
pub struct RequestQueue<const N: usize> {
    packets: Deque<Packet, N>,
}

impl<const N: usize> Default for RequestQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RequestQueue<N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            packets: Deque::new(),
        }
    }

    /// Appends a packet. Hands the packet back if the queue is full.
    pub fn enqueue(&mut self, packet: Packet) -> Result<(), Packet> {
        self.packets.push_back(packet)
    }

    /// Removes and returns the oldest packet.
    pub fn dequeue(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// The oldest packet without removing it.
    pub fn peek(&self) -> Option<&Packet> {
        self.packets.front()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.packets.is_full()
    }

    /// Drops all queued packets.
    pub fn clear(&mut self) {
        self.packets.clear();
    }

    /// Drops the packets for which `keep` returns false. The order of the rest is kept.
    pub fn retain(&mut self, keep: impl FnMut(&Packet) -> bool) {
        self.packets.retain(keep);
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }
}
