//! One event handler slot per packet type.

use alloc::boxed::Box;

use crate::{client::message::Message, header::PacketType};

/// A handler for completed packets of one type. Receives the client it is registered on.
///
/// The returned value is not interpreted by the client.
pub type EventHandler<C> = Box<dyn FnMut(&mut C, &Message<'_>) -> i32>;

enum Slot<C> {
    Empty,
    Ready(EventHandler<C>),
    /// The handler is taken out while it runs. `removed` is set if it was removed meanwhile.
    Running {
        removed: bool,
    },
}

/// Maps each [`PacketType`] to at most one handler. The last registration wins.
pub struct HandlerTable<C> {
    slots: [Slot<C>; PacketType::COUNT],
}

impl<C> Default for HandlerTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> HandlerTable<C> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::Empty),
        }
    }

    /// Registers a handler, replacing the previous one. Returns the replaced handler unless
    /// it is currently running.
    pub fn set(&mut self, packet_type: PacketType, handler: EventHandler<C>) -> Option<EventHandler<C>> {
        let slot = &mut self.slots[packet_type.index()];
        match core::mem::replace(slot, Slot::Ready(handler)) {
            Slot::Ready(previous) => Some(previous),
            Slot::Empty | Slot::Running { .. } => None,
        }
    }

    /// Unregisters the handler of a type. Returns it unless it is currently running.
    pub fn remove(&mut self, packet_type: PacketType) -> Option<EventHandler<C>> {
        let slot = &mut self.slots[packet_type.index()];
        match slot {
            Slot::Ready(_) => match core::mem::replace(slot, Slot::Empty) {
                Slot::Ready(handler) => Some(handler),
                _ => None,
            },
            Slot::Running { removed } => {
                *removed = true;
                None
            }
            Slot::Empty => None,
        }
    }

    /// Whether a handler is registered for a type.
    pub fn is_registered(&self, packet_type: PacketType) -> bool {
        matches!(
            self.slots[packet_type.index()],
            Slot::Ready(_) | Slot::Running { removed: false }
        )
    }

    /// Takes the handler out of its slot for the duration of a call.
    ///
    /// Returns `None` if no handler is registered or it is already running.
    pub(crate) fn take(&mut self, packet_type: PacketType) -> Option<EventHandler<C>> {
        let slot = &mut self.slots[packet_type.index()];
        match core::mem::replace(slot, Slot::Running { removed: false }) {
            Slot::Ready(handler) => Some(handler),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Puts a handler back after its call unless it was replaced or removed meanwhile.
    pub(crate) fn restore(&mut self, packet_type: PacketType, handler: EventHandler<C>) {
        let slot = &mut self.slots[packet_type.index()];
        match slot {
            Slot::Running { removed: false } => *slot = Slot::Ready(handler),
            Slot::Running { removed: true } => *slot = Slot::Empty,
            Slot::Ready(_) | Slot::Empty => {}
        }
    }

    /// Looks up the handler of `message`'s type and invokes it with `ctx`.
    ///
    /// Returns the handler's result, or `None` if no handler is registered.
    #[cfg(test)]
    pub(crate) fn dispatch(&mut self, ctx: &mut C, message: &Message<'_>) -> Option<i32> {
        let packet_type = message.packet_type();
        let mut handler = self.take(packet_type)?;
        let result = handler(ctx, message);
        self.restore(packet_type, handler);
        Some(result)
    }
}

impl<C> core::fmt::Debug for HandlerTable<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let registered = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !matches!(s, Slot::Empty))
            .map(|(i, _)| i);

        f.debug_set().entries(registered).finish()
    }
}

#[cfg(test)]
mod unit {
    use alloc::{boxed::Box, vec::Vec};

    use crate::{
        client::{Message, handler::HandlerTable},
        header::PacketType,
    };

    #[derive(Default)]
    struct Calls(Vec<(u8, u16)>);

    #[test_log::test]
    fn unregistered_is_dropped() {
        let mut table = HandlerTable::<Calls>::new();
        let mut calls = Calls::default();

        assert_eq!(table.dispatch(&mut calls, &Message::Puback(1)), None);
        assert!(calls.0.is_empty());
    }

    #[test_log::test]
    fn last_registration_wins() {
        let mut table = HandlerTable::<Calls>::new();
        let mut calls = Calls::default();

        table.set(
            PacketType::Puback,
            Box::new(|c: &mut Calls, m: &Message<'_>| {
                c.0.push((1, m.packet_identifier().unwrap_or_default()));
                1
            }),
        );
        let replaced = table.set(
            PacketType::Puback,
            Box::new(|c: &mut Calls, m: &Message<'_>| {
                c.0.push((2, m.packet_identifier().unwrap_or_default()));
                2
            }),
        );
        assert!(replaced.is_some());

        assert_eq!(table.dispatch(&mut calls, &Message::Puback(7)), Some(2));
        assert_eq!(table.dispatch(&mut calls, &Message::Pubcomp(7)), None);
        assert_eq!(calls.0, [(2, 7)]);
        assert!(table.is_registered(PacketType::Puback));
    }

    #[test_log::test]
    fn remove() {
        let mut table = HandlerTable::<Calls>::new();
        table.set(PacketType::Pingresp, Box::new(|_: &mut Calls, _: &Message<'_>| 0));

        assert!(table.remove(PacketType::Pingresp).is_some());
        assert!(!table.is_registered(PacketType::Pingresp));
        assert_eq!(table.dispatch(&mut Calls::default(), &Message::Pingresp), None);
    }

    #[test_log::test]
    fn removal_while_running() {
        let mut table = HandlerTable::<Calls>::new();
        table.set(PacketType::Pingresp, Box::new(|_: &mut Calls, _: &Message<'_>| 0));

        let handler = table.take(PacketType::Pingresp).unwrap();
        assert!(table.take(PacketType::Pingresp).is_none());
        assert!(table.remove(PacketType::Pingresp).is_none());
        table.restore(PacketType::Pingresp, handler);

        assert!(!table.is_registered(PacketType::Pingresp));
    }

    #[test_log::test]
    fn replacement_while_running() {
        let mut table = HandlerTable::<Calls>::new();
        table.set(PacketType::Pingresp, Box::new(|_: &mut Calls, _: &Message<'_>| 1));

        let handler = table.take(PacketType::Pingresp).unwrap();
        table.set(PacketType::Pingresp, Box::new(|_: &mut Calls, _: &Message<'_>| 2));
        table.restore(PacketType::Pingresp, handler);

        assert_eq!(
            table.dispatch(&mut Calls::default(), &Message::Pingresp),
            Some(2)
        );
    }
}
