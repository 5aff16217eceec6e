use heapless::Vec;

/// An incomplete QoS 1 or 2 publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InFlightPublish<S> {
    /// The packet identifier of the publication process.
    pub packet_identifier: u16,
    /// The state of the publication process.
    pub state: S,
}

/// The state of an incomplete QoS 1 or 2 publication by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CPublishFlightState {
    /// A QoS 1 PUBLISH packet has been queued.
    /// The next step in the handshake is the broker sending a PUBACK packet.
    AwaitingPuback,
    /// A QoS 2 PUBLISH packet has been queued.
    /// The next step in the handshake is the broker sending a PUBREC packet.
    AwaitingPubrec,
    /// A PUBREC packet has been received and answered with a queued PUBREL packet.
    /// The last step in the handshake is the broker sending a PUBCOMP packet.
    AwaitingPubcomp,
}

/// The state of an incomplete QoS 2 publication by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SPublishFlightState {
    /// A QoS 2 PUBLISH has been received and answered with a queued PUBREC packet.
    /// The next step in the handshake is the broker sending a PUBREL packet.
    AwaitingPubrel,
}

/// The in-flight table is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightTableFull;

/// Bounded table of in-flight publications keyed by packet identifier.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightTable<S, const N: usize> {
    entries: Vec<InFlightPublish<S>, N>,
}

impl<S, const N: usize> Default for FlightTable<S, N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S: Copy, const N: usize> FlightTable<S, N> {
    /// The state of the publication with this identifier.
    pub fn get(&self, packet_identifier: u16) -> Option<S> {
        self.entries
            .iter()
            .find(|f| f.packet_identifier == packet_identifier)
            .map(|f| f.state)
    }

    pub fn contains(&self, packet_identifier: u16) -> bool {
        self.get(packet_identifier).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        N - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InFlightPublish<S>> {
        self.entries.iter()
    }

    /// Sets the state of an identifier, adding an entry if there is none.
    pub(crate) fn insert(&mut self, packet_identifier: u16, state: S) -> Result<(), FlightTableFull> {
        if let Some(f) = self
            .entries
            .iter_mut()
            .find(|f| f.packet_identifier == packet_identifier)
        {
            f.state = state;
            return Ok(());
        }

        self.entries
            .push(InFlightPublish {
                packet_identifier,
                state,
            })
            .map_err(|_| FlightTableFull)
    }

    pub(crate) fn remove(&mut self, packet_identifier: u16) -> Option<S> {
        self.entries
            .iter()
            .position(|f| f.packet_identifier == packet_identifier)
            .map(|i| self.entries.swap_remove(i).state)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod unit {
    use tokio_test::{assert_err, assert_ok};

    use crate::session::{CPublishFlightState, FlightTable};

    #[test_log::test]
    fn insert_replaces_state() {
        let mut table = FlightTable::<CPublishFlightState, 2>::default();

        assert_ok!(table.insert(1, CPublishFlightState::AwaitingPubrec));
        assert_ok!(table.insert(1, CPublishFlightState::AwaitingPubcomp));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1), Some(CPublishFlightState::AwaitingPubcomp));
    }

    #[test_log::test]
    fn bounded() {
        let mut table = FlightTable::<CPublishFlightState, 2>::default();

        assert_ok!(table.insert(1, CPublishFlightState::AwaitingPuback));
        assert_ok!(table.insert(2, CPublishFlightState::AwaitingPuback));
        assert_err!(table.insert(3, CPublishFlightState::AwaitingPuback));
        assert_eq!(table.remaining_capacity(), 0);

        assert_eq!(table.remove(1), Some(CPublishFlightState::AwaitingPuback));
        assert_eq!(table.remove(1), None);
        assert_ok!(table.insert(3, CPublishFlightState::AwaitingPuback));
        assert!(table.contains(2));
        assert!(table.contains(3));
    }
}
