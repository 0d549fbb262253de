use std::{mem, vec::IntoIter};

use trellis_shared::BatchId;

use crate::{connection::ConnectionKey, error::ServerError};

/// Buffered events produced while processing inbound traffic, drained by the
/// host through `Server::receive()`.
pub struct Events {
    registrations: Vec<ConnectionKey>,
    rejections: Vec<ConnectionKey>,
    assignments: Vec<ConnectionKey>,
    disconnections: Vec<ConnectionKey>,
    batch_relays: Vec<(BatchId, usize)>,
    errors: Vec<ServerError>,

    empty: bool,
}

impl Events {
    pub(crate) fn new() -> Self {
        Self {
            registrations: Vec::new(),
            rejections: Vec::new(),
            assignments: Vec::new(),
            disconnections: Vec::new(),
            batch_relays: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: Event>(&mut self) -> V::Iter {
        return V::iter(self);
    }

    pub fn has<V: Event>(&self) -> bool {
        return V::has(self);
    }

    // Crate-public

    pub(crate) fn push_registration(&mut self, key: &ConnectionKey) {
        self.registrations.push(*key);
        self.empty = false;
    }

    pub(crate) fn push_rejection(&mut self, key: &ConnectionKey) {
        self.rejections.push(*key);
        self.empty = false;
    }

    pub(crate) fn push_assignment(&mut self, key: &ConnectionKey) {
        self.assignments.push(*key);
        self.empty = false;
    }

    pub(crate) fn push_disconnection(&mut self, key: &ConnectionKey) {
        self.disconnections.push(*key);
        self.empty = false;
    }

    pub(crate) fn push_batch_relay(&mut self, batch_id: &BatchId, forwarded_count: usize) {
        self.batch_relays.push((batch_id.clone(), forwarded_count));
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: ServerError) {
        self.errors.push(error);
        self.empty = false;
    }
}

// Event Trait
pub trait Event {
    type Iter;

    fn iter(events: &mut Events) -> Self::Iter;

    fn has(events: &Events) -> bool;
}

// RegistrationEvent
pub struct RegistrationEvent;
impl Event for RegistrationEvent {
    type Iter = IntoIter<ConnectionKey>;

    fn iter(events: &mut Events) -> Self::Iter {
        let list = mem::take(&mut events.registrations);
        return IntoIterator::into_iter(list);
    }

    fn has(events: &Events) -> bool {
        !events.registrations.is_empty()
    }
}

// RejectionEvent
pub struct RejectionEvent;
impl Event for RejectionEvent {
    type Iter = IntoIter<ConnectionKey>;

    fn iter(events: &mut Events) -> Self::Iter {
        let list = mem::take(&mut events.rejections);
        return IntoIterator::into_iter(list);
    }

    fn has(events: &Events) -> bool {
        !events.rejections.is_empty()
    }
}

// AssignmentEvent
pub struct AssignmentEvent;
impl Event for AssignmentEvent {
    type Iter = IntoIter<ConnectionKey>;

    fn iter(events: &mut Events) -> Self::Iter {
        let list = mem::take(&mut events.assignments);
        return IntoIterator::into_iter(list);
    }

    fn has(events: &Events) -> bool {
        !events.assignments.is_empty()
    }
}

// DisconnectEvent
pub struct DisconnectEvent;
impl Event for DisconnectEvent {
    type Iter = IntoIter<ConnectionKey>;

    fn iter(events: &mut Events) -> Self::Iter {
        let list = mem::take(&mut events.disconnections);
        return IntoIterator::into_iter(list);
    }

    fn has(events: &Events) -> bool {
        !events.disconnections.is_empty()
    }
}

// BatchRelayEvent
pub struct BatchRelayEvent;
impl Event for BatchRelayEvent {
    type Iter = IntoIter<(BatchId, usize)>;

    fn iter(events: &mut Events) -> Self::Iter {
        let list = mem::take(&mut events.batch_relays);
        return IntoIterator::into_iter(list);
    }

    fn has(events: &Events) -> bool {
        !events.batch_relays.is_empty()
    }
}

// ErrorEvent
pub struct ErrorEvent;
impl Event for ErrorEvent {
    type Iter = IntoIter<ServerError>;

    fn iter(events: &mut Events) -> Self::Iter {
        let list = mem::take(&mut events.errors);
        return IntoIterator::into_iter(list);
    }

    fn has(events: &Events) -> bool {
        !events.errors.is_empty()
    }
}
