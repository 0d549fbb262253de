use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use trellis_shared::{Command, RequestId};

use crate::connection::ConnectionKey;

/// One outbound command awaiting its correlated reply.
pub(crate) struct PendingRequest {
    pub command: Command,
    /// The connection whose multi-step protocol this command advances.
    pub assignee: ConnectionKey,
    /// The connection the command was transmitted to.
    pub target: ConnectionKey,
    pub created_at: Instant,
    /// Set once the waiter has given up. The slot is kept so a reply arriving
    /// afterwards can still be processed by the late-response handler.
    pub timed_out: bool,
}

/// How a reply found its pending slot: in time, or after the waiter already
/// timed out and moved on. Exactly one of the two occurs per request id.
pub(crate) enum RequestOutcome {
    OnTime(PendingRequest),
    Late(PendingRequest),
}

/// Correlates broker-issued commands with their eventual replies by request
/// identifier. The only place that understands request/reply correlation;
/// everything else just sees whether a remote operation succeeded.
pub struct RequestManager {
    pending: HashMap<RequestId, PendingRequest>,
}

impl RequestManager {
    pub(crate) fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Stores a fresh pending slot and returns its request identifier.
    pub(crate) fn create(
        &mut self,
        command: Command,
        assignee: ConnectionKey,
        target: ConnectionKey,
    ) -> RequestId {
        loop {
            let request_id = RequestId::new(fastrand::u64(..));
            if self.pending.contains_key(&request_id) {
                continue;
            }
            self.pending.insert(
                request_id,
                PendingRequest {
                    command,
                    assignee,
                    target,
                    created_at: Instant::now(),
                    timed_out: false,
                },
            );
            return request_id;
        }
    }

    /// Drops a slot whose command could not be transmitted.
    pub(crate) fn discard(&mut self, request_id: &RequestId) {
        self.pending.remove(request_id);
    }

    /// Removes and classifies the slot for an arriving reply. `None` means
    /// the request id is unknown (already handled, or never issued).
    pub(crate) fn resolve(&mut self, request_id: &RequestId) -> Option<RequestOutcome> {
        let entry = self.pending.remove(request_id)?;
        if entry.timed_out {
            Some(RequestOutcome::Late(entry))
        } else {
            Some(RequestOutcome::OnTime(entry))
        }
    }

    /// Marks slots older than `timeout` as timed out and reports them.
    /// Slots are kept, not removed: a late reply must still find its slot.
    pub(crate) fn sweep(
        &mut self,
        now: Instant,
        timeout: Duration,
    ) -> Vec<(RequestId, Command, ConnectionKey)> {
        let mut expired = Vec::new();
        for (request_id, entry) in self.pending.iter_mut() {
            if !entry.timed_out && now.duration_since(entry.created_at) >= timeout {
                entry.timed_out = true;
                expired.push((*request_id, entry.command.clone(), entry.assignee));
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
