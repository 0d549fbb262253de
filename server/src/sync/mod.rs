use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::{trace, warn};

use trellis_shared::{ActivityBatch, BatchFeedback, BatchId, ServerMessage, UserId};

use crate::{connection::ConnectionKey, server::Server};

/// Tracking state for one relayed batch.
pub(crate) struct BatchEntry {
    pub user_id: UserId,
    pub source: ConnectionKey,
    pub forwarded_count: usize,
    pub feedback_received: usize,
    pub created_at: Instant,
}

/// Tracks relayed batches and their delivery feedback. A batch is dropped
/// once every forwarded peer has acknowledged it, or once it exceeds the age
/// threshold, whichever comes first.
pub struct SyncManager {
    batches: HashMap<BatchId, BatchEntry>,
}

impl SyncManager {
    pub(crate) fn new() -> Self {
        Self {
            batches: HashMap::new(),
        }
    }

    pub(crate) fn track(&mut self, batch_id: BatchId, entry: BatchEntry) {
        self.batches.insert(batch_id, entry);
    }

    /// Records one feedback reply. Returns whether the batch is now fully
    /// acknowledged (and removed), or `None` for an unknown batch.
    pub(crate) fn record_feedback(&mut self, batch_id: &BatchId) -> Option<bool> {
        let entry = self.batches.get_mut(batch_id)?;
        entry.feedback_received += 1;
        if entry.feedback_received >= entry.forwarded_count {
            self.batches.remove(batch_id);
            Some(true)
        } else {
            Some(false)
        }
    }

    pub(crate) fn source_of(&self, batch_id: &BatchId) -> Option<ConnectionKey> {
        self.batches.get(batch_id).map(|entry| entry.source)
    }

    /// Drops batches older than `max_age` regardless of outstanding
    /// feedback, bounding memory use from peers that never reply.
    pub(crate) fn sweep(&mut self, now: Instant, max_age: Duration) -> Vec<BatchId> {
        let mut dropped = Vec::new();
        self.batches.retain(|batch_id, entry| {
            if now.duration_since(entry.created_at) >= max_age {
                warn!(
                    "batch {} from user {} aged out with {}/{} feedback replies",
                    batch_id, entry.user_id, entry.feedback_received, entry.forwarded_count
                );
                dropped.push(batch_id.clone());
                false
            } else {
                true
            }
        });
        dropped
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl Server {
    /// Handles an inbound activity batch: acknowledge the sender
    /// immediately, then fan the payload out to every other live connection
    /// in the sender's channel.
    pub(crate) fn relay_activity_batch(&mut self, key: &ConnectionKey, batch: ActivityBatch) {
        // the immediate ack decouples sender latency from fan-out latency
        let ack = ServerMessage::ActivityBatchFeedback {
            batch_id: batch.batch_id.clone(),
            success: true,
            message: "received".to_string(),
            timestamp: batch.timestamp,
        };
        self.send_to(key, &ack);

        let Some(channel_id) = self.pools.channel_of_user(&batch.user_id, &self.connections)
        else {
            warn!(
                "batch {} from user {} has no channel, not relayed",
                batch.batch_id, batch.user_id
            );
            return;
        };

        let recipients: Vec<ConnectionKey> = self
            .pools
            .channel_members(&channel_id)
            .into_iter()
            .filter(|member| member != key)
            .collect();

        let forward = ServerMessage::ActivityBatchForward {
            user_id: batch.user_id.clone(),
            batch_id: batch.batch_id.clone(),
            events: batch.events.clone(),
        };

        let mut forwarded_count = 0;
        for recipient in recipients {
            // one broken peer must not stall delivery to the others
            if self.send_to(&recipient, &forward) {
                forwarded_count += 1;
            } else {
                warn!(
                    "batch {} not delivered to connection {:?}",
                    batch.batch_id, recipient
                );
            }
        }

        if forwarded_count > 0 {
            self.sync.track(
                batch.batch_id.clone(),
                BatchEntry {
                    user_id: batch.user_id,
                    source: *key,
                    forwarded_count,
                    feedback_received: 0,
                    created_at: Instant::now(),
                },
            );
        } else {
            trace!("batch {} had no live peers to forward to", batch.batch_id);
        }

        self.incoming_events
            .push_batch_relay(&batch.batch_id, forwarded_count);
    }

    /// Handles a peer's acknowledgment of a forwarded batch.
    pub(crate) fn receive_batch_feedback(&mut self, key: &ConnectionKey, feedback: BatchFeedback) {
        if self.sync.source_of(&feedback.batch_id) == Some(*key) {
            trace!(
                "feedback for batch {} from its own sender ignored",
                feedback.batch_id
            );
            return;
        }
        match self.sync.record_feedback(&feedback.batch_id) {
            Some(true) => trace!("batch {} fully acknowledged", feedback.batch_id),
            Some(false) => {}
            None => trace!(
                "feedback for unknown batch {} dropped",
                feedback.batch_id
            ),
        }
    }
}
