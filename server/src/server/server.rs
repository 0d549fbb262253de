use std::{collections::HashMap, time::Instant};

use log::{trace, warn};

use trellis_shared::{BigMap, ClientMessage, CommandReply, NodeId, ServerMessage};

use crate::{
    connection::{Connection, ConnectionKey},
    error::ServerError,
    events::Events,
    pool::Pools,
    request::{RequestManager, RequestOutcome},
    sync::SyncManager,
    transport::MessageSender,
};

use super::{
    assignment::{Assignment, StepOutcome},
    server_config::ServerConfig,
};

/// The broker: a single owning structure for the three level pools, the
/// pending-request map, and the batch tracker. All mutation happens on the
/// host's single event loop; the host feeds transport events in through
/// [`Server::receive_message`], pumps [`Server::update`] for housekeeping,
/// and drains produced events with [`Server::receive`].
pub struct Server {
    pub(crate) config: ServerConfig,
    // Connections
    pub(crate) connections: BigMap<ConnectionKey, Connection>,
    pub(crate) node_index: HashMap<NodeId, ConnectionKey>,
    pub(crate) pools: Pools,
    // Protocols in flight
    pub(crate) requests: RequestManager,
    pub(crate) assignments: HashMap<ConnectionKey, Assignment>,
    pub(crate) sync: SyncManager,
    // Events
    pub(crate) incoming_events: Events,
}

impl Server {
    /// Create a new Server
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            connections: BigMap::new(),
            node_index: HashMap::new(),
            pools: Pools::new(),
            requests: RequestManager::new(),
            assignments: HashMap::new(),
            sync: SyncManager::new(),
            incoming_events: Events::new(),
        }
    }

    // Connections

    /// Attaches a transport connection, returning its handle. The connection
    /// stays un-pooled until a `register` message arrives for it.
    pub fn open_connection(&mut self, sender: Box<dyn MessageSender>) -> ConnectionKey {
        self.connections.insert(Connection::new(sender))
    }

    /// Removes a connection from every pool and index it appears in. Called
    /// by the host on transport close, and internally on send failure.
    pub fn close_connection(&mut self, key: &ConnectionKey) {
        self.assignments.remove(key);
        self.pools.remove_connection(key);
        let Some(conn) = self.connections.remove(key) else {
            return;
        };
        if let Some(node_id) = conn.node_id() {
            // a reconnect may already have re-pointed the index
            if self.node_index.get(node_id) == Some(key) {
                self.node_index.remove(node_id);
            }
        }
        self.incoming_events.push_disconnection(key);
    }

    pub fn connections_count(&self) -> usize {
        self.connections.len()
    }

    pub fn pending_requests_count(&self) -> usize {
        self.requests.len()
    }

    pub fn tracked_batches_count(&self) -> usize {
        self.sync.len()
    }

    // Inbound traffic

    /// Decodes one inbound wire message and processes it.
    pub fn receive_message(&mut self, key: &ConnectionKey, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(message) => self.process_message(key, message),
            Err(error) => {
                warn!("malformed message from connection {:?}: {}", key, error);
                self.incoming_events.push_error(ServerError::Protocol(error));
            }
        }
    }

    /// Processes one already-decoded inbound message.
    pub fn process_message(&mut self, key: &ConnectionKey, message: ClientMessage) {
        if !self.connections.contains_key(key) {
            warn!("message from unknown connection {:?} dropped", key);
            return;
        }
        match message {
            ClientMessage::Register(params) => self.register_connection(*key, params),
            ClientMessage::CommandReply(reply) => self.receive_command_reply(key, reply),
            ClientMessage::ActivityBatch(batch) => self.relay_activity_batch(key, batch),
            ClientMessage::BatchFeedback(feedback) => self.receive_batch_feedback(key, feedback),
        }
    }

    /// Returns all buffered events and resets the buffer.
    pub fn receive(&mut self) -> Events {
        std::mem::replace(&mut self.incoming_events, Events::new())
    }

    /// Housekeeping: times out stale pending requests (reporting failure to
    /// their waiting assignment protocols while keeping the slots for the
    /// late-response path) and drops aged batches.
    pub fn update(&mut self) {
        let now = Instant::now();

        let expired = self.requests.sweep(now, self.config.request_timeout);
        for (request_id, command, assignee) in expired {
            warn!(
                "request {} ({}) timed out waiting for a reply",
                request_id,
                command.kind()
            );
            self.incoming_events.push_error(ServerError::RequestTimeout {
                command: command.kind(),
            });
            self.advance_assignment(assignee, StepOutcome::Failure);
        }

        self.sync.sweep(now, self.config.batch_max_age);
    }

    // Correlation

    fn receive_command_reply(&mut self, key: &ConnectionKey, reply: CommandReply) {
        match self.requests.resolve(&reply.request_id) {
            Some(RequestOutcome::OnTime(pending)) => {
                let outcome = if reply.success {
                    StepOutcome::Success(reply.data)
                } else {
                    trace!(
                        "request {} ({}) failed remotely: {}",
                        reply.request_id,
                        pending.command.kind(),
                        reply.error.as_deref().unwrap_or("unspecified")
                    );
                    StepOutcome::Failure
                };
                self.advance_assignment(pending.assignee, outcome);
            }
            Some(RequestOutcome::Late(pending)) => {
                self.handle_late_response(pending, reply);
            }
            None => {
                trace!(
                    "reply from connection {:?} for unknown request {} dropped",
                    key,
                    reply.request_id
                );
            }
        }
    }

    // Outbound traffic

    /// Serializes and transmits one message. A send failure is treated as
    /// transport loss: the connection is cleaned out of all pools. Returns
    /// whether the send succeeded.
    pub(crate) fn send_to(&mut self, key: &ConnectionKey, message: &ServerMessage) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(error) => {
                self.incoming_events.push_error(ServerError::Protocol(error));
                return false;
            }
        };
        let Some(conn) = self.connections.get(key) else {
            return false;
        };
        if conn.send_text(&text).is_err() {
            warn!("cannot send message to connection {:?}, closing it", key);
            self.close_connection(key);
            return false;
        }
        true
    }
}
