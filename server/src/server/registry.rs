use log::{info, warn};

use trellis_shared::{RegisterParams, RejectReason, ServerMessage};

use crate::{connection::ConnectionKey, error::ServerError};

use super::server::Server;

impl Server {
    /// Processes a `register` message: classifies per-level main status,
    /// inserts/updates pool entries for every hierarchy id supplied, and
    /// kicks off assignment when the hierarchy path is incomplete. Missing
    /// hierarchy fields are not an error.
    pub(crate) fn register_connection(&mut self, key: ConnectionKey, params: RegisterParams) {
        // a second connection claiming an already-connected node under a
        // different user is a conflict; the same user reconnecting takes
        // over the node's pool entries
        if let Some(existing) = self.node_index.get(&params.node_id).copied() {
            if existing != key {
                let same_user = self
                    .connections
                    .get(&existing)
                    .and_then(|conn| conn.user_id())
                    == Some(&params.user_id);
                if same_user {
                    info!(
                        "node {} reconnected, replacing connection {:?}",
                        params.node_id, existing
                    );
                    self.close_connection(&existing);
                } else {
                    warn!(
                        "rejecting connection {:?}: node {} is already registered",
                        key, params.node_id
                    );
                    self.send_to(
                        &key,
                        &ServerMessage::RegistrationRejected {
                            reason: RejectReason::NodeConflict,
                            message: format!("node {} is already registered", params.node_id),
                        },
                    );
                    self.incoming_events.push_rejection(&key);
                    self.incoming_events
                        .push_error(ServerError::RegistrationConflict(params.node_id.clone()));
                    self.close_connection(&key);
                    return;
                }
            }
        }

        let Some(conn) = self.connections.get_mut(&key) else {
            warn!("unknown connection {:?} attempted to register", key);
            return;
        };

        // re-registration: pool membership must mirror the new params, so
        // any previous entries go first. The index slot is freed only when
        // the node id itself changed.
        if let Some(old_node_id) = conn.node_id().cloned() {
            self.pools.remove_connection(&key);
            if old_node_id != params.node_id && self.node_index.get(&old_node_id) == Some(&key) {
                self.node_index.remove(&old_node_id);
            }
        }

        let Some(conn) = self.connections.get_mut(&key) else {
            return;
        };
        conn.apply_registration(&params);
        let domain_id = conn.domain_id().cloned();
        let cluster_id = conn.cluster_id().cloned();
        let channel_id = conn.channel_id().cloned();
        let fully_assigned = conn.is_fully_assigned();

        self.node_index.insert(params.node_id.clone(), key);

        if let Some(domain_id) = &domain_id {
            self.pools.insert_domain(domain_id, key, &self.connections);
        }
        if let Some(cluster_id) = &cluster_id {
            self.pools.insert_cluster(cluster_id, key, &self.connections);
        }
        if let Some(channel_id) = &channel_id {
            self.pools.insert_channel(channel_id, key, &self.connections);
        }

        if !self.send_to(&key, &ServerMessage::RegistrationSuccess) {
            return;
        }
        info!(
            "registered node {} as connection {:?}",
            params.node_id, key
        );
        self.incoming_events.push_registration(&key);

        if !fully_assigned {
            self.start_assignment(key);
        }
    }
}
