use log::warn;

use trellis_shared::{ChannelId, ClusterId, DomainId, ServerMessage};

use crate::connection::ConnectionKey;

use super::server::Server;

impl Server {
    /// Announces a newly placed connection to the other members of its
    /// channel pool.
    pub(crate) fn notify_new_node(&mut self, subject: &ConnectionKey) {
        let Some(conn) = self.connections.get(subject) else {
            return;
        };
        let (Some(domain_id), Some(cluster_id), Some(channel_id), Some(node_id), Some(user_id)) = (
            conn.domain_id().cloned(),
            conn.cluster_id().cloned(),
            conn.channel_id().cloned(),
            conn.node_id().cloned(),
            conn.user_id().cloned(),
        ) else {
            warn!("cannot announce incompletely placed connection {:?}", subject);
            return;
        };
        let username = conn.username().unwrap_or_default().to_string();

        let recipients = self.pools.channel_members(&channel_id);
        let message = ServerMessage::AddNewNodeToPeers {
            domain_id,
            cluster_id,
            channel_id,
            node_id,
            user_id,
            username,
        };
        self.broadcast(subject, recipients, &message);
    }

    /// Announces a new channel to the members of its cluster pool.
    pub(crate) fn notify_new_channel(
        &mut self,
        subject: &ConnectionKey,
        domain_id: DomainId,
        cluster_id: ClusterId,
        channel_id: ChannelId,
    ) {
        let Some(node_id) = self
            .connections
            .get(subject)
            .and_then(|conn| conn.node_id())
            .cloned()
        else {
            return;
        };
        let recipients = self.pools.cluster_members(&cluster_id);
        let message = ServerMessage::AddNewChannelToPeers {
            domain_id,
            cluster_id,
            channel_id,
            node_id,
        };
        self.broadcast(subject, recipients, &message);
    }

    /// Announces a new cluster to the members of its domain pool.
    pub(crate) fn notify_new_cluster(
        &mut self,
        subject: &ConnectionKey,
        domain_id: DomainId,
        cluster_id: ClusterId,
    ) {
        let Some(node_id) = self
            .connections
            .get(subject)
            .and_then(|conn| conn.node_id())
            .cloned()
        else {
            return;
        };
        let recipients = self.pools.domain_members(&domain_id);
        let message = ServerMessage::AddNewClusterToPeers {
            domain_id,
            cluster_id,
            node_id,
        };
        self.broadcast(subject, recipients, &message);
    }

    /// Announces a new domain to every connection across all domain pools.
    pub(crate) fn notify_new_domain(&mut self, subject: &ConnectionKey, domain_id: DomainId) {
        let Some(node_id) = self
            .connections
            .get(subject)
            .and_then(|conn| conn.node_id())
            .cloned()
        else {
            return;
        };
        let recipients = self.pools.all_domain_members();
        let message = ServerMessage::AddNewDomainToPeers { domain_id, node_id };
        self.broadcast(subject, recipients, &message);
    }

    /// Fire-and-forget delivery to each recipient except the subject itself.
    /// Individual send failures are logged and isolated; one broken peer
    /// never aborts delivery to the rest.
    fn broadcast(
        &mut self,
        subject: &ConnectionKey,
        recipients: Vec<ConnectionKey>,
        message: &ServerMessage,
    ) {
        for recipient in recipients {
            if recipient == *subject {
                continue;
            }
            if !self.send_to(&recipient, message) {
                warn!("notification not delivered to connection {:?}", recipient);
            }
        }
    }
}
