use log::info;

use serde::Serialize;

use trellis_shared::{ChannelId, ClientId, ClusterId, DomainId, NodeId, UserId};

use crate::connection::ConnectionKey;

use super::server::Server;

/// Point-in-time operational snapshot of the broker.
#[derive(Clone, Debug, Serialize)]
pub struct PoolStats {
    pub connections: usize,
    pub registered: usize,
    pub pending_requests: usize,
    pub tracked_batches: usize,
    pub active_assignments: usize,
    pub domains: Vec<LevelStats>,
    pub clusters: Vec<LevelStats>,
    pub channels: Vec<LevelStats>,
    pub nodes: Vec<ConnectionDetail>,
}

/// One pool at one level: its id and the nodes currently placed in it.
#[derive(Clone, Debug, Serialize)]
pub struct LevelStats {
    pub id: String,
    pub member_count: usize,
    pub member_nodes: Vec<NodeId>,
}

/// One registered connection as the broker currently sees it.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionDetail {
    pub node_id: NodeId,
    pub client_id: Option<ClientId>,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub domain_id: Option<DomainId>,
    pub cluster_id: Option<ClusterId>,
    pub channel_id: Option<ChannelId>,
    pub is_domain_main: bool,
    pub is_cluster_main: bool,
    pub is_channel_main: bool,
}

/// What a node's departure left behind: pools it emptied and levels whose
/// main node it was.
#[derive(Clone, Debug, Serialize)]
pub struct OfflineReport {
    pub node_id: NodeId,
    pub emptied_domains: Vec<DomainId>,
    pub emptied_clusters: Vec<ClusterId>,
    pub emptied_channels: Vec<ChannelId>,
    pub lost_domain_main: Option<DomainId>,
    pub lost_cluster_main: Option<ClusterId>,
    pub lost_channel_main: Option<ChannelId>,
}

impl Server {
    /// Snapshots every pool and registered connection. Read-only; intended
    /// for the host's operational endpoint or periodic logging.
    pub fn stats(&self) -> PoolStats {
        let nodes: Vec<ConnectionDetail> = self
            .connections
            .iter()
            .filter_map(|(_, conn)| {
                let node_id = conn.node_id()?.clone();
                Some(ConnectionDetail {
                    node_id,
                    client_id: conn.client_id().cloned(),
                    user_id: conn.user_id().cloned(),
                    username: conn.username().map(str::to_string),
                    domain_id: conn.domain_id().cloned(),
                    cluster_id: conn.cluster_id().cloned(),
                    channel_id: conn.channel_id().cloned(),
                    is_domain_main: conn.is_domain_main(),
                    is_cluster_main: conn.is_cluster_main(),
                    is_channel_main: conn.is_channel_main(),
                })
            })
            .collect();

        PoolStats {
            connections: self.connections.len(),
            registered: nodes.len(),
            pending_requests: self.requests.len(),
            tracked_batches: self.sync.len(),
            active_assignments: self.assignments.len(),
            domains: self
                .pools
                .domains()
                .map(|(id, members)| self.level_stats(id.to_string(), members))
                .collect(),
            clusters: self
                .pools
                .clusters()
                .map(|(id, members)| self.level_stats(id.to_string(), members))
                .collect(),
            channels: self
                .pools
                .channels()
                .map(|(id, members)| self.level_stats(id.to_string(), members))
                .collect(),
            nodes,
        }
    }

    fn level_stats(&self, id: String, members: &[ConnectionKey]) -> LevelStats {
        LevelStats {
            id,
            member_count: members.len(),
            member_nodes: members
                .iter()
                .filter_map(|key| self.connections.get(key))
                .filter_map(|conn| conn.node_id().cloned())
                .collect(),
        }
    }

    /// Takes a node offline: removes its connection from every pool and
    /// index, and reports what its departure orphaned. `None` when the node
    /// is not connected.
    pub fn node_offline(&mut self, node_id: &NodeId) -> Option<OfflineReport> {
        let key = *self.node_index.get(node_id)?;
        let conn = self.connections.get(&key)?;

        let lost_domain_main = conn
            .is_domain_main()
            .then(|| conn.domain_id().cloned())
            .flatten();
        let lost_cluster_main = conn
            .is_cluster_main()
            .then(|| conn.cluster_id().cloned())
            .flatten();
        let lost_channel_main = conn
            .is_channel_main()
            .then(|| conn.channel_id().cloned())
            .flatten();

        // a pool is emptied when the departing connection is its only member
        let emptied_domains = self
            .pools
            .domains()
            .filter(|(_, members)| members.len() == 1 && members[0] == key)
            .map(|(id, _)| id.clone())
            .collect();
        let emptied_clusters = self
            .pools
            .clusters()
            .filter(|(_, members)| members.len() == 1 && members[0] == key)
            .map(|(id, _)| id.clone())
            .collect();
        let emptied_channels = self
            .pools
            .channels()
            .filter(|(_, members)| members.len() == 1 && members[0] == key)
            .map(|(id, _)| id.clone())
            .collect();

        self.close_connection(&key);
        info!("node {} taken offline", node_id);

        Some(OfflineReport {
            node_id: node_id.clone(),
            emptied_domains,
            emptied_clusters,
            emptied_channels,
            lost_domain_main,
            lost_cluster_main,
            lost_channel_main,
        })
    }
}
