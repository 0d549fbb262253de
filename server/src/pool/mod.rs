use std::{collections::HashMap, hash::Hash};

use trellis_shared::{BigMap, ChannelId, ClusterId, DomainId, UserId};

use crate::connection::{Connection, ConnectionKey};

type ConnectionMap = BigMap<ConnectionKey, Connection>;

/// The three level directories: domain, cluster, and channel id → the
/// connections currently placed at that level. A connection may appear in
/// zero, one, two, or three pools depending on how much of the hierarchy it
/// has been assigned.
pub struct Pools {
    domains: HashMap<DomainId, Vec<ConnectionKey>>,
    clusters: HashMap<ClusterId, Vec<ConnectionKey>>,
    channels: HashMap<ChannelId, Vec<ConnectionKey>>,
}

impl Pools {
    pub(crate) fn new() -> Self {
        Self {
            domains: HashMap::new(),
            clusters: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    // Insertion. A given node_id appears at most once in each pool's list
    // for a given level id: re-registration updates in place rather than
    // appending.

    pub(crate) fn insert_domain(
        &mut self,
        domain_id: &DomainId,
        key: ConnectionKey,
        connections: &ConnectionMap,
    ) {
        insert_entry(&mut self.domains, domain_id, key, connections);
    }

    pub(crate) fn insert_cluster(
        &mut self,
        cluster_id: &ClusterId,
        key: ConnectionKey,
        connections: &ConnectionMap,
    ) {
        insert_entry(&mut self.clusters, cluster_id, key, connections);
    }

    pub(crate) fn insert_channel(
        &mut self,
        channel_id: &ChannelId,
        key: ConnectionKey,
        connections: &ConnectionMap,
    ) {
        insert_entry(&mut self.channels, channel_id, key, connections);
    }

    /// Removes a connection from every pool it appears in, in a single pass
    /// keyed by connection-handle equality. A pool's key is dropped once its
    /// list becomes empty.
    pub(crate) fn remove_connection(&mut self, key: &ConnectionKey) {
        remove_entry(&mut self.domains, key);
        remove_entry(&mut self.clusters, key);
        remove_entry(&mut self.channels, key);
    }

    // Lookup

    pub(crate) fn domain_ids(&self) -> Vec<DomainId> {
        self.domains.keys().cloned().collect()
    }

    pub(crate) fn domain_members(&self, domain_id: &DomainId) -> Vec<ConnectionKey> {
        self.domains.get(domain_id).cloned().unwrap_or_default()
    }

    pub(crate) fn cluster_members(&self, cluster_id: &ClusterId) -> Vec<ConnectionKey> {
        self.clusters.get(cluster_id).cloned().unwrap_or_default()
    }

    pub(crate) fn channel_members(&self, channel_id: &ChannelId) -> Vec<ConnectionKey> {
        self.channels.get(channel_id).cloned().unwrap_or_default()
    }

    /// Every connection placed at the domain level, across all domains,
    /// deduplicated. Recipients of the system-wide new-domain notification.
    pub(crate) fn all_domain_members(&self) -> Vec<ConnectionKey> {
        let mut seen = Vec::new();
        for members in self.domains.values() {
            for key in members {
                if !seen.contains(key) {
                    seen.push(*key);
                }
            }
        }
        seen
    }

    /// The clusters currently existing under a domain, discovered from the
    /// records of the connections placed in each cluster pool.
    pub(crate) fn clusters_of(
        &self,
        domain_id: &DomainId,
        connections: &ConnectionMap,
    ) -> Vec<ClusterId> {
        self.clusters
            .iter()
            .filter(|(_, members)| {
                members.iter().any(|key| {
                    connections
                        .get(key)
                        .map_or(false, |conn| conn.domain_id() == Some(domain_id))
                })
            })
            .map(|(cluster_id, _)| cluster_id.clone())
            .collect()
    }

    /// The channels currently existing under a cluster.
    pub(crate) fn channels_of(
        &self,
        cluster_id: &ClusterId,
        connections: &ConnectionMap,
    ) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|(_, members)| {
                members.iter().any(|key| {
                    connections
                        .get(key)
                        .map_or(false, |conn| conn.cluster_id() == Some(cluster_id))
                })
            })
            .map(|(channel_id, _)| channel_id.clone())
            .collect()
    }

    /// Locates the channel a user is placed in by scanning the channel pools
    /// for a member carrying that user id.
    pub(crate) fn channel_of_user(
        &self,
        user_id: &UserId,
        connections: &ConnectionMap,
    ) -> Option<ChannelId> {
        for (channel_id, members) in &self.channels {
            for key in members {
                if let Some(conn) = connections.get(key) {
                    if conn.user_id() == Some(user_id) {
                        return Some(channel_id.clone());
                    }
                }
            }
        }
        None
    }

    // Counts & iteration (operational statistics)

    pub(crate) fn domains_count(&self) -> usize {
        self.domains.len()
    }

    pub(crate) fn clusters_count(&self) -> usize {
        self.clusters.len()
    }

    pub(crate) fn channels_count(&self) -> usize {
        self.channels.len()
    }

    pub(crate) fn domains(&self) -> impl Iterator<Item = (&DomainId, &Vec<ConnectionKey>)> {
        self.domains.iter()
    }

    pub(crate) fn clusters(&self) -> impl Iterator<Item = (&ClusterId, &Vec<ConnectionKey>)> {
        self.clusters.iter()
    }

    pub(crate) fn channels(&self) -> impl Iterator<Item = (&ChannelId, &Vec<ConnectionKey>)> {
        self.channels.iter()
    }
}

fn insert_entry<I: Eq + Hash + Clone>(
    pool: &mut HashMap<I, Vec<ConnectionKey>>,
    level_id: &I,
    key: ConnectionKey,
    connections: &ConnectionMap,
) {
    let node_id = connections
        .get(&key)
        .and_then(|conn| conn.node_id())
        .cloned();
    let list = pool.entry(level_id.clone()).or_default();
    if list.contains(&key) {
        return;
    }
    if let Some(node_id) = node_id {
        // same logical node under a new handle: overwrite in place
        for entry in list.iter_mut() {
            let entry_node = connections.get(entry).and_then(|conn| conn.node_id());
            if entry_node == Some(&node_id) {
                *entry = key;
                return;
            }
        }
    }
    list.push(key);
}

fn remove_entry<I: Eq + Hash + Clone>(
    pool: &mut HashMap<I, Vec<ConnectionKey>>,
    key: &ConnectionKey,
) {
    pool.retain(|_, members| {
        members.retain(|entry| entry != key);
        !members.is_empty()
    });
}
