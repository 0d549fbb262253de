use std::collections::VecDeque;

use log::{info, trace, warn};

use trellis_shared::{
    ChannelId, ClusterId, Command, CommandReply, DomainId, NodeId, ReplyData, RequestId,
};

use crate::{connection::ConnectionKey, error::ServerError, request::PendingRequest};

use super::server::Server;

/// The outcome of one remote step of an assignment protocol, as reported by
/// the correlator: the reply payload on success, or failure (remote error or
/// timeout, indistinguishable to the waiting protocol).
pub(crate) enum StepOutcome {
    Success(ReplyData),
    Failure,
}

/// One in-flight placement protocol. At most one per connection; keyed by
/// the connection being placed.
pub(crate) struct Assignment {
    state: AssignState,
}

/// Where the placement protocol currently stands. Each `Probing*`/
/// `Attaching*`/`Creating*` state has exactly one outstanding command whose
/// reply (or timeout) drives the next transition.
enum AssignState {
    ProbingDomain {
        candidates: VecDeque<DomainId>,
        current: DomainId,
        probes: VecDeque<ConnectionKey>,
    },
    AttachingDomain {
        candidates: VecDeque<DomainId>,
        domain_id: DomainId,
    },
    CreatingDomain,
    ProbingCluster {
        domain_id: DomainId,
        candidates: VecDeque<ClusterId>,
        current: ClusterId,
        probes: VecDeque<ConnectionKey>,
    },
    AttachingCluster {
        domain_id: DomainId,
        candidates: VecDeque<ClusterId>,
        cluster_id: ClusterId,
    },
    CreatingCluster {
        domain_id: DomainId,
    },
    ProbingChannel {
        domain_id: DomainId,
        cluster_id: ClusterId,
        candidates: VecDeque<ChannelId>,
        current: ChannelId,
        probes: VecDeque<ConnectionKey>,
    },
    AttachingChannel {
        domain_id: DomainId,
        cluster_id: ClusterId,
        candidates: VecDeque<ChannelId>,
        channel_id: ChannelId,
    },
    CreatingChannel {
        domain_id: DomainId,
        cluster_id: ClusterId,
    },
}

impl Server {
    /// Begins placement for a connection that registered without a complete
    /// hierarchy path. Resumes at whatever level is the first one missing.
    pub(crate) fn start_assignment(&mut self, key: ConnectionKey) {
        if self.assignments.contains_key(&key) {
            return;
        }
        let Some(conn) = self.connections.get(&key) else {
            return;
        };
        if conn.is_fully_assigned() {
            return;
        }
        let domain_id = conn.domain_id().cloned();
        let cluster_id = conn.cluster_id().cloned();

        let next = match (domain_id, cluster_id) {
            (None, _) => self.begin_domain_selection(key),
            (Some(domain_id), None) => self.begin_cluster_selection(key, domain_id),
            (Some(domain_id), Some(cluster_id)) => {
                self.begin_channel_selection(key, domain_id, cluster_id)
            }
        };
        self.store_assignment(key, next);
    }

    /// Advances a connection's placement protocol with the outcome of its
    /// outstanding command. Called by the correlator on reply and by the
    /// housekeeping sweep on timeout.
    pub(crate) fn advance_assignment(&mut self, assignee: ConnectionKey, outcome: StepOutcome) {
        let Some(assignment) = self.assignments.remove(&assignee) else {
            return;
        };
        if !self.connections.contains_key(&assignee) {
            return;
        }
        let next = self.step_assignment(assignee, assignment.state, outcome);
        self.store_assignment(assignee, next);
    }

    fn store_assignment(&mut self, assignee: ConnectionKey, state: Option<AssignState>) {
        let Some(state) = state else {
            return;
        };
        // a send failure mid-step may have closed the assignee
        if self.connections.contains_key(&assignee) {
            self.assignments.insert(assignee, Assignment { state });
        }
    }

    fn step_assignment(
        &mut self,
        assignee: ConnectionKey,
        state: AssignState,
        outcome: StepOutcome,
    ) -> Option<AssignState> {
        match state {
            // Domain level

            AssignState::ProbingDomain {
                candidates,
                current,
                probes,
            } => match outcome {
                StepOutcome::Success(data) => {
                    if data.count.unwrap_or(0) < self.config.level_capacity {
                        self.attach_domain(assignee, candidates, current)
                    } else {
                        self.next_domain_candidate(assignee, candidates)
                    }
                }
                // this member could not answer; ask the next one
                StepOutcome::Failure => self.probe_domain_members(assignee, candidates, current, probes),
            },
            AssignState::AttachingDomain {
                candidates,
                domain_id,
            } => match outcome {
                StepOutcome::Success(_) => {
                    if let Some(conn) = self.connections.get_mut(&assignee) {
                        conn.set_domain(domain_id.clone(), false);
                    }
                    self.pools.insert_domain(&domain_id, assignee, &self.connections);
                    self.begin_cluster_selection(assignee, domain_id)
                }
                StepOutcome::Failure => self.next_domain_candidate(assignee, candidates),
            },
            AssignState::CreatingDomain => match outcome {
                StepOutcome::Success(data) => {
                    let Some(domain_id) = data.domain_id else {
                        warn!("new_domain_node reply carried no domain_id");
                        return self.fail_assignment(assignee);
                    };
                    if let Some(conn) = self.connections.get_mut(&assignee) {
                        conn.set_domain(domain_id.clone(), true);
                    }
                    self.pools.insert_domain(&domain_id, assignee, &self.connections);
                    self.notify_new_domain(&assignee, domain_id.clone());
                    self.create_cluster(assignee, domain_id)
                }
                StepOutcome::Failure => self.fail_assignment(assignee),
            },

            // Cluster level

            AssignState::ProbingCluster {
                domain_id,
                candidates,
                current,
                probes,
            } => match outcome {
                StepOutcome::Success(data) => {
                    if data.count.unwrap_or(0) < self.config.level_capacity {
                        self.attach_cluster(assignee, domain_id, candidates, current)
                    } else {
                        self.next_cluster_candidate(assignee, domain_id, candidates)
                    }
                }
                StepOutcome::Failure => {
                    self.probe_cluster_members(assignee, domain_id, candidates, current, probes)
                }
            },
            AssignState::AttachingCluster {
                domain_id,
                candidates,
                cluster_id,
            } => match outcome {
                StepOutcome::Success(_) => {
                    if let Some(conn) = self.connections.get_mut(&assignee) {
                        conn.set_cluster(cluster_id.clone(), false);
                    }
                    self.pools.insert_cluster(&cluster_id, assignee, &self.connections);
                    self.begin_channel_selection(assignee, domain_id, cluster_id)
                }
                StepOutcome::Failure => self.next_cluster_candidate(assignee, domain_id, candidates),
            },
            AssignState::CreatingCluster { domain_id } => match outcome {
                StepOutcome::Success(data) => {
                    let Some(cluster_id) = data.cluster_id else {
                        warn!("new_cluster_node reply carried no cluster_id");
                        return self.fail_assignment(assignee);
                    };
                    if let Some(conn) = self.connections.get_mut(&assignee) {
                        conn.set_cluster(cluster_id.clone(), true);
                    }
                    self.pools.insert_cluster(&cluster_id, assignee, &self.connections);
                    self.notify_new_cluster(&assignee, domain_id.clone(), cluster_id.clone());
                    self.create_channel(assignee, domain_id, cluster_id)
                }
                StepOutcome::Failure => self.fail_assignment(assignee),
            },

            // Channel level

            AssignState::ProbingChannel {
                domain_id,
                cluster_id,
                candidates,
                current,
                probes,
            } => match outcome {
                StepOutcome::Success(data) => {
                    if data.count.unwrap_or(0) < self.config.level_capacity {
                        self.attach_channel(assignee, domain_id, cluster_id, candidates, current)
                    } else {
                        self.next_channel_candidate(assignee, domain_id, cluster_id, candidates)
                    }
                }
                StepOutcome::Failure => self.probe_channel_members(
                    assignee, domain_id, cluster_id, candidates, current, probes,
                ),
            },
            AssignState::AttachingChannel {
                domain_id,
                cluster_id,
                candidates,
                channel_id,
            } => match outcome {
                StepOutcome::Success(_) => {
                    if let Some(conn) = self.connections.get_mut(&assignee) {
                        conn.set_channel(channel_id.clone(), false);
                    }
                    self.pools.insert_channel(&channel_id, assignee, &self.connections);
                    self.complete_placement(assignee)
                }
                StepOutcome::Failure => {
                    self.next_channel_candidate(assignee, domain_id, cluster_id, candidates)
                }
            },
            AssignState::CreatingChannel {
                domain_id,
                cluster_id,
            } => match outcome {
                StepOutcome::Success(data) => {
                    let Some(channel_id) = data.channel_id else {
                        warn!("new_channel_node reply carried no channel_id");
                        return self.fail_assignment(assignee);
                    };
                    if let Some(conn) = self.connections.get_mut(&assignee) {
                        conn.set_channel(channel_id.clone(), true);
                    }
                    self.pools.insert_channel(&channel_id, assignee, &self.connections);
                    self.notify_new_channel(&assignee, domain_id, cluster_id, channel_id);
                    self.complete_placement(assignee)
                }
                StepOutcome::Failure => self.fail_assignment(assignee),
            },
        }
    }

    // Domain selection

    fn begin_domain_selection(&mut self, assignee: ConnectionKey) -> Option<AssignState> {
        let candidates: VecDeque<DomainId> = self.pools.domain_ids().into();
        self.next_domain_candidate(assignee, candidates)
    }

    fn next_domain_candidate(
        &mut self,
        assignee: ConnectionKey,
        mut candidates: VecDeque<DomainId>,
    ) -> Option<AssignState> {
        match candidates.pop_front() {
            Some(current) => {
                let probes = self.level_probes(self.pools.domain_members(&current), assignee);
                self.probe_domain_members(assignee, candidates, current, probes)
            }
            None => self.create_domain(assignee),
        }
    }

    fn probe_domain_members(
        &mut self,
        assignee: ConnectionKey,
        candidates: VecDeque<DomainId>,
        current: DomainId,
        mut probes: VecDeque<ConnectionKey>,
    ) -> Option<AssignState> {
        loop {
            let Some(target) = probes.pop_front() else {
                // nobody left to ask; the capacity check is advisory
                return self.attach_domain(assignee, candidates, current);
            };
            let command = Command::CountPeersAmount {
                domain_id: Some(current.clone()),
                cluster_id: None,
                channel_id: None,
            };
            if self.send_command(&target, &assignee, command).is_some() {
                return Some(AssignState::ProbingDomain {
                    candidates,
                    current,
                    probes,
                });
            }
        }
    }

    fn attach_domain(
        &mut self,
        assignee: ConnectionKey,
        candidates: VecDeque<DomainId>,
        domain_id: DomainId,
    ) -> Option<AssignState> {
        let node_id = self.assignee_node_id(&assignee)?;
        let command = Command::AssignToDomain {
            domain_id: domain_id.clone(),
            node_id,
        };
        self.send_command(&assignee, &assignee, command)?;
        Some(AssignState::AttachingDomain {
            candidates,
            domain_id,
        })
    }

    fn create_domain(&mut self, assignee: ConnectionKey) -> Option<AssignState> {
        self.send_command(&assignee, &assignee, Command::NewDomainNode)?;
        Some(AssignState::CreatingDomain)
    }

    // Cluster selection

    fn begin_cluster_selection(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
    ) -> Option<AssignState> {
        let candidates: VecDeque<ClusterId> =
            self.pools.clusters_of(&domain_id, &self.connections).into();
        self.next_cluster_candidate(assignee, domain_id, candidates)
    }

    fn next_cluster_candidate(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        mut candidates: VecDeque<ClusterId>,
    ) -> Option<AssignState> {
        match candidates.pop_front() {
            Some(current) => {
                let probes = self.level_probes(self.pools.cluster_members(&current), assignee);
                self.probe_cluster_members(assignee, domain_id, candidates, current, probes)
            }
            None => self.create_cluster(assignee, domain_id),
        }
    }

    fn probe_cluster_members(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        candidates: VecDeque<ClusterId>,
        current: ClusterId,
        mut probes: VecDeque<ConnectionKey>,
    ) -> Option<AssignState> {
        loop {
            let Some(target) = probes.pop_front() else {
                return self.attach_cluster(assignee, domain_id, candidates, current);
            };
            let command = Command::CountPeersAmount {
                domain_id: None,
                cluster_id: Some(current.clone()),
                channel_id: None,
            };
            if self.send_command(&target, &assignee, command).is_some() {
                return Some(AssignState::ProbingCluster {
                    domain_id,
                    candidates,
                    current,
                    probes,
                });
            }
        }
    }

    fn attach_cluster(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        candidates: VecDeque<ClusterId>,
        cluster_id: ClusterId,
    ) -> Option<AssignState> {
        let node_id = self.assignee_node_id(&assignee)?;
        let command = Command::AssignToCluster {
            cluster_id: cluster_id.clone(),
            node_id,
        };
        self.send_command(&assignee, &assignee, command)?;
        Some(AssignState::AttachingCluster {
            domain_id,
            candidates,
            cluster_id,
        })
    }

    fn create_cluster(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
    ) -> Option<AssignState> {
        let command = Command::NewClusterNode {
            domain_id: domain_id.clone(),
        };
        self.send_command(&assignee, &assignee, command)?;
        Some(AssignState::CreatingCluster { domain_id })
    }

    // Channel selection

    fn begin_channel_selection(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        cluster_id: ClusterId,
    ) -> Option<AssignState> {
        let candidates: VecDeque<ChannelId> =
            self.pools.channels_of(&cluster_id, &self.connections).into();
        self.next_channel_candidate(assignee, domain_id, cluster_id, candidates)
    }

    fn next_channel_candidate(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        cluster_id: ClusterId,
        mut candidates: VecDeque<ChannelId>,
    ) -> Option<AssignState> {
        match candidates.pop_front() {
            Some(current) => {
                let probes = self.level_probes(self.pools.channel_members(&current), assignee);
                self.probe_channel_members(
                    assignee, domain_id, cluster_id, candidates, current, probes,
                )
            }
            None => self.create_channel(assignee, domain_id, cluster_id),
        }
    }

    fn probe_channel_members(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        cluster_id: ClusterId,
        candidates: VecDeque<ChannelId>,
        current: ChannelId,
        mut probes: VecDeque<ConnectionKey>,
    ) -> Option<AssignState> {
        loop {
            let Some(target) = probes.pop_front() else {
                return self.attach_channel(assignee, domain_id, cluster_id, candidates, current);
            };
            let command = Command::CountPeersAmount {
                domain_id: None,
                cluster_id: None,
                channel_id: Some(current.clone()),
            };
            if self.send_command(&target, &assignee, command).is_some() {
                return Some(AssignState::ProbingChannel {
                    domain_id,
                    cluster_id,
                    candidates,
                    current,
                    probes,
                });
            }
        }
    }

    fn attach_channel(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        cluster_id: ClusterId,
        candidates: VecDeque<ChannelId>,
        channel_id: ChannelId,
    ) -> Option<AssignState> {
        let node_id = self.assignee_node_id(&assignee)?;
        let command = Command::AssignToChannel {
            channel_id: channel_id.clone(),
            node_id,
        };
        self.send_command(&assignee, &assignee, command)?;
        Some(AssignState::AttachingChannel {
            domain_id,
            cluster_id,
            candidates,
            channel_id,
        })
    }

    fn create_channel(
        &mut self,
        assignee: ConnectionKey,
        domain_id: DomainId,
        cluster_id: ClusterId,
    ) -> Option<AssignState> {
        let command = Command::NewChannelNode {
            domain_id: domain_id.clone(),
            cluster_id: cluster_id.clone(),
        };
        self.send_command(&assignee, &assignee, command)?;
        Some(AssignState::CreatingChannel {
            domain_id,
            cluster_id,
        })
    }

    // Completion

    fn complete_placement(&mut self, assignee: ConnectionKey) -> Option<AssignState> {
        info!("connection {:?} fully placed", assignee);
        self.notify_new_node(&assignee);
        self.incoming_events.push_assignment(&assignee);
        None
    }

    fn fail_assignment(&mut self, assignee: ConnectionKey) -> Option<AssignState> {
        let node_id = self
            .connections
            .get(&assignee)
            .and_then(|conn| conn.node_id())
            .cloned()
            .unwrap_or_else(|| NodeId::from("unknown"));
        warn!("placement of node {} ran out of options", node_id);
        self.incoming_events
            .push_error(ServerError::AssignmentExhausted(node_id));
        None
    }

    // Late replies

    /// Applies a reply that arrived after its request already timed out. The
    /// timeout made the protocol move on, so the original command may have
    /// been superseded: the reply is applied only when the connection carries
    /// no active protocol and still lacks the level the command concerned.
    /// Creation replies resume the downward creation chain; assignment
    /// replies resume selection at the next level; count replies are stale by
    /// definition and dropped.
    pub(crate) fn handle_late_response(&mut self, pending: PendingRequest, reply: CommandReply) {
        let assignee = pending.assignee;
        if !reply.success {
            trace!("late failure for {} ignored", pending.command.kind());
            return;
        }
        if self.assignments.contains_key(&assignee) {
            trace!(
                "late reply for {} superseded by an active protocol",
                pending.command.kind()
            );
            return;
        }
        if !self.connections.contains_key(&assignee) {
            return;
        }

        let next = match pending.command {
            Command::NewDomainNode => {
                if self.level_present(&assignee, Level::Domain) {
                    return;
                }
                let Some(domain_id) = reply.data.domain_id else {
                    return;
                };
                if let Some(conn) = self.connections.get_mut(&assignee) {
                    conn.set_domain(domain_id.clone(), true);
                }
                self.pools.insert_domain(&domain_id, assignee, &self.connections);
                self.notify_new_domain(&assignee, domain_id.clone());
                self.create_cluster(assignee, domain_id)
            }
            Command::NewClusterNode { domain_id } => {
                if self.level_present(&assignee, Level::Cluster) {
                    return;
                }
                // the created cluster only makes sense under the domain it
                // was requested for
                if self
                    .connections
                    .get(&assignee)
                    .and_then(|conn| conn.domain_id())
                    != Some(&domain_id)
                {
                    return;
                }
                let Some(cluster_id) = reply.data.cluster_id else {
                    return;
                };
                if let Some(conn) = self.connections.get_mut(&assignee) {
                    conn.set_cluster(cluster_id.clone(), true);
                }
                self.pools.insert_cluster(&cluster_id, assignee, &self.connections);
                self.notify_new_cluster(&assignee, domain_id.clone(), cluster_id.clone());
                self.create_channel(assignee, domain_id, cluster_id)
            }
            Command::NewChannelNode {
                domain_id,
                cluster_id,
            } => {
                if self.level_present(&assignee, Level::Channel) {
                    return;
                }
                if self
                    .connections
                    .get(&assignee)
                    .and_then(|conn| conn.cluster_id())
                    != Some(&cluster_id)
                {
                    return;
                }
                let Some(channel_id) = reply.data.channel_id else {
                    return;
                };
                if let Some(conn) = self.connections.get_mut(&assignee) {
                    conn.set_channel(channel_id.clone(), true);
                }
                self.pools.insert_channel(&channel_id, assignee, &self.connections);
                self.notify_new_channel(&assignee, domain_id, cluster_id, channel_id);
                self.complete_placement(assignee)
            }
            Command::AssignToDomain { domain_id, .. } => {
                if self.level_present(&assignee, Level::Domain) {
                    return;
                }
                if let Some(conn) = self.connections.get_mut(&assignee) {
                    conn.set_domain(domain_id.clone(), false);
                }
                self.pools.insert_domain(&domain_id, assignee, &self.connections);
                self.begin_cluster_selection(assignee, domain_id)
            }
            Command::AssignToCluster { cluster_id, .. } => {
                if self.level_present(&assignee, Level::Cluster) {
                    return;
                }
                let Some(domain_id) = self
                    .connections
                    .get(&assignee)
                    .and_then(|conn| conn.domain_id())
                    .cloned()
                else {
                    return;
                };
                if let Some(conn) = self.connections.get_mut(&assignee) {
                    conn.set_cluster(cluster_id.clone(), false);
                }
                self.pools.insert_cluster(&cluster_id, assignee, &self.connections);
                self.begin_channel_selection(assignee, domain_id, cluster_id)
            }
            Command::AssignToChannel { channel_id, .. } => {
                if self.level_present(&assignee, Level::Channel) {
                    return;
                }
                // hierarchy stays monotonic: no channel without a cluster
                if !self.level_present(&assignee, Level::Cluster) {
                    return;
                }
                if let Some(conn) = self.connections.get_mut(&assignee) {
                    conn.set_channel(channel_id.clone(), false);
                }
                self.pools.insert_channel(&channel_id, assignee, &self.connections);
                self.complete_placement(assignee)
            }
            Command::CountPeersAmount { .. } => {
                trace!("late count reply dropped");
                return;
            }
        };
        self.store_assignment(assignee, next);
    }

    fn level_present(&self, assignee: &ConnectionKey, level: Level) -> bool {
        let Some(conn) = self.connections.get(assignee) else {
            return true;
        };
        match level {
            Level::Domain => conn.domain_id().is_some(),
            Level::Cluster => conn.cluster_id().is_some(),
            Level::Channel => conn.channel_id().is_some(),
        }
    }

    // Plumbing

    /// Issues one command: the pending slot is created before transmission
    /// so a reply can never race its own bookkeeping. A failed transmission
    /// discards the slot (the target is closed by `send_to`).
    pub(crate) fn send_command(
        &mut self,
        target: &ConnectionKey,
        assignee: &ConnectionKey,
        command: Command,
    ) -> Option<RequestId> {
        let request_id = self.requests.create(command.clone(), *assignee, *target);
        let message = command.to_message(request_id);
        if self.send_to(target, &message) {
            Some(request_id)
        } else {
            self.requests.discard(&request_id);
            None
        }
    }

    fn assignee_node_id(&self, assignee: &ConnectionKey) -> Option<NodeId> {
        self.connections
            .get(assignee)
            .and_then(|conn| conn.node_id())
            .cloned()
    }

    fn level_probes(
        &self,
        members: Vec<ConnectionKey>,
        assignee: ConnectionKey,
    ) -> VecDeque<ConnectionKey> {
        members.into_iter().filter(|key| *key != assignee).collect()
    }
}

enum Level {
    Domain,
    Cluster,
    Channel,
}
