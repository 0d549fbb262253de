use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ProtocolError,
    ids::{BatchId, ChannelId, ClientId, ClusterId, DomainId, NodeId, RequestId, UserId},
};

/// Everything a client may send to the broker. Decoded once at the transport
/// boundary; the broker never inspects open JSON maps past this point.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register(RegisterParams),
    CommandReply(CommandReply),
    ActivityBatch(ActivityBatch),
    BatchFeedback(BatchFeedback),
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Identity and hierarchy parameters supplied with a `register` message.
/// Hierarchy ids are nullable; absence triggers assignment on the broker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterParams {
    pub client_id: ClientId,
    pub user_id: UserId,
    pub username: String,
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<DomainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<ClusterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_main_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_main_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_main_node_id: Option<NodeId>,
}

/// A client's reply to a broker-issued command, correlated by `request_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandReply {
    pub request_id: RequestId,
    pub command_type: String,
    pub success: bool,
    #[serde(default)]
    pub data: ReplyData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of a command reply. Which fields are present depends on the
/// command: creation replies carry the created level id, count replies carry
/// the child count.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReplyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<DomainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<ClusterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// One batch of application events submitted for channel-scoped relay.
/// Event payloads are opaque to the broker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityBatch {
    pub batch_id: BatchId,
    pub user_id: UserId,
    pub timestamp: f64,
    pub events: Vec<Value>,
}

/// A peer's acknowledgment of a forwarded batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchFeedback {
    pub batch_id: BatchId,
    pub success: bool,
    pub message: String,
    pub timestamp: f64,
}

/// Reason codes surfaced with `registration_rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NodeConflict,
}

/// Everything the broker may send to a client. Commands carry a `request_id`
/// and expect a correlated [`CommandReply`]; notifications and batch traffic
/// are fire-and-forget.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RegistrationSuccess,
    RegistrationRejected {
        reason: RejectReason,
        message: String,
    },
    // Commands
    NewDomainNode {
        request_id: RequestId,
    },
    NewClusterNode {
        request_id: RequestId,
        domain_id: DomainId,
    },
    NewChannelNode {
        request_id: RequestId,
        domain_id: DomainId,
        cluster_id: ClusterId,
    },
    AssignToDomain {
        request_id: RequestId,
        domain_id: DomainId,
        node_id: NodeId,
    },
    AssignToCluster {
        request_id: RequestId,
        cluster_id: ClusterId,
        node_id: NodeId,
    },
    AssignToChannel {
        request_id: RequestId,
        channel_id: ChannelId,
        node_id: NodeId,
    },
    CountPeersAmount {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain_id: Option<DomainId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cluster_id: Option<ClusterId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<ChannelId>,
    },
    // Notifications
    AddNewNodeToPeers {
        domain_id: DomainId,
        cluster_id: ClusterId,
        channel_id: ChannelId,
        node_id: NodeId,
        user_id: UserId,
        username: String,
    },
    AddNewChannelToPeers {
        domain_id: DomainId,
        cluster_id: ClusterId,
        channel_id: ChannelId,
        node_id: NodeId,
    },
    AddNewClusterToPeers {
        domain_id: DomainId,
        cluster_id: ClusterId,
        node_id: NodeId,
    },
    AddNewDomainToPeers {
        domain_id: DomainId,
        node_id: NodeId,
    },
    // Batch relay
    ActivityBatchForward {
        user_id: UserId,
        batch_id: BatchId,
        events: Vec<Value>,
    },
    ActivityBatchFeedback {
        batch_id: BatchId,
        success: bool,
        message: String,
        timestamp: f64,
    },
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// The broker-issued commands the correlator tracks. Retained with each
/// pending request so a late reply can be routed by original command type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    NewDomainNode,
    NewClusterNode {
        domain_id: DomainId,
    },
    NewChannelNode {
        domain_id: DomainId,
        cluster_id: ClusterId,
    },
    AssignToDomain {
        domain_id: DomainId,
        node_id: NodeId,
    },
    AssignToCluster {
        cluster_id: ClusterId,
        node_id: NodeId,
    },
    AssignToChannel {
        channel_id: ChannelId,
        node_id: NodeId,
    },
    CountPeersAmount {
        domain_id: Option<DomainId>,
        cluster_id: Option<ClusterId>,
        channel_id: Option<ChannelId>,
    },
}

impl Command {
    /// The wire `type` discriminator the command is sent with.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::NewDomainNode => "new_domain_node",
            Command::NewClusterNode { .. } => "new_cluster_node",
            Command::NewChannelNode { .. } => "new_channel_node",
            Command::AssignToDomain { .. } => "assign_to_domain",
            Command::AssignToCluster { .. } => "assign_to_cluster",
            Command::AssignToChannel { .. } => "assign_to_channel",
            Command::CountPeersAmount { .. } => "count_peers_amount",
        }
    }

    /// Builds the outgoing wire message for this command.
    pub fn to_message(&self, request_id: RequestId) -> ServerMessage {
        match self.clone() {
            Command::NewDomainNode => ServerMessage::NewDomainNode { request_id },
            Command::NewClusterNode { domain_id } => ServerMessage::NewClusterNode {
                request_id,
                domain_id,
            },
            Command::NewChannelNode {
                domain_id,
                cluster_id,
            } => ServerMessage::NewChannelNode {
                request_id,
                domain_id,
                cluster_id,
            },
            Command::AssignToDomain { domain_id, node_id } => ServerMessage::AssignToDomain {
                request_id,
                domain_id,
                node_id,
            },
            Command::AssignToCluster {
                cluster_id,
                node_id,
            } => ServerMessage::AssignToCluster {
                request_id,
                cluster_id,
                node_id,
            },
            Command::AssignToChannel {
                channel_id,
                node_id,
            } => ServerMessage::AssignToChannel {
                request_id,
                channel_id,
                node_id,
            },
            Command::CountPeersAmount {
                domain_id,
                cluster_id,
                channel_id,
            } => ServerMessage::CountPeersAmount {
                request_id,
                domain_id,
                cluster_id,
                channel_id,
            },
        }
    }
}
