//! Test harness for the trellis broker: in-process peers wired to the
//! [`Server`] over channel-backed transports, plus helpers for driving the
//! registration and command/reply protocols from tests.

use std::time::Duration;

use trellis_server::{
    transport::{MessageChannel, MessageReceiver},
    ConnectionKey, Server, ServerConfig,
};
use trellis_shared::{
    ClientMessage, CommandReply, RegisterParams, ReplyData, RequestId, ServerMessage,
};

/// Call first in every test so `RUST_LOG` works against the suite.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn default_server() -> Server {
    Server::new(ServerConfig::default())
}

/// A server whose pending requests expire on the next `update()` call.
pub fn instant_timeout_server() -> Server {
    Server::new(ServerConfig {
        request_timeout: Duration::ZERO,
        ..ServerConfig::default()
    })
}

// TestPeer

/// One simulated client: a connection key plus the receiving half of its
/// channel transport.
pub struct TestPeer {
    pub key: ConnectionKey,
    receiver: Box<dyn MessageReceiver>,
}

impl TestPeer {
    pub fn connect(server: &mut Server) -> Self {
        let (sender, receiver) = MessageChannel::unbounded();
        let key = server.open_connection(sender);
        Self { key, receiver }
    }

    /// Decodes and returns every message the broker has sent this peer so
    /// far.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(Some(text)) = self.receiver.receive() {
            messages.push(ServerMessage::from_json(&text).expect("well-formed broker message"));
        }
        messages
    }
}

// Registration helpers

pub fn register(server: &mut Server, peer: &TestPeer, node_id: &str, user_id: &str) {
    register_at(server, peer, node_id, user_id, None, None, None);
}

pub fn register_at(
    server: &mut Server,
    peer: &TestPeer,
    node_id: &str,
    user_id: &str,
    domain_id: Option<&str>,
    cluster_id: Option<&str>,
    channel_id: Option<&str>,
) {
    let params = RegisterParams {
        client_id: format!("client-{node_id}").into(),
        user_id: user_id.into(),
        username: user_id.to_string(),
        node_id: node_id.into(),
        domain_id: domain_id.map(Into::into),
        cluster_id: cluster_id.map(Into::into),
        channel_id: channel_id.map(Into::into),
        domain_main_node_id: None,
        cluster_main_node_id: None,
        channel_main_node_id: None,
    };
    server.process_message(&peer.key, ClientMessage::Register(params));
}

// Command/reply helpers

/// The wire `type` tag of a broker-issued command, or `None` for
/// notifications and other non-command traffic.
pub fn command_kind(message: &ServerMessage) -> Option<&'static str> {
    match message {
        ServerMessage::NewDomainNode { .. } => Some("new_domain_node"),
        ServerMessage::NewClusterNode { .. } => Some("new_cluster_node"),
        ServerMessage::NewChannelNode { .. } => Some("new_channel_node"),
        ServerMessage::AssignToDomain { .. } => Some("assign_to_domain"),
        ServerMessage::AssignToCluster { .. } => Some("assign_to_cluster"),
        ServerMessage::AssignToChannel { .. } => Some("assign_to_channel"),
        ServerMessage::CountPeersAmount { .. } => Some("count_peers_amount"),
        _ => None,
    }
}

pub fn command_request_id(message: &ServerMessage) -> Option<RequestId> {
    match message {
        ServerMessage::NewDomainNode { request_id }
        | ServerMessage::NewClusterNode { request_id, .. }
        | ServerMessage::NewChannelNode { request_id, .. }
        | ServerMessage::AssignToDomain { request_id, .. }
        | ServerMessage::AssignToCluster { request_id, .. }
        | ServerMessage::AssignToChannel { request_id, .. }
        | ServerMessage::CountPeersAmount { request_id, .. } => Some(*request_id),
        _ => None,
    }
}

/// Finds the one command of the given kind in a drained message list.
pub fn find_command(messages: &[ServerMessage], kind: &str) -> RequestId {
    messages
        .iter()
        .find(|message| command_kind(message) == Some(kind))
        .and_then(command_request_id)
        .unwrap_or_else(|| panic!("expected a {kind} command, got {messages:?}"))
}

pub fn reply_ok(
    server: &mut Server,
    peer: &TestPeer,
    request_id: RequestId,
    command_type: &str,
    data: ReplyData,
) {
    let reply = CommandReply {
        request_id,
        command_type: command_type.to_string(),
        success: true,
        data,
        error: None,
    };
    server.process_message(&peer.key, ClientMessage::CommandReply(reply));
}

pub fn reply_err(server: &mut Server, peer: &TestPeer, request_id: RequestId, command_type: &str) {
    let reply = CommandReply {
        request_id,
        command_type: command_type.to_string(),
        success: false,
        data: ReplyData::default(),
        error: Some("refused".to_string()),
    };
    server.process_message(&peer.key, ClientMessage::CommandReply(reply));
}

// ReplyData builders

pub fn data_domain(domain_id: &str) -> ReplyData {
    ReplyData {
        domain_id: Some(domain_id.into()),
        ..ReplyData::default()
    }
}

pub fn data_cluster(cluster_id: &str) -> ReplyData {
    ReplyData {
        cluster_id: Some(cluster_id.into()),
        ..ReplyData::default()
    }
}

pub fn data_channel(channel_id: &str) -> ReplyData {
    ReplyData {
        channel_id: Some(channel_id.into()),
        ..ReplyData::default()
    }
}

pub fn data_count(count: u64) -> ReplyData {
    ReplyData {
        count: Some(count),
        ..ReplyData::default()
    }
}

/// Drives one fresh peer through the full creation chain, leaving it fully
/// placed as main node of `domain/cluster/channel`.
pub fn place_founder(
    server: &mut Server,
    peer: &mut TestPeer,
    node_id: &str,
    user_id: &str,
    domain_id: &str,
    cluster_id: &str,
    channel_id: &str,
) {
    register(server, peer, node_id, user_id);

    let messages = peer.drain();
    let request_id = find_command(&messages, "new_domain_node");
    reply_ok(server, peer, request_id, "new_domain_node", data_domain(domain_id));

    let messages = peer.drain();
    let request_id = find_command(&messages, "new_cluster_node");
    reply_ok(server, peer, request_id, "new_cluster_node", data_cluster(cluster_id));

    let messages = peer.drain();
    let request_id = find_command(&messages, "new_channel_node");
    reply_ok(server, peer, request_id, "new_channel_node", data_channel(channel_id));
}
