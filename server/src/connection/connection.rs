use log::warn;

use trellis_shared::{
    BigMapKey, ChannelId, ClientId, ClusterId, DomainId, NodeId, RegisterParams, UserId,
};

use crate::transport::{MessageSender, SendError};

// ConnectionKey

/// Handle to one transport connection. Allocated when the transport attaches
/// and never reused, so cleanup after transport loss is keyed by this handle
/// rather than by `node_id` (which legitimately repeats across reconnects).
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct ConnectionKey(u64);

impl BigMapKey for ConnectionKey {
    fn to_u64(&self) -> u64 {
        self.0
    }

    fn from_u64(value: u64) -> Self {
        ConnectionKey(value)
    }
}

// Connection

/// One client connection: the unit of identity in the broker. Identity and
/// hierarchy fields are filled in at registration and mutated in place as
/// assignment completes, never replaced.
pub struct Connection {
    sender: Box<dyn MessageSender>,
    client_id: Option<ClientId>,
    user_id: Option<UserId>,
    username: Option<String>,
    node_id: Option<NodeId>,
    domain_id: Option<DomainId>,
    cluster_id: Option<ClusterId>,
    channel_id: Option<ChannelId>,
    is_domain_main: bool,
    is_cluster_main: bool,
    is_channel_main: bool,
}

impl Connection {
    pub(crate) fn new(sender: Box<dyn MessageSender>) -> Self {
        Self {
            sender,
            client_id: None,
            user_id: None,
            username: None,
            node_id: None,
            domain_id: None,
            cluster_id: None,
            channel_id: None,
            is_domain_main: false,
            is_cluster_main: false,
            is_channel_main: false,
        }
    }

    pub(crate) fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.sender.send(text)
    }

    /// Whether a `register` message has been processed for this connection.
    pub fn is_registered(&self) -> bool {
        self.node_id.is_some()
    }

    /// Whether the connection holds a complete hierarchy path.
    pub fn is_fully_assigned(&self) -> bool {
        self.channel_id.is_some()
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn domain_id(&self) -> Option<&DomainId> {
        self.domain_id.as_ref()
    }

    pub fn cluster_id(&self) -> Option<&ClusterId> {
        self.cluster_id.as_ref()
    }

    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel_id.as_ref()
    }

    pub fn is_domain_main(&self) -> bool {
        self.is_domain_main
    }

    pub fn is_cluster_main(&self) -> bool {
        self.is_cluster_main
    }

    pub fn is_channel_main(&self) -> bool {
        self.is_channel_main
    }

    /// Applies identity, hierarchy, and main-node classification from a
    /// `register` message. Re-registration overwrites in place. Main status
    /// is decided per level by equality of `node_id` with the supplied
    /// `*_main_node_id`; a connection can be main at one level and regular
    /// at another.
    pub(crate) fn apply_registration(&mut self, params: &RegisterParams) {
        self.client_id = Some(params.client_id.clone());
        self.user_id = Some(params.user_id.clone());
        self.username = Some(params.username.clone());
        self.node_id = Some(params.node_id.clone());

        // hierarchy is filled top-down, never skipped
        self.domain_id = params.domain_id.clone();
        self.cluster_id = if self.domain_id.is_some() {
            params.cluster_id.clone()
        } else {
            if params.cluster_id.is_some() {
                warn!(
                    "node {} supplied cluster_id without domain_id, ignoring",
                    params.node_id
                );
            }
            None
        };
        self.channel_id = if self.cluster_id.is_some() {
            params.channel_id.clone()
        } else {
            if params.channel_id.is_some() {
                warn!(
                    "node {} supplied channel_id without cluster_id, ignoring",
                    params.node_id
                );
            }
            None
        };

        self.is_domain_main = params.domain_main_node_id.as_ref() == Some(&params.node_id);
        self.is_cluster_main = params.cluster_main_node_id.as_ref() == Some(&params.node_id);
        self.is_channel_main = params.channel_main_node_id.as_ref() == Some(&params.node_id);
    }

    pub(crate) fn set_domain(&mut self, domain_id: DomainId, main: bool) {
        self.domain_id = Some(domain_id);
        self.is_domain_main = main;
    }

    pub(crate) fn set_cluster(&mut self, cluster_id: ClusterId, main: bool) {
        self.cluster_id = Some(cluster_id);
        self.is_cluster_main = main;
    }

    pub(crate) fn set_channel(&mut self, channel_id: ChannelId, main: bool) {
        self.channel_id = Some(channel_id);
        self.is_channel_main = main;
    }
}
