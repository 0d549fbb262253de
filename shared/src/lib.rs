//! # Trellis Shared
//! Common functionality shared between the trellis broker and the clients it
//! places into the domain → cluster → channel hierarchy: the JSON wire
//! protocol, identifier newtypes, and keyed storage primitives.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

mod bigmap;
mod error;
mod ids;
mod messages;

pub use bigmap::{BigMap, BigMapKey};
pub use error::ProtocolError;
pub use ids::{BatchId, ChannelId, ClientId, ClusterId, DomainId, NodeId, RequestId, UserId};
pub use messages::{
    ActivityBatch, BatchFeedback, ClientMessage, Command, CommandReply, RegisterParams,
    RejectReason, ReplyData, ServerMessage,
};
