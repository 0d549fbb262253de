mod channel;

pub use channel::MessageChannel;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed sending message over the transport")]
pub struct SendError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed receiving message from the transport")]
pub struct RecvError;

/// Outbound half of a persistent, full-duplex, message-oriented connection.
/// One boxed sender is attached to each [`crate::Connection`]; a send failure
/// is how the broker detects transport loss.
pub trait MessageSender: Send + Sync {
    fn send(&self, message: &str) -> Result<(), SendError>;
}

/// Inbound half of a connection, for hosts that pump messages themselves.
pub trait MessageReceiver: Send + Sync {
    /// Receives the next message from the connection, if one is waiting.
    fn receive(&mut self) -> Result<Option<String>, RecvError>;
}
