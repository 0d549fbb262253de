use thiserror::Error;

use trellis_shared::{NodeId, ProtocolError};

/// Errors surfaced through the broker's event stream. Failures inside one
/// pool operation never propagate to unrelated pools or connections; the
/// only caller-visible failures are registration rejection and
/// assignment-chain exhaustion. Transport loss is not an error here: a
/// failed send closes the connection and surfaces as a disconnect event.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("registration conflict: node {0} is already connected")]
    RegistrationConflict(NodeId),
    #[error("remote command {command} timed out")]
    RequestTimeout { command: &'static str },
    #[error("assignment exhausted for node {0}: no level could be attached or created")]
    AssignmentExhausted(NodeId),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
