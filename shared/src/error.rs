use thiserror::Error;

/// Failures while encoding or decoding wire messages at the transport
/// boundary. Everything past the boundary operates on typed variants.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("cannot decode inbound message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("cannot encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
}
