use thiserror::Error;

/// Result type for all streaming operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the streaming coordination layer.
///
/// The variants follow the failure domains of the pipeline: discovery
/// failures are fatal to the querying node's startup, protocol failures
/// are fatal to the affected connection, transport failures trigger
/// reconnect-or-terminate depending on the node's role, and resource
/// failures surface missing ports or devices.
#[derive(Debug, Error)]
pub enum Error {
    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
