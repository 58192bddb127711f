use thiserror::Error;

use crate::engine::task::InstanceId;

/// Failures surfaced by the bridge. Messages are kept as strings so outcomes
/// can be cloned to every observer of a download.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// URL or connection could not be established.
    #[error("open failed: {0}")]
    Open(String),

    /// Read or write error mid-transfer.
    #[error("io failed: {0}")]
    Io(String),

    /// Asset or path missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A download for this instance is already active.
    #[error("download already active for instance {0}")]
    Rejected(InstanceId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bridge not initialized")]
    NotInitialized,
}

impl BridgeError {
    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BridgeError::NotFound(format!("{}: {}", context, err))
        } else {
            BridgeError::Io(format!("{}: {}", context, err))
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
