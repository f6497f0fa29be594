use crate::backend::{BackendError, State};
use crate::remote::RpcError;
use crate::signal::SignalError;

/// LibcontainerdError is the error returned by the client facade. Internal
/// locking misuse is never surfaced here, it is only logged.
#[derive(Debug, thiserror::Error)]
pub enum LibcontainerdError {
    #[error("invalid container: {0}")]
    InvalidContainer(String),
    #[error("no active process for container {0}")]
    NoActiveProcess(String),
    #[error("container {0} is already active")]
    AlreadyActive(String),
    #[error("container {0} is not known to the daemon")]
    NotFoundUpstream(String),
    #[error("timed out waiting for container {id} to reach {state}")]
    PauseTimeout { id: String, state: State },
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    InvalidSignal(#[from] SignalError),
    #[error(transparent)]
    OciSpec(#[from] oci_spec::OciSpecError),
    #[error("io error at {path:?}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to spawn event monitor")]
    EventMonitor(#[source] std::io::Error),
    #[error("failed to create fifo {path:?}")]
    Fifo {
        path: std::path::PathBuf,
        source: nix::Error,
    },
}

impl LibcontainerdError {
    /// Reports whether the error came back from the daemon rather than from
    /// local validation.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_container_message() {
        let err = LibcontainerdError::InvalidContainer("c1".to_owned());
        assert_eq!(err.to_string(), "invalid container: c1");
    }

    #[test]
    fn test_is_upstream() {
        let err: LibcontainerdError = RpcError::Unavailable("connection refused".to_owned()).into();
        assert!(err.is_upstream());
        assert!(!LibcontainerdError::NoActiveProcess("c1".to_owned()).is_upstream());
    }
}
