//! Contract of the consumer of lifecycle notifications
use std::fmt::Display;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle states reported to the [`Backend`]
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Start,
    Restore,
    Pause,
    Resume,
    Exit,
    ExitProcess,
    Oom,
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let print = match *self {
            Self::Start => "start",
            Self::Restore => "restore",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Exit => "exit",
            Self::ExitProcess => "exit-process",
            Self::Oom => "oom",
        };

        write!(f, "{print}")
    }
}

/// Payload of a state change notification
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateInfo {
    pub state: State,
    // Pid of the container init process, 0 when unknown
    pub pid: u32,
    pub exit_code: u32,
    // Process the notification refers to, None for the container as a whole
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
}

impl StateInfo {
    pub fn new(state: State) -> Self {
        Self {
            state,
            pid: 0,
            exit_code: 0,
            process_id: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_exit_code(mut self, exit_code: u32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = Some(process_id.into());
        self
    }
}

/// Named pipes wired to the stdio of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoPipes {
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    // None when the process runs with a terminal
    pub stderr: Option<PathBuf>,
    pub terminal: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to attach streams for {id}: {msg}")]
    AttachStreams { id: String, msg: String },
    #[error("backend rejected state change {state} for {id}: {msg}")]
    StateChanged { id: String, state: State, msg: String },
}

/// Backend receives every lifecycle notification produced by the client,
/// either from an operation or from the event stream. Implementations must
/// tolerate calls from the event dispatch thread and from callers of
/// [`crate::client::Client`] concurrently.
pub trait Backend: Send + Sync {
    fn state_changed(&self, id: &str, info: StateInfo) -> Result<(), BackendError>;
    fn attach_streams(&self, id: &str, pipes: IoPipes) -> Result<(), BackendError>;
}
