//! Boundary to the runtime daemon: the RPC surface the client consumes, the
//! events the daemon emits, and the backlog of events that arrived for
//! containers the client did not know yet.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

/// Process id the daemon uses for the container's main process
pub const INIT_PROCESS_ID: &str = "init";

#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("daemon unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("daemon rejected request: {0}")]
    Rejected(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerRequest {
    pub id: String,
    pub bundle_path: PathBuf,
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub runtime: String,
    pub runtime_args: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerResponse {
    pub container: ContainerInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddProcessRequest {
    pub id: String,
    pub pid: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: PathBuf,
    pub terminal: bool,
    pub uid: u32,
    pub gid: u32,
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub id: String,
    pub pid: String,
    pub signal: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProcessRequest {
    pub id: String,
    pub pid: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContainerRequest {
    pub id: String,
    pub pid: String,
    // "running" or "paused"
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsRequest {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

/// Resource snapshot as the daemon reports it
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub cpu_usage_total: u64,
    pub cpu_usage_user: u64,
    pub cpu_usage_kernel: u64,
    pub percpu_usage: Vec<u64>,
    pub cpu_throttled_periods: u64,
    pub cpu_throttled_time: u64,
    pub memory_usage: u64,
    pub memory_max_usage: u64,
    pub memory_failcnt: u64,
    pub memory_limit: u64,
    pub memory_cache: u64,
    pub pids_current: u64,
    pub pids_limit: u64,
    pub network_stats: Vec<NetworkStats>,
    // Seconds since the unix epoch
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StateRequest {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StateResponse {
    pub containers: Vec<ContainerInfo>,
}

/// Daemon-side view of one container
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub id: String,
    pub bundle_path: PathBuf,
    pub status: String,
    pub pids: Vec<u32>,
    pub processes: Vec<ProcessInfo>,
}

impl ContainerInfo {
    /// OS pid of the init process, 0 if the daemon reports none.
    pub fn system_pid(&self) -> u32 {
        self.processes
            .iter()
            .find(|p| p.pid == INIT_PROCESS_ID)
            .map(|p| p.system_pid)
            .unwrap_or(0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: String,
    pub system_pid: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EventsRequest {
    // Replay events newer than this instant, None for live events only
    pub since: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    StartContainer,
    StartProcess,
    Exit,
    Oom,
    Pause,
    Resume,
}

/// Asynchronous notification emitted by the daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    // Exit status for exit events
    pub status: u32,
    // Process id the event refers to
    pub pid: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: id.into(),
            event_type,
            status: 0,
            pid: INIT_PROCESS_ID.to_owned(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    pub fn with_pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = pid.into();
        self
    }
}

/// The RPC surface of the runtime daemon. Calls block for the round trip.
/// `update_container` returns once the daemon accepted the transition, the
/// transition itself is confirmed later by an event.
#[cfg_attr(test, automock)]
pub trait ApiClient: Send + Sync {
    fn create_container(
        &self,
        req: CreateContainerRequest,
    ) -> Result<CreateContainerResponse, RpcError>;
    fn add_process(&self, req: AddProcessRequest) -> Result<(), RpcError>;
    fn signal(&self, req: SignalRequest) -> Result<(), RpcError>;
    fn update_process(&self, req: UpdateProcessRequest) -> Result<(), RpcError>;
    fn update_container(&self, req: UpdateContainerRequest) -> Result<(), RpcError>;
    fn stats(&self, req: StatsRequest) -> Result<StatsResponse, RpcError>;
    fn state(&self, req: StateRequest) -> Result<StateResponse, RpcError>;
    /// Subscribes to the event stream. The receiver disconnects when the
    /// subscription drops.
    fn events(&self, req: EventsRequest) -> Result<Receiver<Event>, RpcError>;
}

/// Remote owns the daemon connection and the event backlog.
pub(crate) struct Remote {
    pub(crate) api: Arc<dyn ApiClient>,
    // only the most recent unconsumed event per container is kept
    past_events: Mutex<HashMap<String, Event>>,
    last_event: Mutex<Option<DateTime<Utc>>>,
    closed: AtomicBool,
}

impl Remote {
    pub(crate) fn new(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            past_events: Mutex::new(HashMap::new()),
            last_event: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Locks the backlog. Checking the registry and touching the backlog
    /// under one guard keeps event dispatch and restore from interleaving.
    pub(crate) fn backlog(&self) -> Backlog<'_> {
        Backlog(
            self.past_events
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub(crate) fn take_past_event(&self, id: &str) -> Option<Event> {
        self.backlog().take(id)
    }

    pub(crate) fn has_past_event(&self, id: &str) -> bool {
        self.backlog().0.contains_key(id)
    }

    /// Remembers the newest event timestamp so that a new subscription
    /// resumes where the previous one stopped.
    pub(crate) fn observe(&self, event: &Event) {
        let mut last = self
            .last_event
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.map_or(true, |ts| ts < event.timestamp) {
            *last = Some(event.timestamp);
        }
    }

    pub(crate) fn last_event(&self) -> Option<DateTime<Utc>> {
        *self
            .last_event
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(&self) -> Result<Receiver<Event>, RpcError> {
        let since = self.last_event();
        tracing::debug!(?since, "subscribing to daemon events");
        self.api.events(EventsRequest { since })
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Held backlog of events for containers that are not registered
pub(crate) struct Backlog<'a>(MutexGuard<'a, HashMap<String, Event>>);

impl Backlog<'_> {
    pub(crate) fn record(&mut self, event: Event) {
        if let Some(previous) = self.0.insert(event.id.clone(), event) {
            tracing::debug!(
                id = %previous.id,
                event_type = ?previous.event_type,
                "dropping overwritten backlog event"
            );
        }
    }

    pub(crate) fn take(&mut self, id: &str) -> Option<Event> {
        self.0.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn remote() -> Remote {
        Remote::new(Arc::new(MockApiClient::new()))
    }

    #[test]
    fn test_backlog_last_write_wins() {
        let remote = remote();
        {
            let mut backlog = remote.backlog();
            backlog.record(Event::new("c1", EventType::Pause));
            backlog.record(Event::new("c1", EventType::Exit).with_status(3));
            backlog.record(Event::new("c2", EventType::Resume));
        }

        let event = remote.take_past_event("c1").expect("backlog event for c1");
        assert_eq!(event.event_type, EventType::Exit);
        assert_eq!(event.status, 3);
        assert!(remote.take_past_event("c1").is_none());
        assert!(remote.has_past_event("c2"));
    }

    #[test]
    fn test_observe_keeps_newest_timestamp() {
        let remote = remote();
        assert_eq!(remote.last_event(), None);

        let newer = Event::new("c1", EventType::Pause);
        let mut older = Event::new("c1", EventType::Resume);
        older.timestamp = newer.timestamp - Duration::seconds(5);

        remote.observe(&newer);
        remote.observe(&older);
        assert_eq!(remote.last_event(), Some(newer.timestamp));
    }

    #[test]
    fn test_subscribe_resumes_from_last_event() {
        let event = Event::new("c1", EventType::Oom);
        let expected = event.timestamp;

        let mut api = MockApiClient::new();
        api.expect_events()
            .withf(move |req| req.since == Some(expected))
            .times(1)
            .returning(|_| Ok(crossbeam_channel::never()));

        let remote = Remote::new(Arc::new(api));
        remote.observe(&event);
        assert!(remote.subscribe().is_ok());
    }

    #[test]
    fn test_system_pid() {
        let info = ContainerInfo {
            id: "c1".to_owned(),
            processes: vec![
                ProcessInfo {
                    pid: "exec-1".to_owned(),
                    system_pid: 77,
                },
                ProcessInfo {
                    pid: INIT_PROCESS_ID.to_owned(),
                    system_pid: 42,
                },
            ],
            ..Default::default()
        };
        assert_eq!(info.system_pid(), 42);
        assert_eq!(ContainerInfo::default().system_pid(), 0);
    }

    #[test]
    fn test_event_wire_format() {
        let json = r#"{"id":"c1","type":"start-container","status":0,"pid":"init","timestamp":"2024-01-01T00:00:00Z"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, EventType::StartContainer);
        assert_eq!(event.pid, INIT_PROCESS_ID);
    }
}
