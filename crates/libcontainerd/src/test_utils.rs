//! In-memory stand-ins for the daemon and the backend, used by the crate's
//! own tests and by downstream tests through the `test_utils` feature.
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::backend::{Backend, BackendError, IoPipes, State, StateInfo};
use crate::remote::{
    AddProcessRequest, ApiClient, ContainerInfo, CreateContainerRequest, CreateContainerResponse,
    Event, EventType, EventsRequest, ProcessInfo, RpcError, SignalRequest, StateRequest,
    StateResponse, StatsRequest, StatsResponse, UpdateContainerRequest, UpdateProcessRequest,
    INIT_PROCESS_ID,
};

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum RpcMethod {
    CreateContainer,
    AddProcess,
    Signal,
    UpdateProcess,
    UpdateContainer,
    Stats,
    State,
    Events,
}

#[derive(Default)]
struct Daemon {
    containers: HashMap<String, ContainerInfo>,
    stats: HashMap<String, StatsResponse>,
    failures: HashMap<RpcMethod, RpcError>,
    calls: HashMap<RpcMethod, usize>,
    create_requests: Vec<CreateContainerRequest>,
    add_process_requests: Vec<AddProcessRequest>,
    signal_requests: Vec<SignalRequest>,
    update_process_requests: Vec<UpdateProcessRequest>,
    update_container_requests: Vec<UpdateContainerRequest>,
    events_requests: Vec<EventsRequest>,
    subscribers: Vec<Sender<Event>>,
    confirm_updates: bool,
    drop_new_subscriptions: bool,
    next_pid: u32,
}

/// TestApiClient plays the daemon: it keeps a table of containers, records
/// every request and can be told to fail any RPC.
pub struct TestApiClient {
    daemon: Mutex<Daemon>,
}

impl Default for TestApiClient {
    fn default() -> Self {
        Self {
            daemon: Mutex::new(Daemon {
                next_pid: 100,
                ..Default::default()
            }),
        }
    }
}

impl TestApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn daemon(&self) -> MutexGuard<'_, Daemon> {
        self.daemon.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // counts the call and returns the configured failure, if any
    fn call(&self, method: RpcMethod) -> Result<MutexGuard<'_, Daemon>, RpcError> {
        let mut daemon = self.daemon();
        *daemon.calls.entry(method).or_default() += 1;
        if let Some(err) = daemon.failures.get(&method).cloned() {
            return Err(err);
        }
        Ok(daemon)
    }

    /// Makes the daemon report a running container with the given init pid.
    pub fn add_container(&self, id: &str, bundle_path: &Path, system_pid: u32) {
        let info = ContainerInfo {
            id: id.to_owned(),
            bundle_path: bundle_path.to_path_buf(),
            status: "running".to_owned(),
            pids: vec![system_pid],
            processes: vec![ProcessInfo {
                pid: INIT_PROCESS_ID.to_owned(),
                system_pid,
            }],
        };
        self.add_container_info(info);
    }

    pub fn add_container_info(&self, info: ContainerInfo) {
        self.daemon().containers.insert(info.id.clone(), info);
    }

    pub fn remove_container(&self, id: &str) {
        self.daemon().containers.remove(id);
    }

    pub fn set_stats(&self, id: &str, stats: StatsResponse) {
        self.daemon().stats.insert(id.to_owned(), stats);
    }

    /// Every later call of `method` fails with `err`.
    pub fn fail(&self, method: RpcMethod, err: RpcError) {
        self.daemon().failures.insert(method, err);
    }

    pub fn clear_failure(&self, method: RpcMethod) {
        self.daemon().failures.remove(&method);
    }

    /// When set, an accepted `update_container` is confirmed with a pause or
    /// resume event on every open subscription.
    pub fn confirm_updates(&self, confirm: bool) {
        self.daemon().confirm_updates = confirm;
    }

    /// Sends `event` to every open subscription.
    pub fn emit(&self, event: Event) {
        self.daemon()
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// When set, subscriptions are accepted and ended right away.
    pub fn drop_new_subscriptions(&self, drop: bool) {
        self.daemon().drop_new_subscriptions = drop;
    }

    /// Ends every open subscription.
    pub fn drop_subscriptions(&self) {
        self.daemon().subscribers.clear();
    }

    pub fn calls(&self, method: RpcMethod) -> usize {
        self.daemon().calls.get(&method).copied().unwrap_or(0)
    }

    pub fn get_create_requests(&self) -> Vec<CreateContainerRequest> {
        self.daemon().create_requests.clone()
    }

    pub fn get_add_process_requests(&self) -> Vec<AddProcessRequest> {
        self.daemon().add_process_requests.clone()
    }

    pub fn get_signal_requests(&self) -> Vec<SignalRequest> {
        self.daemon().signal_requests.clone()
    }

    pub fn get_update_process_requests(&self) -> Vec<UpdateProcessRequest> {
        self.daemon().update_process_requests.clone()
    }

    pub fn get_update_container_requests(&self) -> Vec<UpdateContainerRequest> {
        self.daemon().update_container_requests.clone()
    }

    pub fn get_events_requests(&self) -> Vec<EventsRequest> {
        self.daemon().events_requests.clone()
    }
}

impl ApiClient for TestApiClient {
    fn create_container(
        &self,
        req: CreateContainerRequest,
    ) -> Result<CreateContainerResponse, RpcError> {
        let mut daemon = self.call(RpcMethod::CreateContainer)?;
        let system_pid = daemon.next_pid;
        daemon.next_pid += 1;

        let info = ContainerInfo {
            id: req.id.clone(),
            bundle_path: req.bundle_path.clone(),
            status: "running".to_owned(),
            pids: vec![system_pid],
            processes: vec![ProcessInfo {
                pid: INIT_PROCESS_ID.to_owned(),
                system_pid,
            }],
        };
        daemon.containers.insert(req.id.clone(), info.clone());
        daemon.create_requests.push(req);
        Ok(CreateContainerResponse { container: info })
    }

    fn add_process(&self, req: AddProcessRequest) -> Result<(), RpcError> {
        let mut daemon = self.call(RpcMethod::AddProcess)?;
        let system_pid = daemon.next_pid;
        daemon.next_pid += 1;

        let Some(info) = daemon.containers.get_mut(&req.id) else {
            return Err(RpcError::NotFound(req.id));
        };
        info.pids.push(system_pid);
        info.processes.push(ProcessInfo {
            pid: req.pid.clone(),
            system_pid,
        });
        daemon.add_process_requests.push(req);
        Ok(())
    }

    fn signal(&self, req: SignalRequest) -> Result<(), RpcError> {
        self.call(RpcMethod::Signal)?.signal_requests.push(req);
        Ok(())
    }

    fn update_process(&self, req: UpdateProcessRequest) -> Result<(), RpcError> {
        self.call(RpcMethod::UpdateProcess)?
            .update_process_requests
            .push(req);
        Ok(())
    }

    fn update_container(&self, req: UpdateContainerRequest) -> Result<(), RpcError> {
        let mut daemon = self.call(RpcMethod::UpdateContainer)?;
        if daemon.confirm_updates {
            let event_type = match req.status.as_str() {
                "paused" => EventType::Pause,
                _ => EventType::Resume,
            };
            let event = Event::new(req.id.clone(), event_type);
            daemon
                .subscribers
                .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        }
        daemon.update_container_requests.push(req);
        Ok(())
    }

    fn stats(&self, req: StatsRequest) -> Result<StatsResponse, RpcError> {
        let daemon = self.call(RpcMethod::Stats)?;
        daemon
            .stats
            .get(&req.id)
            .cloned()
            .ok_or(RpcError::NotFound(req.id))
    }

    fn state(&self, req: StateRequest) -> Result<StateResponse, RpcError> {
        let daemon = self.call(RpcMethod::State)?;
        Ok(StateResponse {
            containers: daemon.containers.get(&req.id).cloned().into_iter().collect(),
        })
    }

    fn events(&self, req: EventsRequest) -> Result<Receiver<Event>, RpcError> {
        let mut daemon = self.call(RpcMethod::Events)?;
        let (tx, rx) = unbounded();
        if !daemon.drop_new_subscriptions {
            daemon.subscribers.push(tx);
        }
        daemon.events_requests.push(req);
        Ok(rx)
    }
}

#[derive(Default)]
struct Notifications {
    state_changes: Vec<(String, StateInfo)>,
    attached: Vec<(String, IoPipes)>,
    fail_attach: bool,
    fail_state: Option<State>,
}

/// TestBackend records every notification and can be told to reject them.
#[derive(Default)]
pub struct TestBackend {
    notifications: Mutex<Notifications>,
    changed: Condvar,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn notifications(&self) -> MutexGuard<'_, Notifications> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_attach_streams(&self, fail: bool) {
        self.notifications().fail_attach = fail;
    }

    /// Rejects state change notifications for `state`.
    pub fn fail_state_changed(&self, state: Option<State>) {
        self.notifications().fail_state = state;
    }

    pub fn get_state_changes(&self) -> Vec<(String, StateInfo)> {
        self.notifications().state_changes.clone()
    }

    pub fn get_state_changes_for(&self, id: &str) -> Vec<StateInfo> {
        self.notifications()
            .state_changes
            .iter()
            .filter(|(changed, _)| changed == id)
            .map(|(_, info)| info.clone())
            .collect()
    }

    pub fn get_attached(&self) -> Vec<(String, IoPipes)> {
        self.notifications().attached.clone()
    }

    /// Blocks until at least `count` state changes were recorded. Returns
    /// false if that did not happen within `timeout`.
    pub fn wait_for_state_changes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut notifications = self.notifications();
        while notifications.state_changes.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            notifications = self
                .changed
                .wait_timeout(notifications, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl Backend for TestBackend {
    fn state_changed(&self, id: &str, info: StateInfo) -> Result<(), BackendError> {
        let mut notifications = self.notifications();
        if notifications.fail_state == Some(info.state) {
            return Err(BackendError::StateChanged {
                id: id.to_owned(),
                state: info.state,
                msg: "rejected by test backend".to_owned(),
            });
        }
        notifications.state_changes.push((id.to_owned(), info));
        self.changed.notify_all();
        Ok(())
    }

    fn attach_streams(&self, id: &str, pipes: IoPipes) -> Result<(), BackendError> {
        let mut notifications = self.notifications();
        if notifications.fail_attach {
            return Err(BackendError::AttachStreams {
                id: id.to_owned(),
                msg: "rejected by test backend".to_owned(),
            });
        }
        notifications.attached.push((id.to_owned(), pipes));
        Ok(())
    }
}
