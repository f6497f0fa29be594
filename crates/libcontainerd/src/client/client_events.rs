use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use super::Client;
use crate::backend::{State, StateInfo};
use crate::error::LibcontainerdError;
use crate::remote::{Event, EventType, INIT_PROCESS_ID};

impl Client {
    /// Subscribes to daemon events and dispatches them on a background
    /// thread until [`Client::shutdown`] is called.
    ///
    /// The first subscription happens before returning, so a daemon that
    /// cannot be reached is reported to the caller. When the stream ends or a
    /// later subscription fails, the monitor waits `eventRetryIntervalMs`
    /// before subscribing again. A new subscription replays events newer
    /// than the last one seen.
    pub fn start_event_monitor(self: &Arc<Self>) -> Result<JoinHandle<()>, LibcontainerdError> {
        let events = self.remote.subscribe()?;
        let client = Arc::clone(self);

        thread::Builder::new()
            .name("libcontainerd-events".to_owned())
            .spawn(move || client.run_event_monitor(events))
            .map_err(LibcontainerdError::EventMonitor)
    }

    /// Stops the event monitor once its current subscription ends.
    pub fn shutdown(&self) {
        self.remote.close();
    }

    fn run_event_monitor(&self, mut events: Receiver<Event>) {
        loop {
            for event in events.iter() {
                self.handle_event(event);
                if self.remote.is_closed() {
                    break;
                }
            }

            events = loop {
                if self.remote.is_closed() {
                    tracing::debug!("event monitor stopped");
                    return;
                }
                // also paces a daemon that keeps accepting and dropping streams
                thread::sleep(self.config.event_retry_interval());
                match self.remote.subscribe() {
                    Ok(events) => break events,
                    Err(err) => tracing::warn!(%err, "failed to subscribe to daemon events"),
                }
            };
        }
    }

    /// Dispatches one daemon event: to the registered container it belongs
    /// to, or to the backlog when the container is not registered.
    ///
    /// The container id is locked while the event is applied, so an event
    /// never interleaves with a restore of the same container. The backend
    /// is notified after the lock is released.
    pub fn handle_event(&self, event: Event) {
        self.remote.observe(&event);

        let guard = self.lock(&event.id);
        let container = {
            let mut backlog = self.remote.backlog();
            match self.registry.get(&event.id) {
                Ok(container) => container,
                Err(_) => {
                    tracing::debug!(id = %event.id, event_type = ?event.event_type, "queueing event for unknown container");
                    backlog.record(event);
                    return;
                }
            }
        };

        tracing::debug!(id = %event.id, event_type = ?event.event_type, pid = %event.pid, "dispatching event");
        let info = match event.event_type {
            EventType::Exit if event.pid == INIT_PROCESS_ID => {
                self.registry.delete(&event.id);
                // callers blocked in pause or resume see the container go away
                container.pause_monitor().clear();
                StateInfo::new(State::Exit)
                    .with_pid(container.system_pid())
                    .with_exit_code(event.status)
            }
            EventType::Exit => {
                if container.remove_process(&event.pid).is_none() {
                    tracing::warn!(id = %event.id, process_id = %event.pid, "exit of unknown process");
                }
                StateInfo::new(State::ExitProcess)
                    .with_pid(container.system_pid())
                    .with_exit_code(event.status)
                    .with_process_id(event.pid.clone())
            }
            EventType::Pause | EventType::Resume => {
                let state = match event.event_type {
                    EventType::Pause => State::Pause,
                    _ => State::Resume,
                };
                if !container.pause_monitor().handle(state) {
                    tracing::debug!(id = %event.id, %state, "no caller waiting for state change");
                }
                StateInfo::new(state).with_pid(container.system_pid())
            }
            EventType::Oom => StateInfo::new(State::Oom).with_pid(container.system_pid()),
            EventType::StartContainer | EventType::StartProcess => return,
        };
        guard.unlock();

        if let Err(err) = self.backend.state_changed(&event.id, info) {
            tracing::error!(id = %event.id, %err, "failed to notify state change");
        }
    }
}
