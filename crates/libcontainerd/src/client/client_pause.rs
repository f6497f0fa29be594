use crossbeam_channel::{bounded, RecvTimeoutError};

use super::Client;
use crate::backend::State;
use crate::error::LibcontainerdError;
use crate::remote::{UpdateContainerRequest, INIT_PROCESS_ID};

impl Client {
    /// Suspends all processes of container `id` and returns once the daemon
    /// reported the container as paused.
    pub fn pause(&self, id: &str) -> Result<(), LibcontainerdError> {
        self.set_state(id, State::Pause)
    }

    /// Resumes a paused container and returns once the daemon reported it
    /// running again.
    pub fn resume(&self, id: &str) -> Result<(), LibcontainerdError> {
        self.set_state(id, State::Resume)
    }

    fn set_state(&self, id: &str, state: State) -> Result<(), LibcontainerdError> {
        let guard = self.lock(id);
        let container = self.registry.get(id)?;
        if container.system_pid() == 0 {
            return Err(LibcontainerdError::NoActiveProcess(id.to_owned()));
        }

        let status = match state {
            State::Pause => "paused",
            _ => "running",
        };

        // queue the waiter first: the confirming event may be dispatched
        // before the request returns
        let (tx, rx) = bounded(1);
        let waiter = container.pause_monitor().append(state, tx);

        tracing::debug!(id, status, "requesting container state change");
        if let Err(err) = self.api().update_container(UpdateContainerRequest {
            id: id.to_owned(),
            pid: INIT_PROCESS_ID.to_owned(),
            status: status.to_owned(),
        }) {
            container.pause_monitor().cancel(state, waiter);
            return Err(err.into());
        }

        // the event dispatch path releases the waiter without this lock
        guard.unlock();

        let outcome = match self.config.pause_timeout() {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(timeout) => rx.recv_timeout(timeout),
        };
        match outcome {
            Ok(()) => {
                tracing::debug!(id, %state, "container state change confirmed");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                if !container.pause_monitor().cancel(state, waiter) && rx.try_recv().is_ok() {
                    // released between the timeout and the cancel
                    return Ok(());
                }
                tracing::warn!(id, %state, "timed out waiting for container state change");
                Err(LibcontainerdError::PauseTimeout {
                    id: id.to_owned(),
                    state,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(id, %state, "container exited before state change was confirmed");
                Err(LibcontainerdError::NoActiveProcess(id.to_owned()))
            }
        }
    }
}
