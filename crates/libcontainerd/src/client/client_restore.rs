use std::sync::Arc;

use tracing::instrument;

use super::Client;
use crate::backend::{State, StateInfo};
use crate::container::CreateOption;
use crate::error::LibcontainerdError;
use crate::remote::{ContainerInfo, EventType};

impl Client {
    /// Reconciles container `id` with the daemon after a restart of either
    /// side.
    ///
    /// Meant for sweeps over many containers: every failure is logged and
    /// none is returned, so one broken container never stops the sweep. Use
    /// [`Client::try_restore`] to observe the outcome.
    pub fn restore(&self, id: &str, options: &[Box<dyn CreateOption>]) {
        if let Err(err) = self.try_restore(id, options) {
            tracing::error!(id, %err, "error restoring container");
        }
    }

    /// Reconciles container `id` with the daemon and reports the outcome.
    ///
    /// If the daemon still runs the container it is registered again and
    /// announced as restored, followed by any pause or resume that happened
    /// while nobody was watching. If the daemon has no record of it, the
    /// container exited in the meantime and an exit is announced with the
    /// status from the backlog, or 0 when there is none.
    #[instrument(level = "debug", skip(self, options))]
    pub fn try_restore(
        &self,
        id: &str,
        options: &[Box<dyn CreateOption>],
    ) -> Result<(), LibcontainerdError> {
        match self.get_containerd_container(id) {
            Ok(cont) => self.restore_live(&cont, options),
            Err(err) if err.is_not_found_upstream() => self.restore_exited(id),
            Err(err) => Err(err),
        }
    }

    fn restore_live(
        &self,
        cont: &ContainerInfo,
        options: &[Box<dyn CreateOption>],
    ) -> Result<(), LibcontainerdError> {
        let id = cont.id.as_str();
        let _guard = self.lock(id);
        tracing::debug!(id, status = %cont.status, "restore container");

        if self.registry.contains(id) {
            return Err(LibcontainerdError::AlreadyActive(id.to_owned()));
        }

        let container = Arc::new(self.new_container(id, &cont.bundle_path, options));
        container.set_system_pid(cont.system_pid());

        // stdio must be wired before anyone can see the container as live
        let pipes = container.init_process().open_fifos(false)?;
        self.backend.attach_streams(id, pipes)?;

        // events queued from now on are dispatched to the container, the
        // ones queued before are replayed below
        let past_event = {
            let mut backlog = self.remote.backlog();
            self.registry.put(Arc::clone(&container));
            backlog.take(id)
        };

        if let Err(err) = self.backend.state_changed(
            id,
            StateInfo::new(State::Restore).with_pid(container.system_pid()),
        ) {
            let mut backlog = self.remote.backlog();
            self.registry.delete(id);
            if let Some(event) = past_event {
                backlog.record(event);
            }
            return Err(err.into());
        }

        if let Some(event) = past_event {
            match event.event_type {
                EventType::Pause | EventType::Resume => {
                    let state = match event.event_type {
                        EventType::Pause => State::Pause,
                        _ => State::Resume,
                    };
                    self.backend.state_changed(
                        id,
                        StateInfo::new(state).with_pid(container.system_pid()),
                    )?;
                }
                _ => tracing::warn!(id, ?event, "unexpected backlog event"),
            }
        }

        Ok(())
    }

    fn restore_exited(&self, id: &str) -> Result<(), LibcontainerdError> {
        let _guard = self.lock(id);

        let exit_code = match self.remote.take_past_event(id) {
            Some(event) if event.event_type == EventType::Exit => event.status,
            Some(event) => {
                tracing::warn!(id, ?event, "unexpected backlog event for exited container");
                0
            }
            None => 0,
        };
        tracing::debug!(id, exit_code, "container exited while not watched");

        self.backend
            .state_changed(id, StateInfo::new(State::Exit).with_exit_code(exit_code))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::config::ClientConfig;
    use crate::remote::{MockApiClient, ProcessInfo, RpcError, StateResponse, INIT_PROCESS_ID};
    use crate::test_utils::TestBackend;

    #[test]
    fn test_unavailable_daemon_is_not_an_exit() -> Result<()> {
        let mut api = MockApiClient::new();
        api.expect_state()
            .times(1)
            .returning(|_| Err(RpcError::Unavailable("connection refused".to_owned())));
        let backend = Arc::new(TestBackend::new());
        let client = Client::new(ClientConfig::default(), Arc::new(api), backend.clone());

        let err = client.try_restore("c1", &[]).unwrap_err();
        assert!(err.is_upstream());
        assert!(!err.is_not_found_upstream());
        assert!(backend.get_state_changes().is_empty());
        Ok(())
    }

    #[test]
    fn test_restore_registers_daemon_view() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle_path = tmp.path().to_path_buf();

        let mut api = MockApiClient::new();
        api.expect_state()
            .withf(|req| req.id == "c1")
            .times(1)
            .returning(move |req| {
                Ok(StateResponse {
                    containers: vec![ContainerInfo {
                        id: req.id,
                        bundle_path: bundle_path.clone(),
                        status: "paused".to_owned(),
                        pids: vec![31],
                        processes: vec![ProcessInfo {
                            pid: INIT_PROCESS_ID.to_owned(),
                            system_pid: 31,
                        }],
                    }],
                })
            });
        let backend = Arc::new(TestBackend::new());
        let client = Client::new(ClientConfig::default(), Arc::new(api), backend.clone());

        client.restore("c1", &[]);
        assert!(client.is_active("c1"));
        assert_eq!(client.get_container("c1")?.system_pid(), 31);
        assert_eq!(
            backend.get_state_changes(),
            vec![(
                "c1".to_owned(),
                StateInfo::new(State::Restore).with_pid(31)
            )]
        );
        assert!(tmp.path().join("init-stdout").exists());
        assert_eq!(client.lock_count(), 0);
        Ok(())
    }
}
