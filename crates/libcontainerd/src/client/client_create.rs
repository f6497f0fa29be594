use std::fs;
use std::sync::Arc;

use oci_spec::runtime::Spec;
use tracing::instrument;

use super::Client;
use crate::backend::{State, StateInfo};
use crate::container::{Container, CreateOption};
use crate::error::LibcontainerdError;
use crate::remote::CreateContainerRequest;

impl Client {
    /// Creates a container from `spec` and starts its init process through
    /// the daemon.
    ///
    /// The spec is written to `config.json` in a fresh bundle directory under
    /// the configured state dir. The container is registered before the
    /// daemon is asked to create it; if any later step fails the
    /// registration and the bundle directory are removed again.
    #[instrument(level = "debug", skip(self, spec, options))]
    pub fn create(
        &self,
        id: &str,
        spec: &Spec,
        options: &[Box<dyn CreateOption>],
    ) -> Result<(), LibcontainerdError> {
        let _guard = self.lock(id);

        if self.registry.contains(id) {
            return Err(LibcontainerdError::AlreadyActive(id.to_owned()));
        }

        let bundle_dir = self.config.bundle_dir(id);
        fs::create_dir_all(&bundle_dir).map_err(|err| {
            tracing::error!(?bundle_dir, %err, "failed to create bundle directory");
            LibcontainerdError::Io {
                path: bundle_dir.clone(),
                source: err,
            }
        })?;

        let container = Arc::new(self.new_container(id, &bundle_dir, options));
        if let Err(err) = self.start(&container, spec) {
            tracing::error!(id, %err, "failed to create container");
            self.registry.delete(id);
            if let Err(clean_err) = container.clean() {
                tracing::warn!(id, err = %clean_err, "failed to remove bundle directory");
            }
            return Err(err);
        }

        Ok(())
    }

    // must hold the lock for container.id()
    fn start(&self, container: &Arc<Container>, spec: &Spec) -> Result<(), LibcontainerdError> {
        let id = container.id();
        container.save_spec(spec)?;

        let terminal = spec
            .process()
            .as_ref()
            .and_then(|process| process.terminal())
            .unwrap_or(false);
        let init = container.init_process();
        let pipes = init.open_fifos(terminal)?;

        let mut runtime_args = self.config.runtime_args.clone();
        runtime_args.extend_from_slice(container.runtime_args());
        let req = CreateContainerRequest {
            id: id.to_owned(),
            bundle_path: container.bundle_dir().to_path_buf(),
            stdin: pipes.stdin.clone(),
            stdout: pipes.stdout.clone(),
            stderr: pipes.stderr.clone().unwrap_or_else(|| init.stderr()),
            runtime: self.config.runtime.clone(),
            runtime_args,
        };

        self.registry.put(Arc::clone(container));

        let resp = self.api().create_container(req)?;
        let pid = resp.container.system_pid();
        container.set_system_pid(pid);
        tracing::debug!(id, pid, "daemon created container");

        self.backend.attach_streams(id, pipes)?;
        self.backend
            .state_changed(id, StateInfo::new(State::Start).with_pid(pid))?;

        Ok(())
    }
}
