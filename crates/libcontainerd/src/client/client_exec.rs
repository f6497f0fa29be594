use oci_spec::runtime::Process as ProcessSpec;

use super::Client;
use crate::error::LibcontainerdError;
use crate::remote::{AddProcessRequest, INIT_PROCESS_ID};

impl Client {
    /// Starts an additional process named `process_id` inside container `id`.
    ///
    /// When `spec` carries no environment the environment of the container's
    /// own process is used. The process is only recorded once the daemon has
    /// accepted it; its streams are attached afterwards.
    pub fn add_process(
        &self,
        id: &str,
        process_id: &str,
        spec: &ProcessSpec,
    ) -> Result<(), LibcontainerdError> {
        if process_id == INIT_PROCESS_ID {
            return Err(LibcontainerdError::InvalidInput(format!(
                "process id {process_id:?} is reserved"
            )));
        }
        // the id names fifos inside the bundle directory
        if process_id.is_empty()
            || process_id == "."
            || process_id == ".."
            || process_id.contains(['/', '\\', '\0'])
        {
            return Err(LibcontainerdError::InvalidInput(format!(
                "invalid process id {process_id:?}"
            )));
        }

        let _guard = self.lock(id);
        let container = self.registry.get(id)?;

        let env = match spec.env() {
            Some(env) => env.clone(),
            None => container
                .spec()
                .ok()
                .and_then(|base| base.process().as_ref().and_then(|p| p.env().clone()))
                .unwrap_or_default(),
        };
        let terminal = spec.terminal().unwrap_or(false);

        let process = container.new_process(process_id);
        let pipes = process.open_fifos(terminal)?;
        let req = AddProcessRequest {
            id: id.to_owned(),
            pid: process_id.to_owned(),
            args: spec.args().clone().unwrap_or_default(),
            env,
            cwd: spec.cwd().clone(),
            terminal,
            uid: spec.user().uid(),
            gid: spec.user().gid(),
            stdin: pipes.stdin.clone(),
            stdout: pipes.stdout.clone(),
            stderr: pipes.stderr.clone().unwrap_or_else(|| process.stderr()),
        };

        tracing::debug!(id, process_id, "adding process");
        self.api().add_process(req)?;
        container.add_process(process);

        if let Err(err) = self.backend.attach_streams(process_id, pipes) {
            container.remove_process(process_id);
            return Err(err.into());
        }
        Ok(())
    }
}
