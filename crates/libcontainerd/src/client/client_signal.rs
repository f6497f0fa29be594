use super::Client;
use crate::error::LibcontainerdError;
use crate::remote::{SignalRequest, INIT_PROCESS_ID};
use crate::signal::Signal;

impl Client {
    /// Sends `signal` to the init process of container `id`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use libcontainerd::client::Client;
    /// use libcontainerd::error::LibcontainerdError;
    /// use nix::sys::signal::Signal;
    ///
    /// fn stop(client: &Client) -> Result<(), LibcontainerdError> {
    ///     client.signal("74f1a4cb3801", Signal::SIGTERM)
    /// }
    /// ```
    pub fn signal<S: Into<Signal>>(&self, id: &str, signal: S) -> Result<(), LibcontainerdError> {
        self.signal_process(id, INIT_PROCESS_ID, signal)
    }

    /// Sends `signal` to one process of container `id`.
    pub fn signal_process<S: Into<Signal>>(
        &self,
        id: &str,
        process_id: &str,
        signal: S,
    ) -> Result<(), LibcontainerdError> {
        let signal = signal.into();
        let _guard = self.lock(id);
        self.registry.get(id)?;

        tracing::debug!(id, process_id, signal = signal.as_raw(), "signaling process");
        self.api().signal(SignalRequest {
            id: id.to_owned(),
            pid: process_id.to_owned(),
            signal: signal.as_raw(),
        })?;
        Ok(())
    }
}
