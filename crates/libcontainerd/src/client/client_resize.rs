use super::Client;
use crate::error::LibcontainerdError;
use crate::remote::UpdateProcessRequest;

impl Client {
    /// Forwards a terminal size change to one process of container `id`.
    pub fn resize(
        &self,
        id: &str,
        process_id: &str,
        width: u32,
        height: u32,
    ) -> Result<(), LibcontainerdError> {
        let _guard = self.lock(id);
        self.registry.get(id)?;

        self.api().update_process(UpdateProcessRequest {
            id: id.to_owned(),
            pid: process_id.to_owned(),
            width,
            height,
        })?;
        Ok(())
    }
}
