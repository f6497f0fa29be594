use super::Client;
use crate::error::LibcontainerdError;
use crate::remote::StatsRequest;
use crate::stats::Stats;

impl Client {
    /// Current resource usage of container `id`. Does not take the container
    /// lock.
    pub fn stats(&self, id: &str) -> Result<Stats, LibcontainerdError> {
        let resp = self.api().stats(StatsRequest { id: id.to_owned() })?;
        Ok(Stats::from(resp))
    }

    /// OS pids of all processes the daemon runs for container `id`.
    pub fn get_pids_for_container(&self, id: &str) -> Result<Vec<u32>, LibcontainerdError> {
        let cont = self.get_containerd_container(id)?;
        Ok(cont.pids)
    }
}
