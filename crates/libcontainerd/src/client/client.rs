use std::sync::Arc;

use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::container::{Container, CreateOption};
use crate::error::LibcontainerdError;
use crate::lock::{ContainerLockGuard, ContainerLocks};
use crate::registry::Registry;
use crate::remote::{ApiClient, ContainerInfo, Remote, RpcError, StateRequest};

/// Client drives containers through the runtime daemon and reconciles the
/// events the daemon emits on its own.
///
/// Every operation on a container id runs with that id locked, so calls for
/// one container are serialized while calls for different containers run in
/// parallel.
pub struct Client {
    pub(super) config: ClientConfig,
    pub(super) locks: ContainerLocks,
    pub(super) registry: Registry,
    pub(super) remote: Remote,
    pub(super) backend: Arc<dyn Backend>,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn ApiClient>,
        backend: Arc<dyn Backend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            locks: ContainerLocks::new(),
            registry: Registry::new(),
            remote: Remote::new(api),
            backend,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(super) fn api(&self) -> &dyn ApiClient {
        self.remote.api.as_ref()
    }

    pub(super) fn lock(&self, id: &str) -> ContainerLockGuard<'_> {
        self.locks.lock(id)
    }

    /// Returns the registered container for `id`.
    pub fn get_container(&self, id: &str) -> Result<Arc<Container>, LibcontainerdError> {
        self.registry.get(id)
    }

    /// Reports whether `id` is currently registered as live.
    pub fn is_active(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Ids of all live containers, sorted.
    pub fn container_ids(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Reports whether an event for `id` is waiting in the backlog.
    pub fn has_backlog_event(&self, id: &str) -> bool {
        self.remote.has_past_event(id)
    }

    /// Number of container ids that currently have a lock handle.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub(super) fn new_container(
        &self,
        id: &str,
        bundle_dir: &std::path::Path,
        options: &[Box<dyn CreateOption>],
    ) -> Container {
        Container::new(id, bundle_dir, options)
    }

    /// Asks the daemon for its view of `id`.
    pub(super) fn get_containerd_container(
        &self,
        id: &str,
    ) -> Result<ContainerInfo, LibcontainerdError> {
        let resp = self.api().state(StateRequest { id: id.to_owned() })?;
        resp.containers
            .into_iter()
            .find(|cont| cont.id == id)
            .ok_or_else(|| LibcontainerdError::NotFoundUpstream(id.to_owned()))
    }
}

impl LibcontainerdError {
    pub(super) fn is_not_found_upstream(&self) -> bool {
        matches!(
            self,
            Self::NotFoundUpstream(_) | Self::Rpc(RpcError::NotFound(_))
        )
    }
}
