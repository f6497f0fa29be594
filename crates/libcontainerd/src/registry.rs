//! Mapping from container id to live container state
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::container::Container;
use crate::error::LibcontainerdError;

/// Registry of live containers. Reads are frequent and share the lock;
/// `put` and `delete` must be called with the container's id locked in
/// [`crate::lock::ContainerLocks`].
#[derive(Debug, Default)]
pub struct Registry {
    containers: RwLock<HashMap<String, Arc<Container>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Result<Arc<Container>, LibcontainerdError> {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| LibcontainerdError::InvalidContainer(id.to_owned()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn put(&self, container: Arc<Container>) {
        tracing::debug!(id = container.id(), "registering container");
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(container.id().to_owned(), container);
    }

    pub fn delete(&self, id: &str) -> Option<Arc<Container>> {
        tracing::debug!(id, "unregistering container");
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
