use std::collections::HashMap;

use super::Container;
use crate::error::LibcontainerdError;

/// Configuration applied to a container while it is being built, before it
/// is registered. Failures are logged by the caller and do not abort the
/// build.
pub trait CreateOption {
    fn apply(&self, container: &mut Container) -> Result<(), LibcontainerdError>;
}

/// Extra arguments forwarded to the OCI runtime on create
#[derive(Debug, Clone, Default)]
pub struct WithRuntimeArgs(pub Vec<String>);

impl CreateOption for WithRuntimeArgs {
    fn apply(&self, container: &mut Container) -> Result<(), LibcontainerdError> {
        if let Some(arg) = self.0.iter().find(|arg| arg.trim().is_empty()) {
            return Err(LibcontainerdError::InvalidInput(format!(
                "empty runtime argument {arg:?}"
            )));
        }
        container.set_runtime_args(self.0.clone());
        Ok(())
    }
}

/// Key/value metadata kept with the container
#[derive(Debug, Clone, Default)]
pub struct WithAnnotations(pub HashMap<String, String>);

impl CreateOption for WithAnnotations {
    fn apply(&self, container: &mut Container) -> Result<(), LibcontainerdError> {
        let mut annotations = container.annotations().clone();
        annotations.extend(self.0.clone());
        container.set_annotations(annotations);
        Ok(())
    }
}
