//! In-process state of supervised containers
/// A container is built once, by create or by restore, configured through
/// [`CreateOption`]s and then handed to the registry. After registration
/// only the init pid, the process table and the pause monitor change, each
/// behind its own synchronization.
#[allow(clippy::module_inception)]
mod container;
mod options;
mod process;

pub use container::Container;
pub use options::{CreateOption, WithAnnotations, WithRuntimeArgs};
pub use process::Process;
