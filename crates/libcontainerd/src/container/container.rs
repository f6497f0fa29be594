use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use oci_spec::runtime::Spec;

use super::{CreateOption, Process};
use crate::error::LibcontainerdError;
use crate::pause_monitor::PauseMonitor;
use crate::remote::INIT_PROCESS_ID;

const CONFIG_FILE_NAME: &str = "config.json";

/// Structure representing one live container
#[derive(Debug)]
pub struct Container {
    id: String,
    bundle_dir: PathBuf,
    // pid of the init process as reported by the daemon, 0 if none
    system_pid: AtomicU32,
    processes: Mutex<HashMap<String, Process>>,
    pause_monitor: PauseMonitor,
    runtime_args: Vec<String>,
    annotations: HashMap<String, String>,
}

impl Container {
    /// Builds the container state and applies `options`. An option that
    /// fails is logged and skipped.
    pub fn new(id: &str, bundle_dir: &Path, options: &[Box<dyn CreateOption>]) -> Self {
        let init = Process::new(id, INIT_PROCESS_ID, bundle_dir);
        let mut container = Self {
            id: id.to_owned(),
            bundle_dir: bundle_dir.to_path_buf(),
            system_pid: AtomicU32::new(0),
            processes: Mutex::new(HashMap::from([(INIT_PROCESS_ID.to_owned(), init)])),
            pause_monitor: PauseMonitor::new(),
            runtime_args: Vec::new(),
            annotations: HashMap::new(),
        };

        for option in options {
            if let Err(err) = option.apply(&mut container) {
                tracing::error!(id, %err, "failed to apply create option");
            }
        }

        container
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn system_pid(&self) -> u32 {
        self.system_pid.load(Ordering::SeqCst)
    }

    pub fn set_system_pid(&self, pid: u32) -> &Self {
        self.system_pid.store(pid, Ordering::SeqCst);
        self
    }

    pub fn pause_monitor(&self) -> &PauseMonitor {
        &self.pause_monitor
    }

    pub fn runtime_args(&self) -> &[String] {
        &self.runtime_args
    }

    pub fn set_runtime_args(&mut self, args: Vec<String>) -> &mut Self {
        self.runtime_args = args;
        self
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    pub fn set_annotations(&mut self, annotations: HashMap<String, String>) -> &mut Self {
        self.annotations = annotations;
        self
    }

    fn processes(&self) -> MutexGuard<'_, HashMap<String, Process>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init_process(&self) -> Process {
        // the init entry is inserted on construction and never removed
        self.processes()
            .get(INIT_PROCESS_ID)
            .cloned()
            .unwrap_or_else(|| Process::new(&self.id, INIT_PROCESS_ID, &self.bundle_dir))
    }

    pub fn process(&self, process_id: &str) -> Option<Process> {
        self.processes().get(process_id).cloned()
    }

    pub fn new_process(&self, process_id: &str) -> Process {
        Process::new(&self.id, process_id, &self.bundle_dir)
    }

    pub fn add_process(&self, process: Process) {
        self.processes()
            .insert(process.process_id().to_owned(), process);
    }

    /// Drops an exec'd process. The init process cannot be removed.
    pub fn remove_process(&self, process_id: &str) -> Option<Process> {
        if process_id == INIT_PROCESS_ID {
            return None;
        }
        self.processes().remove(process_id)
    }

    pub fn process_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.processes().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn config_path(&self) -> PathBuf {
        self.bundle_dir.join(CONFIG_FILE_NAME)
    }

    pub fn save_spec(&self, spec: &Spec) -> Result<(), LibcontainerdError> {
        spec.save(self.config_path())?;
        Ok(())
    }

    pub fn spec(&self) -> Result<Spec, LibcontainerdError> {
        Ok(Spec::load(self.config_path())?)
    }

    /// Removes the bundle directory and everything created in it.
    pub fn clean(&self) -> Result<(), LibcontainerdError> {
        match fs::remove_dir_all(&self.bundle_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LibcontainerdError::Io {
                path: self.bundle_dir.clone(),
                source: err,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::container::WithRuntimeArgs;

    #[test]
    fn test_new_has_init_process() {
        let container = Container::new("c1", Path::new("/run/libcontainerd/c1"), &[]);
        assert_eq!(container.id(), "c1");
        assert_eq!(container.system_pid(), 0);
        assert_eq!(container.process_ids(), vec![INIT_PROCESS_ID.to_owned()]);
        assert_eq!(container.init_process().process_id(), INIT_PROCESS_ID);
    }

    #[test]
    fn test_options_are_applied() {
        let options: Vec<Box<dyn CreateOption>> =
            vec![Box::new(WithRuntimeArgs(vec!["--debug".to_owned()]))];
        let container = Container::new("c1", Path::new("/tmp/c1"), &options);
        assert_eq!(container.runtime_args(), ["--debug".to_owned()]);
    }

    #[test]
    fn test_process_table() {
        let container = Container::new("c1", Path::new("/tmp/c1"), &[]);
        container.add_process(container.new_process("exec-1"));
        assert!(container.process("exec-1").is_some());

        assert!(container.remove_process(INIT_PROCESS_ID).is_none());
        assert!(container.remove_process("exec-1").is_some());
        assert_eq!(container.process_ids(), vec![INIT_PROCESS_ID.to_owned()]);
    }

    #[test]
    fn test_save_load_spec_and_clean() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tmp.path().join("c1");
        fs::create_dir(&bundle)?;

        let container = Container::new("c1", &bundle, &[]);
        container.set_system_pid(42);
        assert_eq!(container.system_pid(), 42);

        let spec = Spec::default();
        container.save_spec(&spec)?;
        assert_eq!(container.spec()?.version(), spec.version());

        container.clean()?;
        assert!(!bundle.exists());
        // cleaning twice is fine
        container.clean()?;
        Ok(())
    }
}
