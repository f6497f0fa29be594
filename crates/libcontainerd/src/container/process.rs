use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::backend::IoPipes;
use crate::error::LibcontainerdError;

/// One OS process inside a container, either its init process or one added
/// later through exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    // name of the directory holding the process fifos
    id: String,
    process_id: String,
    // owning container, used for lookups only
    container_id: String,
    dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl Stream {
    fn suffix(self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl Process {
    pub fn new(container_id: &str, process_id: &str, dir: &Path) -> Self {
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| container_id.to_owned());

        Self {
            id,
            process_id: process_id.to_owned(),
            container_id: container_id.to_owned(),
            dir: dir.to_path_buf(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn fifo(&self, stream: Stream) -> PathBuf {
        self.dir
            .join(format!("{}-{}", self.process_id, stream.suffix()))
    }

    pub fn stdin(&self) -> PathBuf {
        self.fifo(Stream::Stdin)
    }

    pub fn stdout(&self) -> PathBuf {
        self.fifo(Stream::Stdout)
    }

    pub fn stderr(&self) -> PathBuf {
        self.fifo(Stream::Stderr)
    }

    /// Creates the named pipes for this process, reusing any that already
    /// exist. A process with a terminal gets no stderr pipe.
    pub fn open_fifos(&self, terminal: bool) -> Result<IoPipes, LibcontainerdError> {
        let mut streams = vec![Stream::Stdin, Stream::Stdout];
        if !terminal {
            streams.push(Stream::Stderr);
        }
        for stream in streams {
            let path = self.fifo(stream);
            match mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR) {
                Ok(()) | Err(Errno::EEXIST) => {}
                Err(err) => {
                    tracing::error!(?path, %err, "failed to create fifo");
                    return Err(LibcontainerdError::Fifo { path, source: err });
                }
            }
        }

        Ok(IoPipes {
            stdin: self.stdin(),
            stdout: self.stdout(),
            stderr: (!terminal).then(|| self.stderr()),
            terminal,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::FileTypeExt;

    use anyhow::Result;

    use super::*;

    #[test]
    fn test_fifo_paths() {
        let process = Process::new("c1", "exec-1", Path::new("/run/libcontainerd/c1"));
        assert_eq!(process.id(), "c1");
        assert_eq!(process.container_id(), "c1");
        assert_eq!(
            process.stdout(),
            PathBuf::from("/run/libcontainerd/c1/exec-1-stdout")
        );
    }

    #[test]
    fn test_open_fifos() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let process = Process::new("c1", "init", tmp.path());

        let pipes = process.open_fifos(false)?;
        assert!(std::fs::metadata(&pipes.stdin)?.file_type().is_fifo());
        assert!(std::fs::metadata(&pipes.stdout)?.file_type().is_fifo());
        let stderr = pipes.stderr.expect("stderr pipe without terminal");
        assert!(std::fs::metadata(stderr)?.file_type().is_fifo());

        // opening twice reuses the pipes
        process.open_fifos(false)?;
        Ok(())
    }

    #[test]
    fn test_open_fifos_with_terminal() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let process = Process::new("c1", "init", tmp.path());

        let pipes = process.open_fifos(true)?;
        assert!(pipes.terminal);
        assert!(pipes.stderr.is_none());
        assert!(!process.stderr().exists());
        Ok(())
    }

    #[test]
    fn test_open_fifos_missing_dir() {
        let process = Process::new("c1", "init", Path::new("/nonexistent/libcontainerd/c1"));
        assert!(matches!(
            process.open_fifos(false),
            Err(LibcontainerdError::Fifo { .. })
        ));
    }
}
