use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to open client config {path:?}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse client config {path:?}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write client config {path:?}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize client config to {path:?}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

type Result<T> = std::result::Result<T, ConfigError>;

/// Settings of the runtime client. Every field has a default so a partial
/// JSON document is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Directory holding one bundle directory per container
    pub state_dir: PathBuf,
    /// Runtime name the daemon uses to create containers
    pub runtime: String,
    /// Arguments passed to the runtime for every container
    pub runtime_args: Vec<String>,
    /// Upper bound on waiting for a pause or resume to be confirmed. None
    /// waits until the daemon reports the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_timeout_ms: Option<u64>,
    /// Delay between attempts to re-subscribe to the event stream
    pub event_retry_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/run/libcontainerd"),
            runtime: "runc".to_owned(),
            runtime_args: Vec::new(),
            pause_timeout_ms: None,
            event_retry_interval_ms: 1000,
        }
    }
}

impl ClientConfig {
    pub fn pause_timeout(&self) -> Option<Duration> {
        self.pause_timeout_ms.map(Duration::from_millis)
    }

    pub fn event_retry_interval(&self) -> Duration {
        Duration::from_millis(self.event_retry_interval_ms)
    }

    pub fn bundle_dir(&self, id: &str) -> PathBuf {
        self.state_dir.join(id)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|err| {
            tracing::error!(?path, %err, "failed to open client config");
            ConfigError::Open {
                path: path.to_owned(),
                source: err,
            }
        })?;
        serde_json::from_reader(&file).map_err(|err| {
            tracing::error!(?path, %err, "failed to parse client config");
            ConfigError::Parse {
                path: path.to_owned(),
                source: err,
            }
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = fs::File::create(path).map_err(|err| ConfigError::Write {
            path: path.to_owned(),
            source: err,
        })?;
        serde_json::to_writer_pretty(&file, self).map_err(|err| ConfigError::Serialize {
            path: path.to_owned(),
            source: err,
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.pause_timeout(), None);
        assert_eq!(config.event_retry_interval(), Duration::from_secs(1));
        assert_eq!(
            config.bundle_dir("c1"),
            PathBuf::from("/run/libcontainerd/c1")
        );
    }

    #[test]
    fn test_partial_document() -> Result<()> {
        let config: ClientConfig =
            serde_json::from_str(r#"{"stateDir": "/var/lib/ctd", "pauseTimeoutMs": 250}"#)?;
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/ctd"));
        assert_eq!(config.pause_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.runtime, "runc");
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("client.json");
        let config = ClientConfig {
            runtime_args: vec!["--systemd-cgroup".to_owned()],
            ..Default::default()
        };
        config.save(&path)?;
        assert_eq!(ClientConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_save_failure_is_not_a_parse_error() {
        // writes to /dev/full fail with ENOSPC once the file is open
        let err = ClientConfig::default().save("/dev/full").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Serialize { .. } | ConfigError::Write { .. }
        ));
        assert!(!err.to_string().contains("parse"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load("/nonexistent/client.json").unwrap_err();
        assert!(matches!(err, ConfigError::Open { .. }));
    }
}
