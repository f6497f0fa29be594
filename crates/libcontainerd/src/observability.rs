//! Logging setup for processes embedding the client
use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";

#[derive(Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "debug";

#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "error";

fn detect_log_format(log_format: Option<&str>) -> Result<LogFormat> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(LogFormat::Text),
        Some(LOG_FORMAT_JSON) => Ok(LogFormat::Json),
        Some(unknown) => bail!("unknown log format: {}", unknown),
    }
}

fn detect_log_level(input: Option<&str>, is_debug: bool) -> Result<Level> {
    // an explicit level wins over the debug flag
    let log_level: Cow<str> = match input {
        None if is_debug => "debug".into(),
        None => DEFAULT_LOG_LEVEL.into(),
        Some(level) => level.into(),
    };

    Ok(Level::from_str(log_level.as_ref())?)
}

#[derive(Debug, Default, Clone)]
pub struct ObservabilityConfig {
    pub log_debug_flag: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<String>,
}

/// Installs the global tracing subscriber. The level applies to this crate;
/// `RUST_LOG` directives, when set, are added on top.
pub fn init<T>(config: T) -> Result<()>
where
    T: Into<ObservabilityConfig>,
{
    let config = config.into();
    let level = detect_log_level(config.log_level.as_deref(), config.log_debug_flag)
        .context("failed to parse log level")?;
    let log_format =
        detect_log_format(config.log_format.as_deref()).context("failed to detect log format")?;

    let mut filter = EnvFilter::from_default_env().add_directive(
        format!("libcontainerd={}", level.as_str().to_ascii_lowercase())
            .parse()
            .context("failed to build log filter")?,
    );
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        filter = filter.add_directive(tracing_subscriber::filter::LevelFilter::from(level).into());
    }
    let subscriber = tracing_subscriber::registry().with(filter);

    match (config.log_file.as_ref(), log_format) {
        (None, LogFormat::Text) => subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        (None, LogFormat::Json) => subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        (Some(path), format) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path:?}"))?;
            match format {
                LogFormat::Text => subscriber
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_writer(file),
                    )
                    .try_init(),
                LogFormat::Json => subscriber
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .flatten_event(true)
                            .with_span_list(false)
                            .with_writer(file),
                    )
                    .try_init(),
            }
        }
    }
    .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;

    Ok(())
}
