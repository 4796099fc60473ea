//! Process-wide logging for the teleop binaries.
//!
//! Events go to stderr, to a log file, or both. Levels come from `RUST_LOG`
//! and fall back to [DEFAULT_LOG_FILTER]. Timestamps are ISO 8601 in the
//! local UTC offset at startup.

use std::path::{Path, PathBuf};
use std::time::Instant;

use time::{format_description::well_known::Iso8601, UtcOffset};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("local UTC offset out of range: {source}")]
    Offset {
        #[from]
        source: time::error::ComponentRange,
    },
    #[error("creating log file {}: {source}", path.display())]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled {
        #[from]
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

type Timer = OffsetTime<Iso8601>;

/// Keeps logging open. Dropping it records how long the process logged.
#[must_use = "logging ends when the guard is dropped"]
pub struct LogGuard {
    file: Option<PathBuf>,
    started: Instant,
}

impl LogGuard {
    /// The log file, if events are written to one.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        match &self.file {
            Some(path) => tracing::debug!("closing log {} after {elapsed:.1?}", path.display()),
            None => tracing::debug!("logging ends after {elapsed:.1?}"),
        }
    }
}

/// Where log events go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogTargets {
    /// Plain text log file, truncated when logging starts.
    pub file: Option<PathBuf>,
    /// Suppress console output on stderr.
    pub quiet: bool,
}

impl LogTargets {
    /// Console only.
    pub fn console() -> Self {
        Self::default()
    }

    /// Console and, if given, a log file.
    pub fn with_file<P: AsRef<Path>>(path: Option<P>) -> Self {
        Self {
            file: path.map(|p| p.as_ref().to_path_buf()),
            quiet: false,
        }
    }
}

/// Timer in the fixed UTC offset of the local timezone right now.
fn local_timer() -> Result<Timer> {
    let offset = UtcOffset::from_whole_seconds(chrono::Local::now().offset().local_minus_utc())?;
    Ok(OffsetTime::new(offset, Iso8601::DEFAULT))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn install(targets: &LogTargets) -> Result<LogGuard> {
    let timer = local_timer()?;

    let file_layer = match &targets.file {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| Error::CreateFile {
                path: path.clone(),
                source,
            })?;
            Some(
                fmt::layer()
                    .with_timer(timer.clone())
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    let console_layer = (!targets.quiet).then(|| {
        fmt::layer()
            .with_timer(timer)
            .with_writer(std::io::stderr)
            .with_ansi(!cfg!(windows))
    });

    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter());
    tracing::subscriber::set_global_default(subscriber)?;

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    if let Some(path) = &targets.file {
        tracing::debug!("logging to {} with filter \"{rust_log}\"", path.display());
    }

    Ok(LogGuard {
        file: targets.file.clone(),
        started: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_timer() {
        local_timer().unwrap();
    }

    #[test]
    fn test_unwritable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let targets = LogTargets::with_file(Some(dir.path().join("missing").join("teleop.log")));
        assert!(matches!(install(&targets), Err(Error::CreateFile { .. })));
    }

    // The only test that installs a subscriber in this process.
    #[test]
    fn test_install_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teleop.log");
        let guard = install(&LogTargets {
            file: Some(path.clone()),
            quiet: true,
        })
        .unwrap();
        assert_eq!(guard.file(), Some(path.as_path()));
        tracing::warn!("written to the file");

        assert!(matches!(
            install(&LogTargets::console()),
            Err(Error::AlreadyInstalled { .. })
        ));

        drop(guard);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("written to the file"), "{contents}");
        assert!(contents.contains("WARN"));
    }
}
