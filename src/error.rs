//! Error types for every layer of the updater.
//!
//! Each layer owns one enum.  Container-level failures are wrapped into
//! [`UpdateError`] at the per-container boundary so a single bad container
//! never aborts the scan of the others.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Invalid settings or an unusable credential store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid duration {0:?} (expected e.g. 30s, 5m, 1h)")]
    InvalidDuration(String),

    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("invalid label selector {0:?}")]
    InvalidSelector(String),

    #[error("unknown log level {0:?}")]
    InvalidLogLevel(String),

    #[error("read credential store {}: {source}", path.display())]
    CredentialStoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse credential store: {0}")]
    CredentialStoreParse(#[from] serde_json::Error),
}

/// A failed call into the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no such object: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Why a single container could not be brought up to date.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("container has an empty image reference")]
    EmptyImageReference,

    #[error("inspect container: {0}")]
    Inspect(#[source] EngineError),

    #[error("pull {reference:?}: {source}")]
    PullFailed {
        reference: String,
        #[source]
        source: EngineError,
    },

    #[error("inspect pulled image {reference:?}: {source}")]
    ImageInspectFailed {
        reference: String,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// A failed step of an update strategy.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("stop: {0}")]
    Stop(#[source] EngineError),

    #[error("remove: {0}")]
    Remove(#[source] EngineError),

    #[error("create: {0}")]
    Create(#[source] EngineError),

    #[error("start: {0}")]
    Start(#[source] EngineError),

    #[error("rolling update: create: {0}")]
    CreateReplacement(#[source] EngineError),

    #[error("rolling update: start: {0}")]
    StartReplacement(#[source] EngineError),

    #[error("rolling update: health check: {0}")]
    Health(#[source] HealthError),

    #[error("rolling update: stop old: {0}")]
    StopOld(#[source] EngineError),

    #[error("rolling update: remove old: {0}")]
    RemoveOld(#[source] EngineError),

    #[error("rolling update: rename: {0}")]
    Rename(#[source] EngineError),
}

impl ExecutorError {
    /// True when the failure happened after the old container was touched
    /// irreversibly: the host needs an operator (or the next cycle) to
    /// reconcile it.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            ExecutorError::Remove(_)
                | ExecutorError::Create(_)
                | ExecutorError::Start(_)
                | ExecutorError::StopOld(_)
                | ExecutorError::RemoveOld(_)
                | ExecutorError::Rename(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("container reported unhealthy")]
    Unhealthy,

    #[error("timeout waiting for healthy after {0:?}")]
    Timeout(Duration),

    #[error("probe: {0}")]
    Probe(#[source] EngineError),
}

/// Cleanup failures never escalate past a log line.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("list containers for cleanup: {0}")]
    List(#[source] EngineError),

    #[error("remove image: {0}")]
    Remove(#[source] EngineError),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram api token set but chat id is missing")]
    MissingChatId,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("telegram status {status}: {body}")]
    Status { status: u16, body: String },
}
