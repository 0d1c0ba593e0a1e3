//! Transient vs. permanent failure classification.
//!
//! Only used to keep network hiccups out of notifications.  It never
//! drives a retry; the next scheduled cycle is the only retry.

use std::error::Error;
use std::io::ErrorKind;

use crate::error::EngineError;

const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "canceled",
    "cancelled",
    "tls handshake",
    "connection refused",
    "connection reset",
    "connection aborted",
    "no such host",
    "temporary failure in name resolution",
    "failed to lookup address",
    "network is unreachable",
    "host is unreachable",
];

/// Walks the whole source chain: structured kinds first, message text
/// second.
pub fn is_transient(err: &(dyn Error + 'static)) -> bool {
    let mut chain = Some(err);
    while let Some(e) = chain {
        if transient_kind(e) {
            return true;
        }
        chain = e.source();
    }

    let mut chain = Some(err);
    while let Some(e) = chain {
        let msg = e.to_string().to_lowercase();
        if TRANSIENT_PATTERNS.iter().any(|p| msg.contains(p)) {
            return true;
        }
        chain = e.source();
    }
    false
}

fn transient_kind(e: &(dyn Error + 'static)) -> bool {
    // EngineError is transparent, so its wrapped error never shows up as a
    // link of its own in the source chain.
    if let Some(engine) = e.downcast_ref::<EngineError>() {
        return match engine {
            EngineError::Io(io) => transient_io(io),
            EngineError::Docker(docker) => transient_docker(docker),
            EngineError::NotFound(_) | EngineError::Other(_) => false,
        };
    }
    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return transient_io(io);
    }
    if let Some(docker) = e.downcast_ref::<bollard::errors::Error>() {
        return transient_docker(docker);
    }
    if e.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return true;
    }
    if let Some(http) = e.downcast_ref::<reqwest::Error>() {
        return http.is_timeout() || http.is_connect();
    }
    false
}

fn transient_io(io: &std::io::Error) -> bool {
    matches!(
        io.kind(),
        ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
    )
}

fn transient_docker(docker: &bollard::errors::Error) -> bool {
    match docker {
        bollard::errors::Error::RequestTimeoutError => true,
        bollard::errors::Error::IOError { err } => transient_io(err),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutorError, UpdateError};
    use std::time::Duration;

    fn pull_failed(source: EngineError) -> UpdateError {
        UpdateError::PullFailed {
            reference: "nginx:latest".into(),
            source,
        }
    }

    #[test]
    fn structured_io_kinds_are_transient() {
        let err = pull_failed(EngineError::Io(std::io::Error::new(
            ErrorKind::ConnectionReset,
            "peer went away",
        )));
        assert!(is_transient(&err));
    }

    #[test]
    fn permanent_io_kind_is_not_transient() {
        let err = pull_failed(EngineError::Io(std::io::Error::new(
            ErrorKind::PermissionDenied,
            "denied",
        )));
        assert!(!is_transient(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_transient() {
        let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(is_transient(&elapsed));
    }

    #[test]
    fn bollard_request_timeout_is_transient() {
        let err = pull_failed(EngineError::Docker(
            bollard::errors::Error::RequestTimeoutError,
        ));
        assert!(is_transient(&err));
    }

    #[test]
    fn message_patterns_are_matched_case_insensitively() {
        for msg in [
            "Get https://registry-1.docker.io/v2/: net/http: TLS handshake timeout",
            "dial tcp: lookup ghcr.io: Temporary failure in name resolution",
            "read tcp 10.0.0.2:443: connection reset by peer",
            "request canceled while waiting for connection",
        ] {
            let err = pull_failed(EngineError::Other(msg.into()));
            assert!(is_transient(&err), "{msg}");
        }
    }

    #[test]
    fn registry_rejections_are_permanent() {
        let err = pull_failed(EngineError::Other(
            "pull access denied for private/app, repository does not exist".into(),
        ));
        assert!(!is_transient(&err));
        assert!(!is_transient(&UpdateError::EmptyImageReference));
        let err = UpdateError::from(ExecutorError::Create(EngineError::Other(
            "Conflict. The container name \"/web\" is already in use".into(),
        )));
        assert!(!is_transient(&err));
    }
}
