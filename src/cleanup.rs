//! Removal of images superseded by an update.

use std::fmt;

use crate::error::CleanupError;
use crate::runtime::ContainerEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupVerdict {
    Removed,
    /// Some container on the host, running or not, still uses the image.
    InUse,
    EmptyIdentity,
}

impl CleanupVerdict {
    pub fn removed(&self) -> bool {
        matches!(self, CleanupVerdict::Removed)
    }
}

impl fmt::Display for CleanupVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CleanupVerdict::Removed => "old image unused",
            CleanupVerdict::InUse => "old image still in use",
            CleanupVerdict::EmptyIdentity => "empty image id",
        })
    }
}

/// Removes `old_image_id` unless any container on the host still
/// references it, including stopped and unmanaged ones.
pub async fn maybe_remove(
    engine: &dyn ContainerEngine,
    old_image_id: &str,
) -> Result<CleanupVerdict, CleanupError> {
    let old_image_id = old_image_id.trim();
    if old_image_id.is_empty() {
        return Ok(CleanupVerdict::EmptyIdentity);
    }

    let containers = engine
        .list_containers(true, None)
        .await
        .map_err(CleanupError::List)?;
    if containers.iter().any(|c| c.image_id == old_image_id) {
        return Ok(CleanupVerdict::InUse);
    }

    engine
        .remove_image(old_image_id)
        .await
        .map_err(CleanupError::Remove)?;
    Ok(CleanupVerdict::Removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockContainerSpec, MockEngine};

    #[tokio::test]
    async fn stopped_container_pins_old_image() {
        let engine = MockEngine::new();
        engine.add_container(MockContainerSpec::new("web", "nginx:latest", "sha256:def456"));
        engine.add_container(
            MockContainerSpec::new("web-backup", "nginx:1.25", "sha256:abc123").stopped(),
        );

        let verdict = maybe_remove(&engine, "sha256:abc123").await.unwrap();
        assert_eq!(verdict, CleanupVerdict::InUse);
        assert!(!verdict.removed());
        assert!(engine.lifecycle_calls().is_empty());
    }

    #[tokio::test]
    async fn unreferenced_image_is_removed() {
        let engine = MockEngine::new();
        engine.add_container(MockContainerSpec::new("web", "nginx:latest", "sha256:def456"));

        let verdict = maybe_remove(&engine, "sha256:abc123").await.unwrap();
        assert!(verdict.removed());
        assert_eq!(engine.lifecycle_calls(), vec!["remove_image:sha256:abc123"]);
    }

    #[tokio::test]
    async fn empty_identity_is_skipped() {
        let engine = MockEngine::new();
        let verdict = maybe_remove(&engine, "  ").await.unwrap();
        assert_eq!(verdict, CleanupVerdict::EmptyIdentity);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn listing_and_removal_failures_surface_as_errors() {
        let engine = MockEngine::new();
        engine.fail_on("remove_image");
        let err = maybe_remove(&engine, "sha256:abc123").await.unwrap_err();
        assert!(matches!(err, CleanupError::Remove(_)));

        let engine = MockEngine::new();
        engine.fail_listing();
        let err = maybe_remove(&engine, "sha256:abc123").await.unwrap_err();
        assert!(matches!(err, CleanupError::List(_)));
    }
}
