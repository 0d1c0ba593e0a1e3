//! Change detection for a single container.
//!
//! The image identity is the only compared quantity.  If a registry
//! repoints a mutable tag back to an older image the container follows it.

use log::{debug, info};

use crate::auth::CredentialIndex;
use crate::error::UpdateError;
use crate::runtime::ContainerEngine;
use crate::types::{short_id, ContainerRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    UpToDate,
    UpdateAvailable {
        old_image_id: String,
        new_image_id: String,
    },
}

/// Empty identities are treated as "unknown" and never trigger an update.
pub fn needs_update(old_image_id: &str, new_image_id: &str) -> bool {
    !old_image_id.is_empty() && !new_image_id.is_empty() && old_image_id != new_image_id
}

/// Pulls the container's configured reference and compares identities.
pub async fn evaluate(
    engine: &dyn ContainerEngine,
    credentials: &CredentialIndex,
    record: &ContainerRecord,
) -> Result<Decision, UpdateError> {
    let ctr = record.reference();
    let image_ref = record.image_ref.as_str();
    if image_ref.is_empty() {
        return Err(UpdateError::EmptyImageReference);
    }

    let old_image_id = if record.image_id.is_empty() {
        engine.image_id(image_ref).await.unwrap_or_default()
    } else {
        record.image_id.clone()
    };

    debug!("{} checking for updates ({})", ctr, image_ref);
    let auth = credentials.resolve_for(image_ref);
    if let Some(auth) = auth {
        debug!("{} pulling with credentials for {}", ctr, auth.server_address);
    }
    engine
        .pull_image(image_ref, auth)
        .await
        .map_err(|source| UpdateError::PullFailed {
            reference: image_ref.to_string(),
            source,
        })?;

    let new_image_id =
        engine
            .image_id(image_ref)
            .await
            .map_err(|source| UpdateError::ImageInspectFailed {
                reference: image_ref.to_string(),
                source,
            })?;

    if !needs_update(&old_image_id, &new_image_id) {
        debug!("{} no update", ctr);
        return Ok(Decision::UpToDate);
    }

    info!(
        "{} update available {} ({} -> {})",
        ctr,
        image_ref,
        short_id(&old_image_id),
        short_id(&new_image_id)
    );
    Ok(Decision::UpdateAvailable {
        old_image_id,
        new_image_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockContainerSpec, MockEngine};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn update_iff_both_known_and_different(old in "[a-f0-9]{0,3}", new in "[a-f0-9]{0,3}") {
            let expected = !old.is_empty() && !new.is_empty() && old != new;
            prop_assert_eq!(needs_update(&old, &new), expected);
        }
    }

    #[test]
    fn empty_identity_edge_cases() {
        assert!(!needs_update("", ""));
        assert!(!needs_update("", "sha256:def456"));
        assert!(!needs_update("sha256:abc123", ""));
        assert!(!needs_update("sha256:abc123", "sha256:abc123"));
        assert!(needs_update("sha256:abc123", "sha256:def456"));
    }

    async fn record_for(engine: &MockEngine, id: &str) -> ContainerRecord {
        engine.inspect_container(id).await.unwrap()
    }

    #[tokio::test]
    async fn newer_identity_is_detected() {
        let engine = MockEngine::new();
        let id = engine.add_container(MockContainerSpec::new("web", "nginx:latest", "sha256:abc123"));
        engine.publish("nginx:latest", "sha256:def456");

        let record = record_for(&engine, &id).await;
        let decision = evaluate(&engine, &CredentialIndex::default(), &record)
            .await
            .unwrap();
        assert_eq!(
            decision,
            Decision::UpdateAvailable {
                old_image_id: "sha256:abc123".into(),
                new_image_id: "sha256:def456".into(),
            }
        );
        assert!(engine.calls().contains(&"pull:nginx:latest".to_string()));
    }

    #[tokio::test]
    async fn same_identity_is_up_to_date() {
        let engine = MockEngine::new();
        let id = engine.add_container(MockContainerSpec::new("web", "nginx:latest", "sha256:abc123"));
        engine.publish("nginx:latest", "sha256:abc123");

        let record = record_for(&engine, &id).await;
        let decision = evaluate(&engine, &CredentialIndex::default(), &record)
            .await
            .unwrap();
        assert_eq!(decision, Decision::UpToDate);
    }

    #[tokio::test]
    async fn missing_container_identity_falls_back_to_image_inspect() {
        let engine = MockEngine::new();
        let id = engine.add_container(MockContainerSpec::new("web", "nginx:latest", "sha256:abc123"));
        engine.publish("nginx:latest", "sha256:def456");

        let mut record = record_for(&engine, &id).await;
        record.image_id.clear();
        let decision = evaluate(&engine, &CredentialIndex::default(), &record)
            .await
            .unwrap();
        assert!(matches!(decision, Decision::UpdateAvailable { old_image_id, .. } if old_image_id == "sha256:abc123"));
    }

    #[tokio::test]
    async fn unknown_old_identity_is_conservative() {
        let engine = MockEngine::new();
        let id = engine.add_container(MockContainerSpec::new("web", "nginx:latest", ""));
        engine.publish("nginx:latest", "sha256:def456");

        let record = record_for(&engine, &id).await;
        let decision = evaluate(&engine, &CredentialIndex::default(), &record)
            .await
            .unwrap();
        assert_eq!(decision, Decision::UpToDate);
    }

    #[tokio::test]
    async fn empty_reference_is_rejected_before_pulling() {
        let engine = MockEngine::new();
        let record = ContainerRecord {
            name: "web".into(),
            ..Default::default()
        };
        let err = evaluate(&engine, &CredentialIndex::default(), &record)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::EmptyImageReference));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn pull_and_inspect_failures_are_classified() {
        let engine = MockEngine::new();
        let id = engine.add_container(MockContainerSpec::new("web", "nginx:latest", "sha256:abc123"));
        let record = record_for(&engine, &id).await;

        engine.fail_on("pull");
        let err = evaluate(&engine, &CredentialIndex::default(), &record)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::PullFailed { .. }));

        let engine = MockEngine::new();
        let id = engine.add_container(MockContainerSpec::new("web", "nginx:latest", "sha256:abc123"));
        let record = record_for(&engine, &id).await;
        engine.fail_on("image_inspect");
        let err = evaluate(&engine, &CredentialIndex::default(), &record)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::ImageInspectFailed { .. }));
    }

    #[tokio::test]
    async fn credentials_are_passed_to_the_pull() {
        let engine = MockEngine::new();
        let id = engine.add_container(MockContainerSpec::new(
            "app",
            "ghcr.io/acme/app:1",
            "sha256:abc123",
        ));
        let record = record_for(&engine, &id).await;
        // "dTpw" is base64 for "u:p".
        let index =
            CredentialIndex::parse(r#"{"auths": {"https://ghcr.io": {"auth": "dTpw"}}}"#).unwrap();

        evaluate(&engine, &index, &record).await.unwrap();
        let auth = engine.pull_auth().pop().flatten().expect("authenticated pull");
        assert_eq!(auth.username, "u");
        assert_eq!(auth.server_address, "https://ghcr.io");
    }
}
