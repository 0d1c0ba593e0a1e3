use async_trait::async_trait;

use crate::auth::RegistryAuth;
use crate::error::EngineError;
use crate::types::{ContainerEntry, ContainerRecord, HealthState};

pub mod docker;
pub use docker::DockerEngine;

/// A newly created container.
#[derive(Debug, Clone)]
pub struct CreatedContainer {
    pub id: String,
    pub warnings: Vec<String>,
}

/// The container-engine capability the updater drives.
///
/// Calls are issued one at a time from a single evaluation loop, so
/// implementations need no internal coordination beyond `Send + Sync`.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Running containers only unless `all` is set; `label` is a
    /// `key` / `key=value` filter.
    async fn list_containers(
        &self,
        all: bool,
        label: Option<&str>,
    ) -> Result<Vec<ContainerEntry>, EngineError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerRecord, EngineError>;

    async fn inspect_health(&self, id: &str) -> Result<HealthState, EngineError>;

    /// Content identity of a local image.
    async fn image_id(&self, reference: &str) -> Result<String, EngineError>;

    /// Pulls `reference` exactly as given (tag or digest).
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), EngineError>;

    /// Stops with the engine's bounded grace period.
    async fn stop_container(&self, id: &str) -> Result<(), EngineError>;

    /// Volumes are always preserved.
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    /// Creates `name` as a clone of `template` running `image_ref`, with
    /// the template's network attachments re-applied.
    async fn create_container(
        &self,
        name: &str,
        template: &ContainerRecord,
        image_ref: &str,
    ) -> Result<CreatedContainer, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), EngineError>;

    /// Non-forced removal that also prunes untagged parents.
    async fn remove_image(&self, id: &str) -> Result<(), EngineError>;
}
