use super::{ContainerEngine, CreatedContainer};
use crate::auth::RegistryAuth;
use crate::error::EngineError;
use crate::types::{ContainerEntry, ContainerRecord, HealthState};
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
    RemoveContainerOptions, RenameContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::models::{ContainerInspectResponse, HealthStatusEnum};
use bollard::Docker;
use futures_util::stream::TryStreamExt;
use log::{debug, info};
use std::collections::HashMap;

/// Grace period handed to the daemon before it kills a stopping container.
const STOP_TIMEOUT_SECS: i64 = 10;

/// [`ContainerEngine`] over the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects with local defaults (unix socket on Linux, `DOCKER_HOST`
    /// when set) and checks the daemon answers.
    pub async fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        let version = docker.version().await?;
        info!(
            "Connected to Docker {} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        );
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(
        &self,
        all: bool,
        label: Option<&str>,
    ) -> Result<Vec<ContainerEntry>, EngineError> {
        let filters: HashMap<String, Vec<String>> = label
            .map(|l| ("label".to_string(), vec![l.to_string()]))
            .into_iter()
            .collect();
        let opts = ListContainersOptions::<String> {
            all,
            filters,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                Some(ContainerEntry {
                    id,
                    name,
                    image_id: c.image_id.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerRecord, EngineError> {
        let detail = self.docker.inspect_container(id, None).await?;
        Ok(ContainerRecord::from(detail))
    }

    async fn inspect_health(&self, id: &str) -> Result<HealthState, EngineError> {
        let detail = self.docker.inspect_container(id, None).await?;
        Ok(health_state(&detail))
    }

    async fn image_id(&self, reference: &str) -> Result<String, EngineError> {
        let image = self.docker.inspect_image(reference).await?;
        Ok(image.id.unwrap_or_default())
    }

    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), EngineError> {
        let opts = CreateImageOptions::<String> {
            from_image: reference.to_string(),
            ..Default::default()
        };
        let credentials = auth.map(|a| DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: Some(a.server_address.clone()),
            ..Default::default()
        });

        // The pull only completes once the progress stream is drained.
        let progress: Vec<_> = self
            .docker
            .create_image(Some(opts), None, credentials)
            .try_collect()
            .await?;
        debug!("Pulled {} ({} progress messages)", reference, progress.len());
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let opts = RemoveContainerOptions {
            force,
            v: false,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(opts)).await?;
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        template: &ContainerRecord,
        image_ref: &str,
    ) -> Result<CreatedContainer, EngineError> {
        let mut config: Config<String> = template.config.clone().into();
        config.image = Some(image_ref.to_string());
        config.host_config = template.host_config.clone();
        // The engine does not infer attachments, so they are passed back
        // explicitly.
        if !template.networks.is_empty() {
            config.networking_config = Some(NetworkingConfig {
                endpoints_config: template.networks.clone(),
            });
        }

        let opts = CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        };
        let created = self.docker.create_container(Some(opts), config).await?;
        Ok(CreatedContainer {
            id: created.id,
            warnings: created.warnings,
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), EngineError> {
        let opts = RenameContainerOptions {
            name: new_name.to_string(),
        };
        self.docker.rename_container(id, opts).await?;
        Ok(())
    }

    async fn remove_image(&self, id: &str) -> Result<(), EngineError> {
        let opts = RemoveImageOptions {
            force: false,
            noprune: false,
        };
        self.docker.remove_image(id, Some(opts), None).await?;
        Ok(())
    }
}

fn health_state(detail: &ContainerInspectResponse) -> HealthState {
    let declared = detail
        .config
        .as_ref()
        .and_then(|c| c.healthcheck.as_ref())
        .and_then(|h| h.test.as_ref())
        .is_some_and(|test| test.first().map(String::as_str) != Some("NONE"));
    if !declared {
        return HealthState::NotConfigured;
    }

    match detail
        .state
        .as_ref()
        .and_then(|s| s.health.as_ref())
        .and_then(|h| h.status.as_ref())
    {
        Some(HealthStatusEnum::HEALTHY) => HealthState::Healthy,
        Some(HealthStatusEnum::UNHEALTHY) => HealthState::Unhealthy,
        Some(HealthStatusEnum::STARTING) => HealthState::Starting,
        _ => HealthState::NotConfigured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState, Health, HealthConfig};

    fn detail(test: Option<Vec<&str>>, status: Option<HealthStatusEnum>) -> ContainerInspectResponse {
        ContainerInspectResponse {
            config: Some(ContainerConfig {
                healthcheck: test.map(|t| HealthConfig {
                    test: Some(t.into_iter().map(String::from).collect()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            state: Some(ContainerState {
                health: status.map(|s| Health {
                    status: Some(s),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn health_without_declared_check_is_not_configured() {
        assert_eq!(health_state(&detail(None, None)), HealthState::NotConfigured);
        assert_eq!(
            health_state(&detail(Some(vec!["NONE"]), Some(HealthStatusEnum::HEALTHY))),
            HealthState::NotConfigured
        );
    }

    #[test]
    fn health_status_is_mapped() {
        let check = || Some(vec!["CMD", "curl", "-f", "http://localhost"]);
        assert_eq!(
            health_state(&detail(check(), Some(HealthStatusEnum::STARTING))),
            HealthState::Starting
        );
        assert_eq!(
            health_state(&detail(check(), Some(HealthStatusEnum::HEALTHY))),
            HealthState::Healthy
        );
        assert_eq!(
            health_state(&detail(check(), Some(HealthStatusEnum::UNHEALTHY))),
            HealthState::Unhealthy
        );
        assert_eq!(health_state(&detail(check(), None)), HealthState::NotConfigured);
    }
}
