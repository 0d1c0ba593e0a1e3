//! Data structures used throughout the updater.
//!
//! Nothing here is persisted.  Container records are rebuilt from the
//! live engine on every cycle and outcomes are consumed as soon as the
//! cycle summary has been aggregated.

use std::collections::HashMap;
use std::fmt;

use bollard::models::{ContainerConfig, ContainerInspectResponse, EndpointSettings, HostConfig};

use crate::classify::is_transient;
use crate::error::UpdateError;

/// Trims the `sha256:` prefix and truncates to 12 characters.
pub fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

pub fn short_name(name: &str) -> &str {
    match name.trim_start_matches('/') {
        "" => "<noname>",
        n => n,
    }
}

/// Short, human-oriented handle used to prefix log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub name: String,
    pub id: String,
}

impl ContainerRef {
    pub fn new(name: &str, id: &str) -> Self {
        Self {
            name: short_name(name).to_string(),
            id: short_id(id).to_string(),
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "[{}]", self.name)
        } else {
            write!(f, "[{} {}]", self.name, self.id)
        }
    }
}

/// One row of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub id: String,
    pub name: String,
    pub image_id: String,
}

impl ContainerEntry {
    pub fn reference(&self) -> ContainerRef {
        ContainerRef::new(&self.name, &self.id)
    }
}

/// Snapshot of an inspected container: identity, the image it was
/// launched with and everything needed to create an identical twin.
#[derive(Debug, Clone, Default)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    /// Reference the container was launched with (tag or digest).
    pub image_ref: String,
    /// Content identity of the image currently backing the container.
    /// Empty when the engine did not report one.
    pub image_id: String,
    pub config: ContainerConfig,
    pub host_config: Option<HostConfig>,
    pub networks: HashMap<String, EndpointSettings>,
}

impl ContainerRecord {
    pub fn reference(&self) -> ContainerRef {
        ContainerRef::new(&self.name, &self.id)
    }

    pub fn labels(&self) -> Option<&HashMap<String, String>> {
        self.config.labels.as_ref()
    }

    pub fn host_network(&self) -> bool {
        self.host_config
            .as_ref()
            .and_then(|h| h.network_mode.as_deref())
            == Some("host")
    }

    pub fn publishes_all_ports(&self) -> bool {
        self.host_config
            .as_ref()
            .and_then(|h| h.publish_all_ports)
            .unwrap_or(false)
    }

    pub fn has_port_bindings(&self) -> bool {
        self.host_config
            .as_ref()
            .and_then(|h| h.port_bindings.as_ref())
            .is_some_and(|b| !b.is_empty())
    }
}

impl From<ContainerInspectResponse> for ContainerRecord {
    fn from(detail: ContainerInspectResponse) -> Self {
        let config = detail.config.unwrap_or_default();
        let networks = detail
            .network_settings
            .and_then(|s| s.networks)
            .unwrap_or_default();
        Self {
            id: detail.id.unwrap_or_default(),
            name: detail
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image_ref: config.image.clone().unwrap_or_default(),
            image_id: detail.image.unwrap_or_default(),
            config,
            host_config: detail.host_config,
            networks,
        }
    }
}

/// Health of a freshly started container as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// No healthcheck declared, or the engine reports no health data.
    NotConfigured,
    Starting,
    Healthy,
    Unhealthy,
}

/// Result of processing one container during a cycle.
#[derive(Debug)]
pub enum UpdateOutcome {
    NoUpdate,
    Updated { new_image_id: String },
    Failed { error: UpdateError, transient: bool },
}

impl UpdateOutcome {
    pub fn failed(error: UpdateError) -> Self {
        let transient = is_transient(&error);
        Self::Failed { error, transient }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{NetworkSettings, PortBinding};

    #[test]
    fn short_id_strips_prefix_and_truncates() {
        assert_eq!(short_id("sha256:0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc123"), "abc123");
        assert_eq!(short_id(""), "");
    }

    #[test]
    fn short_name_handles_slash_and_empty() {
        assert_eq!(short_name("/web"), "web");
        assert_eq!(short_name(""), "<noname>");
    }

    #[test]
    fn record_from_inspect_keeps_runtime_snapshot() {
        let detail = ContainerInspectResponse {
            id: Some("c0ffee".into()),
            name: Some("/web".into()),
            image: Some("sha256:abc123".into()),
            config: Some(ContainerConfig {
                image: Some("nginx:latest".into()),
                env: Some(vec!["A=1".into()]),
                ..Default::default()
            }),
            host_config: Some(HostConfig {
                port_bindings: Some(HashMap::from([(
                    "80/tcp".to_string(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some("8080".into()),
                    }]),
                )])),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(HashMap::from([(
                    "frontend".to_string(),
                    EndpointSettings::default(),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let record = ContainerRecord::from(detail);
        assert_eq!(record.name, "web");
        assert_eq!(record.image_ref, "nginx:latest");
        assert_eq!(record.image_id, "sha256:abc123");
        assert!(record.has_port_bindings());
        assert!(!record.host_network());
        assert!(record.networks.contains_key("frontend"));
        assert_eq!(record.reference().to_string(), "[web c0ffee]");
    }
}
