//! In-memory engine and notifier for tests.
//!
//! Exposed from the library so the integration tests in `tests/` can
//! drive full cycles without a Docker daemon.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::models::{ContainerConfig, HealthConfig, HostConfig};

use crate::auth::RegistryAuth;
use crate::error::{EngineError, NotifyError};
use crate::notify::Notifier;
use crate::runtime::{ContainerEngine, CreatedContainer};
use crate::selector::LabelSelector;
use crate::types::{ContainerEntry, ContainerRecord, HealthState};

#[derive(Debug, Clone)]
struct MockContainer {
    record: ContainerRecord,
    running: bool,
}

#[derive(Debug, Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    /// Local images: reference -> identity.
    local: HashMap<String, String>,
    /// What a pull of a reference yields.
    remote: HashMap<String, String>,
    health: HashMap<String, VecDeque<HealthState>>,
    /// `op` or `op:target` -> error message.
    fail_on: HashMap<String, String>,
    fail_list: bool,
    calls: Vec<String>,
    pull_auth: Vec<Option<RegistryAuth>>,
    next_id: usize,
}

impl MockState {
    fn find(&self, id_or_name: &str) -> Option<&String> {
        self.containers
            .iter()
            .find(|(id, c)| id.as_str() == id_or_name || c.record.name == id_or_name)
            .map(|(id, _)| id)
    }

    fn name_of(&self, id: &str) -> String {
        self.containers
            .get(id)
            .map(|c| c.record.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn check(&mut self, op: &str, target: &str) -> Result<(), EngineError> {
        self.calls.push(format!("{op}:{target}"));
        let message = self
            .fail_on
            .get(&format!("{op}:{target}"))
            .or_else(|| self.fail_on.get(op));
        match message {
            Some(message) => Err(EngineError::Other(message.clone())),
            None => Ok(()),
        }
    }
}

/// Fluent description of a container to seed the mock with.
#[derive(Debug, Clone)]
pub struct MockContainerSpec {
    name: String,
    image_ref: String,
    image_id: String,
    labels: HashMap<String, String>,
    host_config: Option<HostConfig>,
    healthcheck: bool,
    running: bool,
}

impl MockContainerSpec {
    pub fn new(name: &str, image_ref: &str, image_id: &str) -> Self {
        Self {
            name: name.to_string(),
            image_ref: image_ref.to_string(),
            image_id: image_id.to_string(),
            labels: HashMap::new(),
            host_config: Some(HostConfig::default()),
            healthcheck: false,
            running: true,
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn host_config(mut self, host_config: Option<HostConfig>) -> Self {
        self.host_config = host_config;
        self
    }

    pub fn healthcheck(mut self) -> Self {
        self.healthcheck = true;
        self
    }

    pub fn stopped(mut self) -> Self {
        self.running = false;
        self
    }
}

#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a container and returns its id.
    pub fn add_container(&self, spec: MockContainerSpec) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("ctr{:04}", state.next_id);
        state
            .local
            .entry(spec.image_ref.clone())
            .or_insert_with(|| spec.image_id.clone());
        let config = ContainerConfig {
            image: Some(spec.image_ref.clone()),
            labels: Some(spec.labels),
            healthcheck: spec.healthcheck.then(|| HealthConfig {
                test: Some(vec!["CMD".into(), "true".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let record = ContainerRecord {
            id: id.clone(),
            name: spec.name,
            image_ref: spec.image_ref,
            image_id: spec.image_id,
            config,
            host_config: spec.host_config,
            networks: HashMap::new(),
        };
        state.containers.insert(
            id.clone(),
            MockContainer {
                record,
                running: spec.running,
            },
        );
        id
    }

    /// Makes a pull of `reference` yield `image_id`.
    pub fn publish(&self, reference: &str, image_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.remote.insert(reference.to_string(), image_id.to_string());
    }

    /// Scripts health answers for the container named `name`; once the
    /// script runs out the last answer repeats.
    pub fn script_health(&self, name: &str, answers: &[HealthState]) {
        let mut state = self.state.lock().unwrap();
        state
            .health
            .insert(name.to_string(), answers.iter().copied().collect());
    }

    /// Fails `op` (e.g. `"start"`) or `op:name` (e.g. `"start:web.next"`).
    pub fn fail_on(&self, op: &str) {
        self.fail_with(op, &format!("mock failure on {op}"));
    }

    /// Like [`fail_on`](Self::fail_on) with a chosen error message.
    pub fn fail_with(&self, op: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_on
            .insert(op.to_string(), message.to_string());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    /// Drops every injected failure, listing included.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_on.clear();
        state.fail_list = false;
    }

    /// Every mutating or probing call as `op:name`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls filtered to the container lifecycle and image removal.
    pub fn lifecycle_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                ["stop:", "remove:", "create:", "start:", "rename:", "remove_image:"]
                    .iter()
                    .any(|p| c.starts_with(p))
            })
            .collect()
    }

    pub fn pull_auth(&self) -> Vec<Option<RegistryAuth>> {
        self.state.lock().unwrap().pull_auth.clone()
    }

    pub fn container(&self, name: &str) -> Option<ContainerRecord> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .find(|c| c.record.name == name)
            .map(|c| c.record.clone())
    }

    pub fn is_running(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .any(|c| c.record.name == name && c.running)
    }

    pub fn container_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<_> = state
            .containers
            .values()
            .map(|c| c.record.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn list_containers(
        &self,
        all: bool,
        label: Option<&str>,
    ) -> Result<Vec<ContainerEntry>, EngineError> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(EngineError::Other("mock failure on list".into()));
        }
        let selector = match label {
            Some(l) => Some(
                l.parse::<LabelSelector>()
                    .map_err(|e| EngineError::Other(e.to_string()))?,
            ),
            None => None,
        };
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| all || c.running)
            .filter(|(_, c)| {
                selector
                    .as_ref()
                    .map_or(true, |s| s.matches(c.record.labels()))
            })
            .map(|(id, c)| ContainerEntry {
                id: id.clone(),
                name: c.record.name.clone(),
                image_id: c.record.image_id.clone(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerRecord, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.check("inspect", id)?;
        let key = state
            .find(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        Ok(state.containers[&key].record.clone())
    }

    async fn inspect_health(&self, id: &str) -> Result<HealthState, EngineError> {
        let mut state = self.state.lock().unwrap();
        let name = state.name_of(id);
        state.check("health", &name)?;
        let declared = state
            .containers
            .get(id)
            .is_some_and(|c| c.record.config.healthcheck.is_some());
        if !declared {
            return Ok(HealthState::NotConfigured);
        }
        let Some(script) = state.health.get_mut(&name) else {
            return Ok(HealthState::Healthy);
        };
        let answer = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        Ok(answer.unwrap_or(HealthState::Starting))
    }

    async fn image_id(&self, reference: &str) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.check("image_inspect", reference)?;
        state
            .local
            .get(reference)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(reference.to_string()))
    }

    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.check("pull", reference)?;
        state.pull_auth.push(auth.cloned());
        if let Some(id) = state.remote.get(reference).cloned() {
            state.local.insert(reference.to_string(), id);
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let name = state.name_of(id);
        state.check("stop", &name)?;
        match state.containers.get_mut(id) {
            Some(c) => {
                c.running = false;
                Ok(())
            }
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let name = state.name_of(id);
        state.check("remove", &name)?;
        match state.containers.get(id) {
            Some(c) if c.running && !force => Err(EngineError::Other(format!(
                "cannot remove running container {name}"
            ))),
            Some(_) => {
                state.containers.remove(id);
                Ok(())
            }
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    async fn create_container(
        &self,
        name: &str,
        template: &ContainerRecord,
        image_ref: &str,
    ) -> Result<CreatedContainer, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.check("create", name)?;
        if state.containers.values().any(|c| c.record.name == name) {
            return Err(EngineError::Other(format!(
                "Conflict. The container name \"/{name}\" is already in use"
            )));
        }
        state.next_id += 1;
        let id = format!("ctr{:04}", state.next_id);
        let mut record = template.clone();
        record.id = id.clone();
        record.name = name.to_string();
        record.image_ref = image_ref.to_string();
        record.config.image = Some(image_ref.to_string());
        record.image_id = state.local.get(image_ref).cloned().unwrap_or_default();
        state.containers.insert(
            id.clone(),
            MockContainer {
                record,
                running: false,
            },
        );
        Ok(CreatedContainer {
            id,
            warnings: Vec::new(),
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let name = state.name_of(id);
        state.check("start", &name)?;
        match state.containers.get_mut(id) {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let name = state.name_of(id);
        state.check("rename", &format!("{name}->{new_name}"))?;
        match state.containers.get_mut(id) {
            Some(c) => {
                c.record.name = new_name.to_string();
                Ok(())
            }
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    async fn remove_image(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.check("remove_image", id)?;
        state.local.retain(|_, image| image != id);
        Ok(())
    }
}

/// Records every message instead of sending it.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(NotifyError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(())
    }
}
