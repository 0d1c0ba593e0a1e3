//! The two update strategies.
//!
//! Recreate: `Running(old) -> Stopped(old) -> Removed(old) -> Created(new)
//! -> Running(new)`.  Once the old container is removed there is no way
//! back; failures from there on are reported as needing attention.
//!
//! Rolling: `Running(old) -> Created(new, <name>.next) -> Started(new) ->
//! Healthy(new) -> Stopped(old) -> Removed(old) -> Renamed(new -> <name>)`.
//! The old container is untouched until the replacement is running and
//! healthy.  Failures in the stop/remove/rename tail leave both containers
//! on the host and are surfaced, not reconciled.

use std::time::Duration;

use log::{info, warn};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::error::{ExecutorError, HealthError};
use crate::policy::Strategy;
use crate::runtime::ContainerEngine;
use crate::types::{ContainerRecord, ContainerRef, HealthState};

/// Suffix of the temporary name used during a rolling replacement.
pub const ROLLING_SUFFIX: &str = ".next";

/// Bounds of the post-start health wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthWait {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for HealthWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
        }
    }
}

impl Strategy {
    /// Moves `current` onto `image_ref` and returns the id of the container
    /// now running under the original name.
    pub async fn execute(
        &self,
        engine: &dyn ContainerEngine,
        current: &ContainerRecord,
        image_ref: &str,
        health: &HealthWait,
    ) -> Result<String, ExecutorError> {
        match self {
            Strategy::Recreate => recreate(engine, current, image_ref).await,
            Strategy::Rolling => rolling(engine, current, image_ref, health).await,
        }
    }
}

async fn recreate(
    engine: &dyn ContainerEngine,
    current: &ContainerRecord,
    image_ref: &str,
) -> Result<String, ExecutorError> {
    let old = current.reference();

    info!("{} stopping container", old);
    engine
        .stop_container(&current.id)
        .await
        .map_err(ExecutorError::Stop)?;

    info!("{} removing container", old);
    engine
        .remove_container(&current.id, false)
        .await
        .map_err(ExecutorError::Remove)?;

    info!("{} creating container", ContainerRef::new(&current.name, ""));
    let created = engine
        .create_container(&current.name, current, image_ref)
        .await
        .map_err(ExecutorError::Create)?;
    let new = ContainerRef::new(&current.name, &created.id);
    if !created.warnings.is_empty() {
        warn!("{} create warnings: {:?}", new, created.warnings);
    }

    info!("{} starting container", new);
    engine
        .start_container(&created.id)
        .await
        .map_err(ExecutorError::Start)?;

    info!("{} updated successfully", new);
    Ok(created.id)
}

async fn rolling(
    engine: &dyn ContainerEngine,
    current: &ContainerRecord,
    image_ref: &str,
    health: &HealthWait,
) -> Result<String, ExecutorError> {
    let old = current.reference();
    let temp_name = format!("{}{}", current.name, ROLLING_SUFFIX);

    info!("{} creating new container", ContainerRef::new(&temp_name, ""));
    let created = engine
        .create_container(&temp_name, current, image_ref)
        .await
        .map_err(ExecutorError::CreateReplacement)?;
    let new = ContainerRef::new(&temp_name, &created.id);
    if !created.warnings.is_empty() {
        warn!("{} create warnings: {:?}", new, created.warnings);
    }

    info!("{} starting new container", new);
    if let Err(e) = engine.start_container(&created.id).await {
        discard(engine, &new, &created.id).await;
        return Err(ExecutorError::StartReplacement(e));
    }

    if let Err(e) = wait_for_healthy(engine, &created.id, health).await {
        discard(engine, &new, &created.id).await;
        return Err(ExecutorError::Health(e));
    }

    info!("{} stopping old container", old);
    engine
        .stop_container(&current.id)
        .await
        .map_err(ExecutorError::StopOld)?;

    info!("{} removing old container", old);
    engine
        .remove_container(&current.id, false)
        .await
        .map_err(ExecutorError::RemoveOld)?;

    info!("{} renaming new container to {}", new, current.name);
    engine
        .rename_container(&created.id, &current.name)
        .await
        .map_err(ExecutorError::Rename)?;

    info!("{} updated successfully", ContainerRef::new(&current.name, &created.id));
    Ok(created.id)
}

/// Force-removes a replacement that never took over.
async fn discard(engine: &dyn ContainerEngine, ctr: &ContainerRef, id: &str) {
    if let Err(e) = engine.remove_container(id, true).await {
        warn!("{} failed to remove abandoned replacement: {}", ctr, e);
    }
}

/// Returns immediately when no healthcheck is declared; otherwise polls
/// until `healthy`, `unhealthy` or the timeout, whichever comes first.
pub async fn wait_for_healthy(
    engine: &dyn ContainerEngine,
    id: &str,
    wait: &HealthWait,
) -> Result<(), HealthError> {
    match timeout(wait.timeout, poll_health(engine, id, wait.interval)).await {
        Ok(result) => result,
        Err(_) => Err(HealthError::Timeout(wait.timeout)),
    }
}

async fn poll_health(
    engine: &dyn ContainerEngine,
    id: &str,
    every: Duration,
) -> Result<(), HealthError> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // The first tick completes immediately.
        ticker.tick().await;
        match engine.inspect_health(id).await.map_err(HealthError::Probe)? {
            HealthState::NotConfigured | HealthState::Healthy => return Ok(()),
            HealthState::Unhealthy => return Err(HealthError::Unhealthy),
            HealthState::Starting => {}
        }
    }
}
