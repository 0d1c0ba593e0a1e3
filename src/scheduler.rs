//! The scan-evaluate-update loop.
//!
//! One cycle runs immediately, then one per interval.  Containers are
//! processed strictly one after another, and shutdown is only observed
//! between cycles: a cycle that has started always runs to completion.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::auth::CredentialIndex;
use crate::cleanup::maybe_remove;
use crate::config::Settings;
use crate::decision::{evaluate, Decision};
use crate::error::{EngineError, UpdateError};
use crate::notify::{build_message, Notifier, NotifyEntry};
use crate::policy::select_strategy;
use crate::runtime::ContainerEngine;
use crate::types::{short_id, ContainerEntry, ContainerRef, UpdateOutcome};

/// Creates a connected trigger / observer pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested.  A dropped trigger never fires.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub scanned: usize,
    pub updated: usize,
    pub failed: usize,
    pub updated_entries: Vec<NotifyEntry>,
    /// Permanent failures only; transient ones are counted but not listed.
    pub failed_entries: Vec<NotifyEntry>,
}

impl CycleSummary {
    pub fn record(&mut self, name: &str, outcome: &UpdateOutcome) {
        match outcome {
            UpdateOutcome::NoUpdate => {}
            UpdateOutcome::Updated { new_image_id } => {
                self.updated += 1;
                let info = match short_id(new_image_id) {
                    "" => "unknown",
                    id => id,
                };
                self.updated_entries.push(NotifyEntry::new(name, info));
            }
            UpdateOutcome::Failed { error, transient } => {
                self.failed += 1;
                if !transient {
                    self.failed_entries
                        .push(NotifyEntry::new(name, error.to_string()));
                }
            }
        }
    }

    pub fn has_report(&self) -> bool {
        !self.updated_entries.is_empty() || !self.failed_entries.is_empty()
    }
}

pub struct Scheduler {
    engine: Arc<dyn ContainerEngine>,
    credentials: CredentialIndex,
    settings: Settings,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        credentials: CredentialIndex,
        settings: Settings,
    ) -> Self {
        Self {
            engine,
            credentials,
            settings,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Runs until `shutdown` fires while idle, or is found set after a cycle.
    pub async fn run(&self, mut shutdown: Shutdown) {
        self.tick().await;

        let period = self.settings.interval;
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !shutdown.is_triggered() {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("shutdown");
    }

    async fn tick(&self) {
        match self.run_cycle().await {
            Ok(summary) => self.report(&summary).await,
            Err(e) => error!("list containers error: {}", e),
        }
    }

    /// One full pass.  Only a listing failure aborts it.
    pub async fn run_cycle(&self) -> Result<CycleSummary, EngineError> {
        let start = Instant::now();
        let label = self.settings.label_enable.then(|| self.settings.label.to_string());
        let containers = self
            .engine
            .list_containers(false, label.as_deref())
            .await?;

        let mut summary = CycleSummary {
            scanned: containers.len(),
            ..Default::default()
        };
        debug!("scan: {} container(s) eligible", summary.scanned);

        for entry in &containers {
            let outcome = self.process(entry).await;
            if let UpdateOutcome::Failed { error, transient } = &outcome {
                error!(
                    "{} update error{}: {}",
                    entry.reference(),
                    if *transient { " (transient)" } else { "" },
                    error
                );
            }
            summary.record(&entry.name, &outcome);
        }

        info!(
            "session done scanned={} updated={} failed={} duration={:?}",
            summary.scanned,
            summary.updated,
            summary.failed,
            start.elapsed()
        );
        Ok(summary)
    }

    /// Evaluates one container and, if needed, updates it and cleans up.
    /// Every failure is converted into an outcome here.
    pub async fn process(&self, entry: &ContainerEntry) -> UpdateOutcome {
        match self.try_process(entry).await {
            Ok(outcome) => outcome,
            Err(e) => UpdateOutcome::failed(e),
        }
    }

    async fn try_process(&self, entry: &ContainerEntry) -> Result<UpdateOutcome, UpdateError> {
        let engine = self.engine.as_ref();
        let record = engine
            .inspect_container(&entry.id)
            .await
            .map_err(UpdateError::Inspect)?;

        let (old_image_id, new_image_id) =
            match evaluate(engine, &self.credentials, &record).await? {
                Decision::UpToDate => return Ok(UpdateOutcome::NoUpdate),
                Decision::UpdateAvailable {
                    old_image_id,
                    new_image_id,
                } => (old_image_id, new_image_id),
            };

        let strategy = select_strategy(&record, &self.settings.rolling_label);
        debug!("{} strategy {:?}", record.reference(), strategy);
        if let Err(e) = strategy
            .execute(engine, &record, &record.image_ref, &self.settings.health)
            .await
        {
            if e.needs_attention() {
                warn!(
                    "{} left in an inconsistent state, manual attention required",
                    record.reference()
                );
            }
            return Err(e.into());
        }

        let ctr = ContainerRef::new(&record.name, "");
        if self.settings.cleanup {
            match maybe_remove(engine, &old_image_id).await {
                Ok(verdict) if verdict.removed() => {
                    info!("{} removed old image {} ({})", ctr, short_id(&old_image_id), verdict)
                }
                Ok(verdict) => {
                    info!("{} skipped old image {} ({})", ctr, short_id(&old_image_id), verdict)
                }
                Err(e) => warn!("{} cleanup error for {}: {}", ctr, short_id(&old_image_id), e),
            }
        } else {
            debug!("{} cleanup disabled: keeping old image {}", ctr, short_id(&old_image_id));
        }

        Ok(UpdateOutcome::Updated { new_image_id })
    }

    async fn report(&self, summary: &CycleSummary) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if !summary.has_report() {
            return;
        }
        let msg = build_message(&summary.updated_entries, &summary.failed_entries);
        if let Err(e) = notifier.send(&msg).await {
            warn!("notify error: {}", e);
        }
    }
}
