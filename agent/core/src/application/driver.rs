// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Reconciliation Driver - Background loops for one host
//!
//! Runs the upgrade scheduler and the convergence reconciler as two
//! independent loops under a shared shutdown token. The upgrade loop sleeps
//! until the scheduler's requested re-check time (capped at the reconcile
//! interval); the convergence loop re-reads every ConfigSet of the namespace
//! each interval.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Timer-driven invocation of the scheduler and reconciler

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::convergence::{ConfigSetReconciler, ConvergenceError};
use crate::application::upgrade_scheduler::{SchedulerError, UpgradeScheduler, UpgradeState};
use crate::domain::clock::Clock;
use crate::domain::node::{ManagedNode, NamespacedName};
use crate::domain::repository::{ConfigSetRepository, NodeRepository};
use crate::domain::system::System;

/// Shortest sleep between two upgrade passes.
const MIN_REQUEUE: Duration = Duration::from_secs(1);

/// Flipped once the first convergence pass has completed.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Result of one convergence pass over the namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub config_sets: usize,
    pub changed_files: Vec<String>,
    pub failed: Vec<String>,
}

pub struct ReconciliationDriver {
    identity: NamespacedName,
    nodes: Arc<dyn NodeRepository>,
    config_sets: Arc<dyn ConfigSetRepository>,
    scheduler: Arc<UpgradeScheduler>,
    reconciler: Arc<ConfigSetReconciler>,
    system: System,
    clock: Arc<dyn Clock>,
    interval: Duration,
    readiness: Readiness,
}

impl ReconciliationDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: NamespacedName,
        nodes: Arc<dyn NodeRepository>,
        config_sets: Arc<dyn ConfigSetRepository>,
        scheduler: Arc<UpgradeScheduler>,
        reconciler: Arc<ConfigSetReconciler>,
        system: System,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            identity,
            nodes,
            config_sets,
            scheduler,
            reconciler,
            system,
            clock,
            interval,
            readiness: Readiness::new(),
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Start both loops as a background task.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            node = %self.identity,
            interval_seconds = self.interval.as_secs(),
            "Starting reconciliation driver"
        );

        loop {
            match self.ensure_node().await {
                Ok(_) => break,
                Err(e) => {
                    error!("Failed to register ManagedNode: {:#}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.interval) => {}
                    }
                }
            }
        }

        tokio::join!(self.upgrade_loop(&shutdown), self.convergence_loop(&shutdown));

        info!("Reconciliation driver stopped");
        Ok(())
    }

    /// Fetch this host's ManagedNode, creating it on first sight.
    pub async fn ensure_node(&self) -> Result<ManagedNode> {
        match self.nodes.get(&self.identity).await {
            Ok(node) => return Ok(node),
            Err(e) if !e.is_not_found() => {
                return Err(e).with_context(|| format!("Failed to get ManagedNode {}", self.identity))
            }
            Err(_) => {}
        }

        let info = self
            .system
            .node
            .info()
            .await
            .context("Failed to read host identity")?;
        let mut node = ManagedNode::new(&self.identity.namespace, &self.identity.name);
        node.metadata.labels = info.labels();
        node.status.release = info.os_release;

        match self.nodes.create(&node).await {
            Ok(created) => {
                info!(node = %self.identity, "Registered ManagedNode");
                Ok(created)
            }
            Err(e) if e.is_conflict() => self
                .nodes
                .get(&self.identity)
                .await
                .with_context(|| format!("Failed to get ManagedNode {}", self.identity)),
            Err(e) => Err(e).with_context(|| format!("Failed to create ManagedNode {}", self.identity)),
        }
    }

    fn wait_until(&self, at: DateTime<Utc>) -> Duration {
        (at - self.clock.now())
            .to_std()
            .unwrap_or_default()
            .clamp(MIN_REQUEUE, self.interval.max(MIN_REQUEUE))
    }

    /// Scheduler passes until shutdown. Once a reboot has been requested, or
    /// a pass failed while holding the lock, no further pass runs in this
    /// process: the held lock is only read as a completed upgrade by the
    /// process that starts after the reboot.
    async fn upgrade_loop(&self, shutdown: &CancellationToken) {
        loop {
            let started = Instant::now();
            let result = self.scheduler.reconcile(&self.identity, shutdown).await;
            metrics::histogram!("fleetkeeper_reconcile_duration_seconds", "controller" => "upgrade")
                .record(started.elapsed().as_secs_f64());

            let wait = match result {
                Ok(outcome) if outcome.state == UpgradeState::RebootIssued => {
                    warn!(
                        node = %self.identity,
                        "Reboot requested, suspending upgrade passes until the agent restarts"
                    );
                    break;
                }
                Ok(outcome) => {
                    debug!(state = ?outcome.state, "Scheduler pass completed");
                    outcome
                        .requeue_at
                        .map_or(self.interval, |at| self.wait_until(at))
                }
                Err(SchedulerError::Cancelled) => break,
                Err(e) if e.leaves_lock_held() => {
                    error!(
                        node = %self.identity,
                        "Scheduler pass failed holding the fleet lock: {}. Node stays locked until an operator intervenes",
                        e
                    );
                    break;
                }
                Err(e) => {
                    warn!(node = %self.identity, "Scheduler pass failed: {}", e);
                    e.retry_at().map_or(self.interval, |at| self.wait_until(at))
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        info!("Upgrade loop stopped");
    }

    async fn convergence_loop(&self, shutdown: &CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let started = Instant::now();
                    match self.converge_once().await {
                        Ok(summary) => {
                            self.readiness.mark_ready();
                            info!(
                                config_sets = summary.config_sets,
                                changed = summary.changed_files.len(),
                                failed = summary.failed.len(),
                                "Convergence pass completed"
                            );
                        }
                        Err(e) => warn!("Convergence pass failed: {:#}", e),
                    }
                    metrics::histogram!("fleetkeeper_reconcile_duration_seconds", "controller" => "configset")
                        .record(started.elapsed().as_secs_f64());
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Convergence loop stopped");
    }

    /// Reconcile every ConfigSet of the namespace once. One ConfigSet failing
    /// does not stop the others.
    pub async fn converge_once(&self) -> Result<PassSummary> {
        let node = self
            .nodes
            .get(&self.identity)
            .await
            .with_context(|| format!("Failed to get ManagedNode {}", self.identity))?;
        let config_sets = self
            .config_sets
            .list(&self.identity.namespace)
            .await
            .context("Failed to list ConfigSets")?;

        let mut summary = PassSummary {
            config_sets: config_sets.len(),
            ..Default::default()
        };

        for config_set in &config_sets {
            let name = &config_set.metadata.name;
            match self.reconciler.reconcile(config_set, &node).await {
                Ok(changed) => summary.changed_files.extend(changed),
                Err(ConvergenceError::Triggers {
                    changed_files,
                    failures,
                }) => {
                    for failure in &failures {
                        error!(configset = %name, "Trigger failed: {}", failure);
                    }
                    summary.changed_files.extend(changed_files);
                    summary.failed.push(name.clone());
                }
                Err(e) => {
                    error!(configset = %name, "ConfigSet reconciliation failed: {}", e);
                    summary.failed.push(name.clone());
                }
            }
        }

        Ok(summary)
    }
}
