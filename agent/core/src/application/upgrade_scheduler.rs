// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Upgrade Scheduler
//!
//! Per-node state machine for the rolling upgrade protocol. Every pass
//! re-derives its state from the ManagedNode record, so a pass interrupted by
//! the reboot it issues resumes correctly in the next process:
//!
//! ```text
//! Idle -> Scheduled -> AwaitingLock -> Upgrading -> (reboot) -> JustUpgraded -> Scheduled
//! ```
//!
//! Holding the lock at the start of a pass means the previous pass rebooted
//! the host; the pass records `last-upgrade` and releases the lock without
//! touching packages.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cron-driven, lock-guarded upgrade and reboot

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::clock::Clock;
use crate::domain::lock::{FleetLock, LockError};
use crate::domain::node::{ManagedNode, NamespacedName, LABEL_UPGRADE_GROUP};
use crate::domain::repository::{NodeRepository, RepositoryError};
use crate::domain::system::{HandlerError, SysInfo, System};

/// Attempts for a record write rejected by a concurrent modification.
const CONFLICT_RETRIES: u32 = 5;
const CONFLICT_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// No schedule or no delay configured.
    Idle,
    /// Waiting for the next window.
    Scheduled { next: DateTime<Utc> },
    /// Resumed after the reboot; completion recorded and lock released.
    Completed,
    /// Upgrade applied and reboot requested.
    RebootIssued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOutcome {
    pub state: UpgradeState,
    /// When the driver should run the next pass, if the scheduler cares.
    pub requeue_at: Option<DateTime<Utc>>,
}

impl SchedulerOutcome {
    fn idle() -> Self {
        Self {
            state: UpgradeState::Idle,
            requeue_at: None,
        }
    }

    fn scheduled(next: DateTime<Utc>) -> Self {
        Self {
            state: UpgradeState::Scheduled { next },
            requeue_at: Some(next),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid upgrade schedule {schedule:?}: {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    #[error("invalid upgrade delay {0:?}")]
    InvalidDelay(String),

    #[error("invalid last-upgrade annotation: {0}")]
    InvalidAnnotation(#[from] chrono::ParseError),

    #[error("fleet lock: {source}")]
    Lock {
        #[source]
        source: LockError,
        retry_at: DateTime<Utc>,
    },

    #[error("upgrade failed: {source}")]
    Upgrade {
        #[source]
        source: HandlerError,
        retry_at: DateTime<Utc>,
    },

    #[error("node handler: {0}")]
    Node(#[from] HandlerError),

    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),

    #[error("scheduler pass cancelled")]
    Cancelled,
}

impl SchedulerError {
    /// Fallback time for the next attempt.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SchedulerError::Lock { retry_at, .. } | SchedulerError::Upgrade { retry_at, .. } => {
                Some(*retry_at)
            }
            _ => None,
        }
    }

    /// True when the failed pass may have left this node's lock claim in
    /// place. A later pass in the same process would misread that claim as
    /// a completed reboot.
    pub fn leaves_lock_held(&self) -> bool {
        matches!(
            self,
            SchedulerError::Upgrade { .. }
                | SchedulerError::Lock {
                    source: LockError::ClaimNotWithdrawn { .. },
                    ..
                }
        )
    }

    fn lock(source: LockError, retry_at: DateTime<Utc>) -> Self {
        match source {
            LockError::Cancelled => SchedulerError::Cancelled,
            source => SchedulerError::Lock { source, retry_at },
        }
    }
}

/// Parse a cron expression. Five-field expressions are minute-first with
/// standard day-of-week numbering (0 and 7 are Sunday) and fire at second 0;
/// six and seven field expressions are second-first.
pub fn parse_schedule(expression: &str) -> Result<Schedule, SchedulerError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            shift_day_of_week(fields[4])
        ),
        6 | 7 => fields.join(" "),
        n => {
            return Err(SchedulerError::InvalidSchedule {
                schedule: expression.to_string(),
                reason: format!("expected 5, 6 or 7 fields, found {}", n),
            })
        }
    };
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedule {
        schedule: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Map 0-7 (Sunday = 0 or 7) onto the 1-7 (Sunday = 1) numbering of the
/// second-first dialect. Names and wildcards pass through.
fn shift_day_of_week(field: &str) -> String {
    fn day(raw: &str) -> Option<u32> {
        raw.parse::<u32>().ok().filter(|d| *d <= 7)
    }
    fn shift(d: u32) -> u32 {
        d % 7 + 1
    }

    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let shifted = match range.split_once('-') {
                Some((lo, hi)) => match (day(lo), day(hi)) {
                    (Some(lo), Some(7)) if lo > 0 => format!("{}-7,1", shift(lo)),
                    (Some(0), Some(7)) => "1-7".to_string(),
                    (Some(lo), Some(hi)) => format!("{}-{}", shift(lo), shift(hi)),
                    _ => range.to_string(),
                },
                None => day(range).map_or_else(|| range.to_string(), |d| shift(d).to_string()),
            };
            match step {
                Some(step) => format!("{}/{}", shifted, step),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Earliest match at or after `from`.
pub fn next_occurrence(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let whole = from.with_nanosecond(0).unwrap_or(from);
    let start = if whole < from { whole } else { whole - ChronoDuration::seconds(1) };
    schedule.after(&start).next()
}

pub struct UpgradeScheduler {
    identity: NamespacedName,
    nodes: Arc<dyn NodeRepository>,
    lock: Arc<dyn FleetLock>,
    system: System,
    clock: Arc<dyn Clock>,
    forgiveness: Duration,
}

impl UpgradeScheduler {
    pub fn new(
        identity: NamespacedName,
        nodes: Arc<dyn NodeRepository>,
        lock: Arc<dyn FleetLock>,
        system: System,
        clock: Arc<dyn Clock>,
        forgiveness: Duration,
    ) -> Self {
        Self {
            identity,
            nodes,
            lock,
            system,
            clock,
            forgiveness,
        }
    }

    /// Run one pass for `key`. Passes for any node other than this host are
    /// ignored.
    pub async fn reconcile(
        &self,
        key: &NamespacedName,
        cancel: &CancellationToken,
    ) -> Result<SchedulerOutcome, SchedulerError> {
        if *key != self.identity {
            debug!(node = %key, "Skipping scheduler pass for foreign node");
            return Ok(SchedulerOutcome::idle());
        }

        let node = match self.nodes.get(key).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => {
                info!(node = %key, "ManagedNode not found, skipping scheduler pass");
                return Ok(SchedulerOutcome::idle());
            }
            Err(e) => return Err(e.into()),
        };

        let info = self.system.node.info().await?;
        let node = self.sync_labels(node, &info).await?;
        let node = self.sync_status(node, &info).await?;
        self.handle_upgrade(node, cancel).await
    }

    async fn sync_labels(&self, node: ManagedNode, info: &SysInfo) -> Result<ManagedNode, SchedulerError> {
        let identity = info.labels();
        let updated = self
            .modify(node, false, |n| {
                let mut desired = identity.clone();
                if !n.spec.upgrade.group.is_empty() {
                    desired.insert(LABEL_UPGRADE_GROUP.to_string(), n.spec.upgrade.group.clone());
                }
                let changed = n.merge_labels(&desired);
                if changed {
                    info!(node = n.name(), labels = ?n.labels(), "Updating node labels");
                }
                changed
            })
            .await?;
        Ok(updated)
    }

    async fn sync_status(&self, node: ManagedNode, info: &SysInfo) -> Result<ManagedNode, SchedulerError> {
        let release = info.os_release.as_str();
        let updated = self
            .modify(node, true, |n| {
                if n.status.release == release {
                    return false;
                }
                info!(node = n.name(), release, "Updating node status");
                n.status.release = release.to_string();
                true
            })
            .await?;
        Ok(updated)
    }

    /// Apply `mutate` and write the record, re-reading and re-applying on
    /// conflict. `mutate` returns false when nothing needs writing.
    async fn modify<F>(
        &self,
        mut node: ManagedNode,
        status: bool,
        mutate: F,
    ) -> Result<ManagedNode, RepositoryError>
    where
        F: Fn(&mut ManagedNode) -> bool + Send + Sync,
    {
        let key = node.key();
        let mut attempt = 0;
        loop {
            if !mutate(&mut node) {
                return Ok(node);
            }
            let written = if status {
                self.nodes.update_status(&node).await
            } else {
                self.nodes.update(&node).await
            };
            match written {
                Ok(updated) => return Ok(updated),
                Err(e) if e.is_conflict() && attempt + 1 < CONFLICT_RETRIES => {
                    attempt += 1;
                    debug!(node = %key, attempt, "Write conflict, re-reading record");
                    tokio::time::sleep(CONFLICT_BACKOFF * 2u32.pow(attempt)).await;
                    node = self.nodes.get(&key).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn handle_upgrade(
        &self,
        node: ManagedNode,
        cancel: &CancellationToken,
    ) -> Result<SchedulerOutcome, SchedulerError> {
        let key = node.key();
        let upgrade = node.spec.upgrade.clone();

        if upgrade.schedule.is_empty() || upgrade.delay.is_empty() {
            debug!(node = %key, "No upgrade schedule or delay configured");
            return Ok(SchedulerOutcome::idle());
        }

        let schedule = parse_schedule(&upgrade.schedule)?;
        let min_delay = humantime::parse_duration(&upgrade.delay)
            .ok()
            .and_then(|d| ChronoDuration::from_std(d).ok())
            .ok_or_else(|| SchedulerError::InvalidDelay(upgrade.delay.clone()))?;
        let forgiveness =
            ChronoDuration::from_std(self.forgiveness).unwrap_or_else(|_| ChronoDuration::zero());

        let now = self.clock.now();
        let next = next_occurrence(&schedule, now - forgiveness).ok_or_else(|| {
            SchedulerError::InvalidSchedule {
                schedule: upgrade.schedule.clone(),
                reason: "no upcoming occurrence".to_string(),
            }
        })?;

        let locked = self
            .lock
            .has_lock(&key, cancel)
            .await
            .map_err(|e| SchedulerError::lock(e, next))?;

        if locked {
            info!(node = %key, "Holding the upgrade lock, recording completed upgrade");
            self.modify(node, false, |n| {
                n.set_last_upgrade(now);
                true
            })
            .await?;
            metrics::counter!("fleetkeeper_upgrades_completed_total").increment(1);

            self.lock
                .unlock(&key, cancel)
                .await
                .map_err(|e| SchedulerError::lock(e, next))?;
            return Ok(SchedulerOutcome {
                state: UpgradeState::Completed,
                requeue_at: None,
            });
        }

        if let Some(last) = node.last_upgrade()? {
            if now - last < min_delay {
                debug!(node = %key, last = %last, "Upgraded recently, waiting for minimum delay");
                return Ok(SchedulerOutcome::scheduled(next));
            }
        }

        info!(node = %key, schedule = %upgrade.schedule, next = %next, "Next upgrade window");

        if next > now {
            let until = next - now;
            if until >= forgiveness {
                return Ok(SchedulerOutcome::scheduled(next));
            }
            debug!(node = %key, wait_ms = until.num_milliseconds(), "Upgrade window imminent, waiting");
            tokio::select! {
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                _ = tokio::time::sleep(until.to_std().unwrap_or_default()) => {}
            }
        }

        let retry_at = next + min_delay;

        self.lock
            .lock(&upgrade.group, &key, cancel)
            .await
            .map_err(|e| SchedulerError::lock(e, retry_at))?;

        metrics::counter!("fleetkeeper_upgrades_started_total").increment(1);
        info!(node = %key, group = %upgrade.group, "Upgrading packages");
        self.system
            .packages
            .upgrade_all()
            .await
            .map_err(|source| SchedulerError::Upgrade { source, retry_at })?;

        info!(node = %key, "Upgrading operating system");
        self.system
            .node
            .upgrade()
            .await
            .map_err(|source| SchedulerError::Upgrade { source, retry_at })?;

        warn!(node = %key, "Rebooting to complete upgrade");
        self.system.node.reboot().await;

        Ok(SchedulerOutcome {
            state: UpgradeState::RebootIssued,
            requeue_at: None,
        })
    }
}
