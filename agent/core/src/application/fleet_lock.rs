// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Annotation Locker
//!
//! Fleet Lock backed by the `locked-since` annotation on each member's own
//! ManagedNode. A requester polls its group with exponential backoff, needs
//! several consecutive observations of a free group before claiming, claims
//! with a conditional write, then re-lists the group and withdraws if any
//! other member claimed concurrently.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Group-scoped mutual exclusion for rolling upgrades

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::agent_config::LockerConfig;
use crate::domain::clock::Clock;
use crate::domain::lock::{FleetLock, LockError};
use crate::domain::node::{ManagedNode, NamespacedName, LABEL_UPGRADE_GROUP};
use crate::domain::repository::{NodeRepository, RepositoryError};

/// Consecutive free observations required before claiming.
pub const FREE_STREAK_THRESHOLD: u32 = 3;

pub struct AnnotationLocker {
    nodes: Arc<dyn NodeRepository>,
    clock: Arc<dyn Clock>,
    config: LockerConfig,
}

/// Deadline and cancellation shared by one Lock/Unlock/HasLock call.
struct Attempt<'a> {
    operation: &'static str,
    timeout: Duration,
    deadline: Instant,
    cancel: &'a CancellationToken,
    backoff: ExponentialBackoff,
}

impl<'a> Attempt<'a> {
    fn check(&self) -> Result<(), LockError> {
        if self.cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(LockError::DeadlineExceeded {
                operation: self.operation,
                after: self.timeout,
            });
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), LockError> {
        self.check()?;
        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.backoff.max_interval);
        let until = (Instant::now() + delay).min(self.deadline);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(LockError::Cancelled),
            _ = tokio::time::sleep_until(until) => Ok(()),
        }
    }
}

impl AnnotationLocker {
    pub fn new(nodes: Arc<dyn NodeRepository>, clock: Arc<dyn Clock>, config: LockerConfig) -> Self {
        Self {
            nodes,
            clock,
            config,
        }
    }

    fn attempt<'a>(
        &self,
        operation: &'static str,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> Attempt<'a> {
        let backoff = ExponentialBackoff {
            current_interval: self.config.backoff_min,
            initial_interval: self.config.backoff_min,
            multiplier: 2.0,
            max_interval: self.config.backoff_max,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        Attempt {
            operation,
            timeout,
            deadline: Instant::now() + timeout,
            cancel,
            backoff,
        }
    }

    fn group_selector(group: &str) -> BTreeMap<String, String> {
        if group.is_empty() {
            BTreeMap::new()
        } else {
            BTreeMap::from([(LABEL_UPGRADE_GROUP.to_string(), group.to_string())])
        }
    }

    /// Clear our own claim; used when a concurrent claim was detected.
    /// Cancellation and the deadline are honored only after a failed clear.
    async fn withdraw(&self, holder: &NamespacedName, attempt: &mut Attempt<'_>) -> Result<(), LockError> {
        loop {
            match self.clear(holder).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(node = %holder, error = %e, "Failed to withdraw contested lock claim");
                }
            }
            if let Err(cause) = attempt.wait().await {
                error!(node = %holder, error = %cause, "Giving up on withdrawing contested lock claim");
                return Err(LockError::ClaimNotWithdrawn {
                    holder: holder.to_string(),
                });
            }
        }
    }

    async fn clear(&self, holder: &NamespacedName) -> Result<(), RepositoryError> {
        let mut node = self.nodes.get(holder).await?;
        if !node.holds_lock() {
            return Ok(());
        }
        node.clear_locked_since();
        self.nodes.update(&node).await?;
        Ok(())
    }
}

fn holders<'n>(nodes: &'n [ManagedNode]) -> Vec<&'n ManagedNode> {
    nodes.iter().filter(|n| n.holds_lock()).collect()
}

#[async_trait]
impl FleetLock for AnnotationLocker {
    async fn lock(
        &self,
        group: &str,
        holder: &NamespacedName,
        cancel: &CancellationToken,
    ) -> Result<(), LockError> {
        let mut attempt = self.attempt("lock", self.config.lock_timeout, cancel);
        let selector = Self::group_selector(group);
        let mut free_streak = 0u32;

        info!(node = %holder, group, "Attempting to acquire fleet lock");

        loop {
            attempt.check()?;
            let members = match self.nodes.list(&holder.namespace, &selector).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(node = %holder, group, error = %e, "Failed to list group members");
                    attempt.wait().await?;
                    continue;
                }
            };

            let locked = holders(&members);
            if locked.len() == 1 && locked[0].key() == *holder {
                debug!(node = %holder, group, "Fleet lock already held");
                return Ok(());
            }

            if !locked.is_empty() {
                free_streak = 0;
                for node in &locked {
                    info!(
                        node = %holder,
                        holder = node.name(),
                        since = node.locked_since_raw().unwrap_or_default(),
                        "Group member holds the fleet lock"
                    );
                }
                attempt.wait().await?;
                continue;
            }

            free_streak += 1;
            if free_streak < FREE_STREAK_THRESHOLD {
                debug!(node = %holder, group, attempt = free_streak, "Fleet lock free, confirming before claim");
                attempt.wait().await?;
                continue;
            }

            attempt.check()?;
            let mut own = match self.nodes.get(holder).await {
                Ok(node) => node,
                Err(e) if e.is_not_found() => return Err(e.into()),
                Err(e) => {
                    warn!(node = %holder, error = %e, "Failed to fetch own record");
                    attempt.wait().await?;
                    continue;
                }
            };
            own.set_locked_since(self.clock.now());

            if let Err(e) = self.nodes.update(&own).await {
                metrics::counter!("fleetkeeper_lock_conflicts_total").increment(1);
                warn!(node = %holder, group, error = %e, "Fleet lock claim rejected");
                free_streak = 0;
                attempt.wait().await?;
                continue;
            }

            let contested = match self.nodes.list(&holder.namespace, &selector).await {
                Ok(members) => holders(&members).iter().any(|n| n.key() != *holder),
                Err(e) => {
                    warn!(node = %holder, error = %e, "Failed to verify fleet lock claim");
                    true
                }
            };

            if !contested {
                metrics::counter!("fleetkeeper_lock_acquired_total", "group" => group.to_string())
                    .increment(1);
                info!(node = %holder, group, "Fleet lock acquired");
                return Ok(());
            }

            metrics::counter!("fleetkeeper_lock_conflicts_total").increment(1);
            warn!(node = %holder, group, "Concurrent fleet lock claim detected, withdrawing");
            self.withdraw(holder, &mut attempt).await?;
            free_streak = 0;
            attempt.wait().await?;
        }
    }

    async fn unlock(&self, holder: &NamespacedName, cancel: &CancellationToken) -> Result<(), LockError> {
        let mut attempt = self.attempt("unlock", self.config.unlock_timeout, cancel);

        loop {
            attempt.check()?;
            match self.clear(holder).await {
                Ok(()) => {
                    info!(node = %holder, "Fleet lock released");
                    return Ok(());
                }
                Err(e) => {
                    warn!(node = %holder, error = %e, "Failed to release fleet lock");
                    attempt.wait().await?;
                }
            }
        }
    }

    async fn has_lock(&self, holder: &NamespacedName, cancel: &CancellationToken) -> Result<bool, LockError> {
        let mut attempt = self.attempt("has_lock", self.config.has_lock_timeout, cancel);

        loop {
            attempt.check()?;
            match self.nodes.get(holder).await {
                Ok(node) => return Ok(node.holds_lock()),
                Err(e) => {
                    if !e.is_not_found() {
                        warn!(node = %holder, error = %e, "Failed to read own record for lock check");
                    }
                    attempt.wait().await?;
                }
            }
        }
    }
}
