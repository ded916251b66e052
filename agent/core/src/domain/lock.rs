// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Lock
//!
//! Group-scoped mutual exclusion over the shared record store. The holder
//! identity is the requester's own ManagedNode key.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::node::NamespacedName;
use crate::domain::repository::RepositoryError;

#[async_trait]
pub trait FleetLock: Send + Sync {
    /// Block until `holder` is the only lock holder in `group`.
    async fn lock(
        &self,
        group: &str,
        holder: &NamespacedName,
        cancel: &CancellationToken,
    ) -> Result<(), LockError>;

    async fn unlock(&self, holder: &NamespacedName, cancel: &CancellationToken)
        -> Result<(), LockError>;

    async fn has_lock(
        &self,
        holder: &NamespacedName,
        cancel: &CancellationToken,
    ) -> Result<bool, LockError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock operation cancelled")]
    Cancelled,

    /// The attempt is deferred, not permanently failed.
    #[error("{operation} did not complete within {after:?}")]
    DeadlineExceeded {
        operation: &'static str,
        after: Duration,
    },

    /// A contested claim could not be cleared before the attempt ended; the
    /// holder's `locked-since` may still be set.
    #[error("contested claim of {holder} could not be withdrawn")]
    ClaimNotWithdrawn { holder: String },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}
