// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Coordination services built on the domain ports.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Fleet lock, upgrade scheduling, convergence and the loops driving them

pub mod convergence;
pub mod driver;
pub mod fleet_lock;
pub mod upgrade_scheduler;

pub use convergence::{ConfigSetReconciler, ConvergenceError, TriggerFailure, TriggerKind};
pub use driver::{PassSummary, Readiness, ReconciliationDriver};
pub use fleet_lock::AnnotationLocker;
pub use upgrade_scheduler::{SchedulerError, SchedulerOutcome, UpgradeScheduler, UpgradeState};
