// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Presentation Layer
//!
//! HTTP surface of the agent: liveness and readiness probes.

pub mod health;

pub use health::{probe_router, serve_probes};
