// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Fleetkeeper Core
//!
//! Host-side engine of the fleetkeeper agent: converges packages, files and
//! services toward declared `ConfigSet`s and takes part in the group-scoped
//! rolling upgrade protocol.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, coordination services and OS adapters

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
