// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Records, contracts and configuration shared by every layer.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types and traits with no I/O of their own

pub mod agent_config;
pub mod clock;
pub mod config_set;
pub mod lock;
pub mod node;
pub mod repository;
pub mod system;
pub mod template;
