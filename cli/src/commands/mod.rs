// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the fleetkeeper CLI

pub mod apply;
pub mod config;
pub mod node;
pub mod run;

pub use self::apply::ApplyArgs;
pub use self::config::ConfigCommand;
pub use self::node::NodeCommand;
