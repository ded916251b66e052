// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! Concrete adapters behind the domain ports: the command runner, per-OS
//! package/service/node handlers, the local file handler, the Handlebars
//! renderer and the record stores.

pub mod command;
pub mod files;
pub mod nodes;
pub mod os_release;
pub mod packages;
pub mod repositories;
pub mod services;
pub mod system_factory;
pub mod template_engine;

#[cfg(test)]
pub(crate) mod testing;

pub use command::CommandRunner;
pub use files::LocalFileHandler;
pub use system_factory::{build_system, detect_system, OsFamily};
pub use template_engine::HandlebarsRenderer;
