// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Node adapters: host identity, OS-level upgrade and reboot.

pub mod alpine;
pub mod freebsd;
pub mod systemd;

pub use alpine::AlpineNode;
pub use freebsd::FreeBsdNode;
pub use systemd::SystemdNode;
