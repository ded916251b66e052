// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Init system adapters, one per supported operating system.

pub mod freebsd;
pub mod openrc;
pub mod systemd;

pub use freebsd::FreeBsdRc;
pub use openrc::OpenRc;
pub use systemd::Systemd;
