// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Package manager adapters, one per supported operating system.

pub mod apk;
pub mod pacman;
pub mod pkgng;

pub use apk::Apk;
pub use pacman::Pacman;
pub use pkgng::Pkgng;
