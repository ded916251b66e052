// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! FreeBSD `pkg` adapter.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::domain::system::{ExecHandler, HandlerError, PackageHandler};
use crate::infrastructure::command::run_checked;

const PKG: &str = "/usr/sbin/pkg";

pub struct Pkgng {
    exec: Arc<dyn ExecHandler>,
}

impl Pkgng {
    pub fn new(exec: Arc<dyn ExecHandler>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl PackageHandler for Pkgng {
    async fn install(&self, name: &str) -> Result<(), HandlerError> {
        info!(package = %name, "Installing package");
        run_checked(self.exec.as_ref(), PKG, &["install", "-qy", name]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), HandlerError> {
        info!(package = %name, "Removing package");
        run_checked(self.exec.as_ref(), PKG, &["remove", "-qy", name]).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, HandlerError> {
        let output = run_checked(self.exec.as_ref(), PKG, &["query", "-a", "%n"]).await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn upgrade_all(&self) -> Result<(), HandlerError> {
        info!("Upgrading all packages");
        run_checked(self.exec.as_ref(), PKG, &["upgrade", "-y"]).await?;
        Ok(())
    }
}
