// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Node handler for systemd hosts. OS upgrades are entirely handled by the
//! package manager.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::system::{ExecHandler, HandlerError, NodeHandler, SysInfo};
use crate::infrastructure::command::run_checked;
use crate::infrastructure::os_release::{local_hostname, InfoResolver};
use crate::infrastructure::services::systemd::SYSTEMCTL;

pub struct SystemdNode {
    exec: Arc<dyn ExecHandler>,
    info: InfoResolver,
}

impl SystemdNode {
    pub fn new(exec: Arc<dyn ExecHandler>, info: InfoResolver) -> Self {
        Self { exec, info }
    }
}

#[async_trait]
impl NodeHandler for SystemdNode {
    async fn info(&self) -> Result<SysInfo, HandlerError> {
        self.info.info().await
    }

    async fn upgrade(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn reboot(&self) {
        info!("Rebooting host");
        if let Err(e) = run_checked(self.exec.as_ref(), SYSTEMCTL, &["reboot"]).await {
            error!("Failed to call reboot: {}", e);
        }
    }

    fn hostname(&self) -> Result<String, HandlerError> {
        local_hostname()
    }
}
