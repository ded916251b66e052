// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Node handler for Alpine Linux (OpenRC).

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::system::{ExecHandler, HandlerError, NodeHandler, SysInfo};
use crate::infrastructure::command::run_checked;
use crate::infrastructure::os_release::{local_hostname, InfoResolver};

const REBOOT: &str = "/sbin/reboot";

pub struct AlpineNode {
    exec: Arc<dyn ExecHandler>,
    info: InfoResolver,
}

impl AlpineNode {
    pub fn new(exec: Arc<dyn ExecHandler>, info: InfoResolver) -> Self {
        Self { exec, info }
    }
}

#[async_trait]
impl NodeHandler for AlpineNode {
    async fn info(&self) -> Result<SysInfo, HandlerError> {
        self.info.info().await
    }

    async fn upgrade(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn reboot(&self) {
        info!("Rebooting host");
        if let Err(e) = run_checked(self.exec.as_ref(), REBOOT, &[]).await {
            error!("Failed to call reboot: {}", e);
        }
    }

    fn hostname(&self) -> Result<String, HandlerError> {
        local_hostname()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testing::RecordingExec;

    #[tokio::test]
    async fn test_reboot() {
        let exec = Arc::new(RecordingExec::new());
        let node = AlpineNode::new(exec.clone(), InfoResolver::new(exec.clone()));

        node.reboot().await;
        assert_eq!(exec.calls(), vec!["/sbin/reboot"]);
    }
}
