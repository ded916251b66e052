// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! OpenRC service management through `rc-update` and `rc-service`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::system::{ExecHandler, HandlerError, ServiceHandler, ServiceStatus};
use crate::infrastructure::command::{run, run_checked};

const RC_UPDATE: &str = "/sbin/rc-update";
const RC_SERVICE: &str = "/sbin/rc-service";

pub struct OpenRc {
    exec: Arc<dyn ExecHandler>,
}

impl OpenRc {
    pub fn new(exec: Arc<dyn ExecHandler>) -> Self {
        Self { exec }
    }

    async fn rc_service(&self, name: &str, action: &str) -> Result<(), HandlerError> {
        info!(service = %name, action, "Managing service");
        run_checked(self.exec.as_ref(), RC_SERVICE, &[name, action]).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceHandler for OpenRc {
    async fn enable(&self, name: &str) -> Result<(), HandlerError> {
        info!(service = %name, "Adding service to default runlevel");
        run_checked(self.exec.as_ref(), RC_UPDATE, &["add", name]).await?;
        Ok(())
    }

    async fn disable(&self, name: &str) -> Result<(), HandlerError> {
        info!(service = %name, "Removing service from runlevels");
        run_checked(self.exec.as_ref(), RC_UPDATE, &["del", name]).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), HandlerError> {
        self.rc_service(name, "start").await
    }

    async fn stop(&self, name: &str) -> Result<(), HandlerError> {
        self.rc_service(name, "stop").await
    }

    async fn restart(&self, name: &str) -> Result<(), HandlerError> {
        self.rc_service(name, "restart").await
    }

    async fn set_arguments(&self, name: &str, _arguments: &str) -> Result<(), HandlerError> {
        debug!(service = %name, "OpenRC arguments are not managed, skipping");
        Ok(())
    }

    /// `rc-service <name> status` exits 0 only for a started service.
    async fn status(&self, name: &str) -> Result<ServiceStatus, HandlerError> {
        let output = run(self.exec.as_ref(), RC_SERVICE, &[name, "status"]).await?;
        Ok(if output.success() {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testing::RecordingExec;

    #[tokio::test]
    async fn test_commands() {
        let exec = Arc::new(RecordingExec::new());
        let openrc = OpenRc::new(exec.clone());

        openrc.enable("chronyd").await.unwrap();
        openrc.disable("chronyd").await.unwrap();
        openrc.start("chronyd").await.unwrap();
        openrc.restart("chronyd").await.unwrap();
        openrc.stop("chronyd").await.unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "/sbin/rc-update add chronyd",
                "/sbin/rc-update del chronyd",
                "/sbin/rc-service chronyd start",
                "/sbin/rc-service chronyd restart",
                "/sbin/rc-service chronyd stop",
            ]
        );
    }

    #[tokio::test]
    async fn test_status() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond("/sbin/rc-service sshd status", 3, " * status: stopped\n");
        let openrc = OpenRc::new(exec);

        assert_eq!(openrc.status("sshd").await.unwrap(), ServiceStatus::Stopped);
        assert_eq!(openrc.status("chronyd").await.unwrap(), ServiceStatus::Running);
    }
}
