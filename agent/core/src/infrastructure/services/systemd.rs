// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! systemd unit management through `systemctl`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::system::{ExecHandler, HandlerError, ServiceHandler, ServiceStatus};
use crate::infrastructure::command::{run, run_checked};

pub const SYSTEMCTL: &str = "/usr/bin/systemctl";

pub struct Systemd {
    exec: Arc<dyn ExecHandler>,
}

impl Systemd {
    pub fn new(exec: Arc<dyn ExecHandler>) -> Self {
        Self { exec }
    }

    async fn systemctl(&self, verb: &str, name: &str) -> Result<(), HandlerError> {
        info!(service = %name, action = verb, "Managing service");
        run_checked(self.exec.as_ref(), SYSTEMCTL, &[verb, name]).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceHandler for Systemd {
    async fn enable(&self, name: &str) -> Result<(), HandlerError> {
        self.systemctl("enable", name).await
    }

    async fn disable(&self, name: &str) -> Result<(), HandlerError> {
        self.systemctl("disable", name).await
    }

    async fn start(&self, name: &str) -> Result<(), HandlerError> {
        self.systemctl("start", name).await
    }

    async fn stop(&self, name: &str) -> Result<(), HandlerError> {
        self.systemctl("stop", name).await
    }

    async fn restart(&self, name: &str) -> Result<(), HandlerError> {
        self.systemctl("restart", name).await
    }

    async fn set_arguments(&self, name: &str, _arguments: &str) -> Result<(), HandlerError> {
        debug!(service = %name, "systemd units take no arguments, skipping");
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ServiceStatus, HandlerError> {
        let output = run(self.exec.as_ref(), SYSTEMCTL, &["is-active", "--quiet", name]).await?;
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
        let systemd = Systemd::new(exec.clone());

        systemd.enable("sshd").await.unwrap();
        systemd.disable("sshd").await.unwrap();
        systemd.start("sshd").await.unwrap();
        systemd.stop("sshd").await.unwrap();
        systemd.restart("sshd").await.unwrap();
        systemd.set_arguments("sshd", "-D").await.unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "/usr/bin/systemctl enable sshd",
                "/usr/bin/systemctl disable sshd",
                "/usr/bin/systemctl start sshd",
                "/usr/bin/systemctl stop sshd",
                "/usr/bin/systemctl restart sshd",
            ]
        );
    }

    #[tokio::test]
    async fn test_status_from_exit_code() {
        let exec = Arc::new(RecordingExec::new());
        let systemd = Systemd::new(exec.clone());

        assert_eq!(systemd.status("sshd").await.unwrap(), ServiceStatus::Running);

        exec.respond("/usr/bin/systemctl is-active", 3, "");
        assert_eq!(systemd.status("sshd").await.unwrap(), ServiceStatus::Stopped);
        assert_eq!(
            exec.calls().last().map(String::as_str),
            Some("/usr/bin/systemctl is-active --quiet sshd")
        );
    }
}
