// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Node handler for FreeBSD. Base system updates go through `freebsd-update`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::system::{ExecHandler, HandlerError, NodeHandler, SysInfo};
use crate::infrastructure::command::{run, run_checked};
use crate::infrastructure::os_release::{local_hostname, InfoResolver};

const FREEBSD_UPDATE: &str = "/usr/sbin/freebsd-update";
const SHUTDOWN: &str = "/sbin/shutdown";

/// `freebsd-update install` exit code when there is nothing to install.
const NOTHING_TO_INSTALL: i32 = 2;

pub struct FreeBsdNode {
    exec: Arc<dyn ExecHandler>,
    info: InfoResolver,
}

impl FreeBsdNode {
    pub fn new(exec: Arc<dyn ExecHandler>, info: InfoResolver) -> Self {
        Self { exec, info }
    }
}

#[async_trait]
impl NodeHandler for FreeBsdNode {
    async fn info(&self) -> Result<SysInfo, HandlerError> {
        self.info.info().await
    }

    async fn upgrade(&self) -> Result<(), HandlerError> {
        info!("Fetching base system updates");
        let fetch = run(self.exec.as_ref(), FREEBSD_UPDATE, &["fetch"]).await?;
        if !fetch.success() {
            error!(
                exit_code = fetch.exit_code,
                "freebsd-update fetch failed: {}",
                fetch.stderr.trim()
            );
        }

        let install = run(self.exec.as_ref(), FREEBSD_UPDATE, &["install"]).await?;
        match install.exit_code {
            0 => info!("Installed base system updates"),
            NOTHING_TO_INSTALL => info!("No base system updates to install"),
            _ => {
                return install
                    .check(format!("{} install", FREEBSD_UPDATE))
                    .map(|_| ())
            }
        }
        Ok(())
    }

    async fn reboot(&self) {
        info!("Rebooting host");
        if let Err(e) = run_checked(self.exec.as_ref(), SHUTDOWN, &["-r", "now"]).await {
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

    fn node(exec: &Arc<RecordingExec>) -> FreeBsdNode {
        FreeBsdNode::new(exec.clone(), InfoResolver::new(exec.clone()))
    }

    #[tokio::test]
    async fn test_upgrade_nothing_to_install() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond("/usr/sbin/freebsd-update install", NOTHING_TO_INSTALL, "");

        node(&exec).upgrade().await.unwrap();
        assert_eq!(
            exec.calls(),
            vec!["/usr/sbin/freebsd-update fetch", "/usr/sbin/freebsd-update install"]
        );
    }

    #[tokio::test]
    async fn test_upgrade_continues_after_fetch_failure() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond("/usr/sbin/freebsd-update fetch", 1, "");

        node(&exec).upgrade().await.unwrap();
        assert_eq!(exec.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_install_failure() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond("/usr/sbin/freebsd-update install", 1, "");

        let err = node(&exec).upgrade().await.unwrap_err();
        assert!(matches!(err, HandlerError::CommandFailed { exit_code: 1, .. }));
    }

    #[tokio::test]
    async fn test_reboot() {
        let exec = Arc::new(RecordingExec::new());
        node(&exec).reboot().await;
        assert_eq!(exec.calls(), vec!["/sbin/shutdown -r now"]);
    }
}
