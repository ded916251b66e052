// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! FreeBSD rc.d services. Enablement and arguments are written to a per-service
//! file under `/etc/rc.conf.d` with `sysrc`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::domain::system::{ExecHandler, HandlerError, ServiceHandler, ServiceStatus};
use crate::infrastructure::command::{run, run_checked};

const SYSRC: &str = "/usr/sbin/sysrc";
const SERVICE: &str = "/usr/sbin/service";
const RC_CONF_DIR: &str = "/etc/rc.conf.d";

pub struct FreeBsdRc {
    exec: Arc<dyn ExecHandler>,
}

impl FreeBsdRc {
    pub fn new(exec: Arc<dyn ExecHandler>) -> Self {
        Self { exec }
    }

    async fn sysrc(&self, name: &str, assignment: &str) -> Result<(), HandlerError> {
        let rc_file = format!("{}/{}", RC_CONF_DIR, name);
        run_checked(self.exec.as_ref(), SYSRC, &["-f", &rc_file, assignment]).await?;
        Ok(())
    }

    async fn service(&self, name: &str, action: &str) -> Result<(), HandlerError> {
        info!(service = %name, action, "Managing service");
        run_checked(self.exec.as_ref(), SERVICE, &[name, action]).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceHandler for FreeBsdRc {
    async fn enable(&self, name: &str) -> Result<(), HandlerError> {
        info!(service = %name, "Enabling service");
        self.sysrc(name, &format!("{}_enable=YES", name)).await
    }

    async fn disable(&self, name: &str) -> Result<(), HandlerError> {
        info!(service = %name, "Disabling service");
        self.sysrc(name, &format!("{}_enable=NO", name)).await
    }

    async fn start(&self, name: &str) -> Result<(), HandlerError> {
        self.service(name, "start").await
    }

    async fn stop(&self, name: &str) -> Result<(), HandlerError> {
        self.service(name, "stop").await
    }

    async fn restart(&self, name: &str) -> Result<(), HandlerError> {
        self.service(name, "restart").await
    }

    async fn set_arguments(&self, name: &str, arguments: &str) -> Result<(), HandlerError> {
        self.sysrc(name, &format!("{}_args={}", name, arguments)).await
    }

    async fn status(&self, name: &str) -> Result<ServiceStatus, HandlerError> {
        let output = run(self.exec.as_ref(), SERVICE, &[name, "status"]).await?;
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
    async fn test_rc_conf_d_assignments() {
        let exec = Arc::new(RecordingExec::new());
        let rc = FreeBsdRc::new(exec.clone());

        rc.enable("nginx").await.unwrap();
        rc.set_arguments("nginx", "-c /usr/local/etc/nginx/alt.conf").await.unwrap();
        rc.disable("nginx").await.unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "/usr/sbin/sysrc -f /etc/rc.conf.d/nginx nginx_enable=YES",
                "/usr/sbin/sysrc -f /etc/rc.conf.d/nginx nginx_args=-c /usr/local/etc/nginx/alt.conf",
                "/usr/sbin/sysrc -f /etc/rc.conf.d/nginx nginx_enable=NO",
            ]
        );
    }

    #[tokio::test]
    async fn test_service_actions_and_status() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond("/usr/sbin/service nginx status", 1, "nginx is not running.\n");
        let rc = FreeBsdRc::new(exec.clone());

        rc.restart("nginx").await.unwrap();
        assert_eq!(rc.status("nginx").await.unwrap(), ServiceStatus::Stopped);
        assert_eq!(rc.status("sshd").await.unwrap(), ServiceStatus::Running);
        assert_eq!(exec.calls()[0], "/usr/sbin/service nginx restart");
    }
}
