// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! OS Detection
//!
//! Resolves the adapter set for the running host once at startup from the
//! os-release `ID`.
//!
//! | ID                | Packages | Services      | Node           |
//! |-------------------|----------|---------------|----------------|
//! | `arch`, `archarm` | pacman   | systemd       | systemd        |
//! | `alpine`          | apk      | OpenRC        | reboot only    |
//! | `freebsd`         | pkg      | rc.d + sysrc  | freebsd-update |

use std::sync::Arc;
use tracing::info;

use crate::domain::system::{ExecHandler, HandlerError, System};
use crate::infrastructure::command::CommandRunner;
use crate::infrastructure::files::LocalFileHandler;
use crate::infrastructure::nodes::{AlpineNode, FreeBsdNode, SystemdNode};
use crate::infrastructure::os_release::InfoResolver;
use crate::infrastructure::packages::{Apk, Pacman, Pkgng};
use crate::infrastructure::services::{FreeBsdRc, OpenRc, Systemd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Arch,
    Alpine,
    FreeBsd,
}

impl OsFamily {
    pub fn from_os_id(id: &str) -> Result<Self, HandlerError> {
        match id {
            "arch" | "archarm" => Ok(OsFamily::Arch),
            "alpine" => Ok(OsFamily::Alpine),
            "freebsd" => Ok(OsFamily::FreeBsd),
            other => Err(HandlerError::Unsupported(format!("operating system {:?}", other))),
        }
    }

    fn default_group(&self) -> &'static str {
        match self {
            OsFamily::FreeBsd => "wheel",
            _ => "root",
        }
    }
}

/// Build the adapter set for `family` on top of `exec`.
pub fn build_system(family: OsFamily, exec: Arc<dyn ExecHandler>, info: InfoResolver) -> System {
    let files = Arc::new(LocalFileHandler::new("root", family.default_group()));

    match family {
        OsFamily::Arch => System {
            packages: Arc::new(Pacman::new(exec.clone())),
            services: Arc::new(Systemd::new(exec.clone())),
            files,
            node: Arc::new(SystemdNode::new(exec.clone(), info)),
            exec,
        },
        OsFamily::Alpine => System {
            packages: Arc::new(Apk::new(exec.clone())),
            services: Arc::new(OpenRc::new(exec.clone())),
            files,
            node: Arc::new(AlpineNode::new(exec.clone(), info)),
            exec,
        },
        OsFamily::FreeBsd => System {
            packages: Arc::new(Pkgng::new(exec.clone())),
            services: Arc::new(FreeBsdRc::new(exec.clone())),
            files,
            node: Arc::new(FreeBsdNode::new(exec.clone(), info)),
            exec,
        },
    }
}

/// Detect the running OS and build its adapters.
pub async fn detect_system() -> Result<System, HandlerError> {
    let exec: Arc<dyn ExecHandler> = Arc::new(CommandRunner::new());
    let info = InfoResolver::new(exec.clone());
    let os_id = info.os_id().await?;
    let family = OsFamily::from_os_id(&os_id)?;

    info!(os = %os_id, family = ?family, "Detected operating system");
    Ok(build_system(family, exec, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testing::RecordingExec;

    #[test]
    fn test_os_family_from_id() {
        assert_eq!(OsFamily::from_os_id("arch").unwrap(), OsFamily::Arch);
        assert_eq!(OsFamily::from_os_id("archarm").unwrap(), OsFamily::Arch);
        assert_eq!(OsFamily::from_os_id("alpine").unwrap(), OsFamily::Alpine);
        assert_eq!(OsFamily::from_os_id("freebsd").unwrap(), OsFamily::FreeBsd);
        assert!(matches!(
            OsFamily::from_os_id("ubuntu"),
            Err(HandlerError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_build_system_wires_adapters() {
        let exec = Arc::new(RecordingExec::new());
        let info = InfoResolver::new(exec.clone());
        let system = build_system(OsFamily::FreeBsd, exec.clone(), info);

        system.packages.install("sudo").await.unwrap();
        system.services.enable("sshd").await.unwrap();
        assert_eq!(
            exec.calls(),
            vec![
                "/usr/sbin/pkg install -qy sudo",
                "/usr/sbin/sysrc -f /etc/rc.conf.d/sshd sshd_enable=YES",
            ]
        );
    }

    #[tokio::test]
    async fn test_resolver_reads_os_release() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("os-release");
        std::fs::write(&path, "NAME=\"Alpine Linux\"\nID=alpine\n").unwrap();

        let exec = Arc::new(RecordingExec::new());
        exec.respond("uname", 0, "Linux node-7 6.6.31-0-lts aarch64\n");
        let info = InfoResolver::with_path(exec, &path).info().await.unwrap();

        assert_eq!(info.os_id, "alpine");
        assert_eq!(info.hostname, "node-7");
        assert_eq!(info.os_release, "6.6.31-0-lts");
        assert_eq!(info.arch, "aarch64");
    }
}
