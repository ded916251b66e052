// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Arch Linux `pacman` adapter.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::domain::system::{ExecHandler, HandlerError, PackageHandler};
use crate::infrastructure::command::run_checked;

const PACMAN: &str = "/usr/bin/pacman";

pub struct Pacman {
    exec: Arc<dyn ExecHandler>,
}

impl Pacman {
    pub fn new(exec: Arc<dyn ExecHandler>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl PackageHandler for Pacman {
    async fn install(&self, name: &str) -> Result<(), HandlerError> {
        info!(package = %name, "Installing package");
        run_checked(self.exec.as_ref(), PACMAN, &["-Sy", "--needed", "--noconfirm", name]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), HandlerError> {
        info!(package = %name, "Removing package");
        run_checked(self.exec.as_ref(), PACMAN, &["-Rcs", "--noconfirm", name]).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, HandlerError> {
        let output = run_checked(self.exec.as_ref(), PACMAN, &["-Q"]).await?;
        output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| match line.split_whitespace().collect::<Vec<_>>().as_slice() {
                [name, _version] => Ok(name.to_string()),
                _ => Err(HandlerError::Unsupported(format!(
                    "unexpected pacman -Q line: {:?}",
                    line
                ))),
            })
            .collect()
    }

    async fn upgrade_all(&self) -> Result<(), HandlerError> {
        info!("Upgrading all packages");
        run_checked(self.exec.as_ref(), PACMAN, &["-Syu", "--noconfirm"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testing::RecordingExec;

    #[tokio::test]
    async fn test_commands() {
        let exec = Arc::new(RecordingExec::new());
        let pacman = Pacman::new(exec.clone());

        pacman.install("vim").await.unwrap();
        pacman.remove("nano").await.unwrap();
        pacman.upgrade_all().await.unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "/usr/bin/pacman -Sy --needed --noconfirm vim",
                "/usr/bin/pacman -Rcs --noconfirm nano",
                "/usr/bin/pacman -Syu --noconfirm",
            ]
        );
    }

    #[tokio::test]
    async fn test_list() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond(PACMAN, 0, "bash 5.2.026-2\nvim 9.1.0-1\n");
        let pacman = Pacman::new(exec);

        assert_eq!(pacman.list().await.unwrap(), vec!["bash", "vim"]);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_output() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond(PACMAN, 0, "error: something odd happened\n");
        let pacman = Pacman::new(exec);

        assert!(pacman.list().await.is_err());
    }

    #[tokio::test]
    async fn test_install_failure() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond(PACMAN, 1, "");
        let pacman = Pacman::new(exec);

        let err = pacman.install("nope").await.unwrap_err();
        assert!(matches!(err, HandlerError::CommandFailed { exit_code: 1, .. }));
    }
}
