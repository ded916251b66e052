// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Alpine Linux `apk` adapter.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::info;

use crate::domain::system::{ExecHandler, HandlerError, PackageHandler};
use crate::infrastructure::command::run_checked;

const APK: &str = "/sbin/apk";

/// `name-version-rN arch {origin} (license) [installed]`
fn installed_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+)-([^-]+)-r([^-]+) (\S+) \{(\S+)\} \((.+?)\) \[(\w+)\]$")
            .expect("apk list pattern is a valid regex")
    })
}

/// Package names from `apk list -I` output. Lines that do not match are skipped.
pub fn parse_installed(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| installed_line().captures(line.trim_end()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

pub struct Apk {
    exec: Arc<dyn ExecHandler>,
}

impl Apk {
    pub fn new(exec: Arc<dyn ExecHandler>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl PackageHandler for Apk {
    async fn install(&self, name: &str) -> Result<(), HandlerError> {
        info!(package = %name, "Installing package");
        run_checked(self.exec.as_ref(), APK, &["add", name]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), HandlerError> {
        info!(package = %name, "Removing package");
        run_checked(self.exec.as_ref(), APK, &["del", name]).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, HandlerError> {
        let output = run_checked(self.exec.as_ref(), APK, &["list", "-I"]).await?;
        Ok(parse_installed(&output.stdout))
    }

    async fn upgrade_all(&self) -> Result<(), HandlerError> {
        info!("Upgrading all packages");
        run_checked(self.exec.as_ref(), APK, &["update"]).await?;
        run_checked(self.exec.as_ref(), APK, &["upgrade"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testing::RecordingExec;

    #[test]
    fn test_parse_installed() {
        let output = "\
alpine-baselayout-3.6.5-r0 x86_64 {alpine-baselayout} (GPL-2.0-only) [installed]
ca-certificates-bundle-20240705-r0 x86_64 {ca-certificates} (MPL-2.0 AND MIT) [installed]
WARNING: opening from cache https://dl-cdn.alpinelinux.org/alpine/v3.20/main: No such file
musl-1.2.5-r0 x86_64 {musl} (MIT) [installed]
";
        assert_eq!(
            parse_installed(output),
            vec!["alpine-baselayout", "ca-certificates-bundle", "musl"]
        );
    }

    #[tokio::test]
    async fn test_commands() {
        let exec = Arc::new(RecordingExec::new());
        let apk = Apk::new(exec.clone());

        apk.install("curl").await.unwrap();
        apk.remove("wget").await.unwrap();
        apk.upgrade_all().await.unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "/sbin/apk add curl",
                "/sbin/apk del wget",
                "/sbin/apk update",
                "/sbin/apk upgrade",
            ]
        );
    }

    #[tokio::test]
    async fn test_upgrade_stops_when_update_fails() {
        let exec = Arc::new(RecordingExec::new());
        exec.respond("/sbin/apk update", 1, "");
        let apk = Apk::new(exec.clone());

        assert!(apk.upgrade_all().await.is_err());
        assert_eq!(exec.calls(), vec!["/sbin/apk update"]);
    }
}
