// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Host identity from `/etc/os-release` and `uname -snrm`.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::domain::system::{ExecHandler, HandlerError, SysInfo};
use crate::infrastructure::command;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Lower-cased `ID` from os-release content. Values may be quoted.
pub fn parse_os_release_id(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (key, value) = line.trim().split_once('=')?;
        if key.trim() != "ID" {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        Some(value.to_lowercase())
    })
}

/// `(nodename, release, machine)` from `uname -snrm` output.
pub fn parse_uname(output: &str) -> Option<(String, String, String)> {
    let fields: Vec<&str> = output.split_whitespace().collect();
    match fields.as_slice() {
        [_kernel, nodename, release, machine] => {
            Some((nodename.to_string(), release.to_string(), machine.to_string()))
        }
        _ => None,
    }
}

#[derive(Clone)]
pub struct InfoResolver {
    exec: Arc<dyn ExecHandler>,
    os_release_path: PathBuf,
}

impl InfoResolver {
    pub fn new(exec: Arc<dyn ExecHandler>) -> Self {
        Self::with_path(exec, OS_RELEASE_PATH)
    }

    pub fn with_path(exec: Arc<dyn ExecHandler>, os_release_path: impl Into<PathBuf>) -> Self {
        Self {
            exec,
            os_release_path: os_release_path.into(),
        }
    }

    pub async fn os_id(&self) -> Result<String, HandlerError> {
        let content = tokio::fs::read_to_string(&self.os_release_path)
            .await
            .map_err(|e| HandlerError::io(&self.os_release_path, e))?;
        parse_os_release_id(&content).ok_or_else(|| {
            HandlerError::NotFound(format!("ID in {}", self.os_release_path.display()))
        })
    }

    pub async fn info(&self) -> Result<SysInfo, HandlerError> {
        let os_id = self.os_id().await?;

        let output = command::run_checked(self.exec.as_ref(), "uname", &["-snrm"]).await?;
        if let Some((hostname, os_release, arch)) = parse_uname(&output.stdout) {
            return Ok(SysInfo {
                os_id,
                os_release,
                arch,
                hostname,
            });
        }

        warn!(output = %output.stdout.trim(), "Unexpected uname output");
        Ok(SysInfo {
            os_id,
            os_release: String::new(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: local_hostname()?,
        })
    }
}

pub fn local_hostname() -> Result<String, HandlerError> {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .map_err(|e| HandlerError::io("hostname", e))
}
