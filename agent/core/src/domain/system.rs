// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! # OS Handler Interfaces
//!
//! One capability trait per handler kind. A concrete variant per operating
//! system lives in `crate::infrastructure`; the set is resolved once at
//! startup into a [`System`] and injected into the scheduler and reconciler.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Ports between coordination logic and host primitives

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::node::{LABEL_ARCH, LABEL_HOSTNAME, LABEL_OS};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("command `{command}` exited with {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid file mode: {0:?}")]
    InvalidMode(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl HandlerError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        HandlerError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Captured result of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `CommandFailed`.
    pub fn check(self, command: impl Into<String>) -> Result<Self, HandlerError> {
        if self.success() {
            Ok(self)
        } else {
            Err(HandlerError::CommandFailed {
                command: command.into(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    Unknown,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Host identity as reported by the node handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SysInfo {
    pub os_id: String,
    pub os_release: String,
    pub arch: String,
    pub hostname: String,
}

impl SysInfo {
    /// Identity labels published on the ManagedNode.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_OS.to_string(), self.os_id.clone()),
            (LABEL_ARCH.to_string(), self.arch.clone()),
            (LABEL_HOSTNAME.to_string(), self.hostname.clone()),
        ])
    }
}

#[async_trait]
pub trait PackageHandler: Send + Sync {
    async fn install(&self, name: &str) -> Result<(), HandlerError>;
    async fn remove(&self, name: &str) -> Result<(), HandlerError>;
    /// Names of installed packages.
    async fn list(&self) -> Result<Vec<String>, HandlerError>;
    async fn upgrade_all(&self) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn enable(&self, name: &str) -> Result<(), HandlerError>;
    async fn disable(&self, name: &str) -> Result<(), HandlerError>;
    async fn start(&self, name: &str) -> Result<(), HandlerError>;
    async fn stop(&self, name: &str) -> Result<(), HandlerError>;
    async fn restart(&self, name: &str) -> Result<(), HandlerError>;
    async fn set_arguments(&self, name: &str, arguments: &str) -> Result<(), HandlerError>;
    async fn status(&self, name: &str) -> Result<ServiceStatus, HandlerError>;
}

#[async_trait]
pub trait FileHandler: Send + Sync {
    /// Empty `owner`/`group` fall back to the handler's defaults.
    async fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<(), HandlerError>;
    async fn set_mode(&self, path: &Path, mode: u32) -> Result<(), HandlerError>;
    async fn write_content_file(&self, path: &Path, content: &[u8]) -> Result<(), HandlerError>;
    /// Removing a missing path succeeds.
    async fn remove(&self, path: &Path) -> Result<(), HandlerError>;

    /// File content, `None` when the path does not exist.
    async fn read_content(&self, path: &Path) -> Result<Option<Vec<u8>>, HandlerError>;
    /// Kind of the path itself (symlinks are not followed).
    async fn kind(&self, path: &Path) -> Result<Option<FileKind>, HandlerError>;
    async fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, HandlerError>;
    async fn create_dir(&self, path: &Path, mode: u32) -> Result<(), HandlerError>;
    async fn symlink(&self, target: &Path, path: &Path) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait ExecHandler: Send + Sync {
    /// Run a program to completion. A non-zero exit is reported in the output,
    /// not as an error.
    async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, HandlerError>;
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn info(&self) -> Result<SysInfo, HandlerError>;
    /// OS-level upgrade step, run after the package upgrade.
    async fn upgrade(&self) -> Result<(), HandlerError>;
    /// Fire-and-forget; failures are logged by the handler.
    async fn reboot(&self);
    fn hostname(&self) -> Result<String, HandlerError>;
}

/// Adapter set for the detected operating system.
#[derive(Clone)]
pub struct System {
    pub packages: Arc<dyn PackageHandler>,
    pub services: Arc<dyn ServiceHandler>,
    pub files: Arc<dyn FileHandler>,
    pub exec: Arc<dyn ExecHandler>,
    pub node: Arc<dyn NodeHandler>,
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System").finish_non_exhaustive()
    }
}

/// Parse a file mode the way `strtoul(s, 0)` would: `0x` hex, leading `0` or
/// `0o` octal, otherwise decimal.
pub fn parse_mode(raw: &str) -> Result<u32, HandlerError> {
    let s = raw.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        u32::from_str_radix(oct, 8)
    } else if s.len() > 1 && s.starts_with('0') {
        u32::from_str_radix(&s[1..], 8)
    } else {
        s.parse::<u32>()
    };
    match parsed {
        Ok(mode) if mode <= 0o7777 => Ok(mode),
        _ => Err(HandlerError::InvalidMode(raw.to_string())),
    }
}
