// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the integration tests: recording OS handlers and an
//! in-memory filesystem.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleetkeeper_core::domain::system::{
    CommandOutput, ExecHandler, FileHandler, FileKind, HandlerError, NodeHandler, PackageHandler,
    ServiceHandler, ServiceStatus, SysInfo, System,
};

// ============================================================================
// Packages
// ============================================================================

#[derive(Default)]
pub struct FakePackages {
    installed: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
    fail_upgrade: Mutex<bool>,
}

impl FakePackages {
    pub fn with_installed(names: &[&str]) -> Self {
        let fake = Self::default();
        fake.installed.lock().extend(names.iter().map(|n| n.to_string()));
        fake
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn installed(&self) -> BTreeSet<String> {
        self.installed.lock().clone()
    }

    pub fn fail_upgrade(&self, fail: bool) {
        *self.fail_upgrade.lock() = fail;
    }
}

#[async_trait]
impl PackageHandler for FakePackages {
    async fn install(&self, name: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("install {}", name));
        self.installed.lock().insert(name.to_string());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("remove {}", name));
        self.installed.lock().remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, HandlerError> {
        Ok(self.installed.lock().iter().cloned().collect())
    }

    async fn upgrade_all(&self) -> Result<(), HandlerError> {
        self.calls.lock().push("upgrade_all".to_string());
        if *self.fail_upgrade.lock() {
            return Err(HandlerError::CommandFailed {
                command: "upgrade".into(),
                exit_code: 1,
                stderr: "mirror unreachable".into(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Default)]
pub struct FakeServices {
    running: Mutex<BTreeSet<String>>,
    enabled: Mutex<BTreeSet<String>>,
    failing_restarts: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn set_running(&self, name: &str) {
        self.running.lock().insert(name.to_string());
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().contains(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.lock().contains(name)
    }

    pub fn fail_restart(&self, name: &str) {
        self.failing_restarts.lock().insert(name.to_string());
    }
}

#[async_trait]
impl ServiceHandler for FakeServices {
    async fn enable(&self, name: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("enable {}", name));
        self.enabled.lock().insert(name.to_string());
        Ok(())
    }

    async fn disable(&self, name: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("disable {}", name));
        self.enabled.lock().remove(name);
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("start {}", name));
        self.running.lock().insert(name.to_string());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("stop {}", name));
        self.running.lock().remove(name);
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("restart {}", name));
        if self.failing_restarts.lock().contains(name) {
            return Err(HandlerError::CommandFailed {
                command: format!("restart {}", name),
                exit_code: 1,
                stderr: "unit failed".into(),
            });
        }
        self.running.lock().insert(name.to_string());
        Ok(())
    }

    async fn set_arguments(&self, name: &str, arguments: &str) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("args {} {}", name, arguments));
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ServiceStatus, HandlerError> {
        Ok(if self.running.lock().contains(name) {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        })
    }
}

// ============================================================================
// Files
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(Vec<u8>),
    Directory,
    Symlink(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub entry: Entry,
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

/// Filesystem kept in a map. Counts content writes so idempotence can be
/// asserted.
#[derive(Default)]
pub struct MemoryFs {
    entries: Mutex<BTreeMap<PathBuf, Inode>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryFs {
    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.entries.lock().insert(
            PathBuf::from(path),
            Inode {
                entry: Entry::File(content.to_vec()),
                mode: 0o644,
                owner: "root".into(),
                group: "root".into(),
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<Inode> {
        self.entries.lock().get(Path::new(path)).cloned()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        match self.get(path)?.entry {
            Entry::File(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            _ => None,
        }
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().clone()
    }

    fn missing(path: &Path) -> HandlerError {
        HandlerError::io(path, std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}

#[async_trait]
impl FileHandler for MemoryFs {
    async fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<(), HandlerError> {
        let mut entries = self.entries.lock();
        let inode = entries.get_mut(path).ok_or_else(|| Self::missing(path))?;
        inode.owner = if owner.is_empty() { "root".into() } else { owner.into() };
        inode.group = if group.is_empty() { "root".into() } else { group.into() };
        Ok(())
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> Result<(), HandlerError> {
        let mut entries = self.entries.lock();
        let inode = entries.get_mut(path).ok_or_else(|| Self::missing(path))?;
        inode.mode = mode;
        Ok(())
    }

    async fn write_content_file(&self, path: &Path, content: &[u8]) -> Result<(), HandlerError> {
        self.writes.lock().push(path.to_path_buf());
        let mut entries = self.entries.lock();
        let inode = entries.entry(path.to_path_buf()).or_insert_with(|| Inode {
            entry: Entry::File(Vec::new()),
            mode: 0o644,
            owner: "root".into(),
            group: "root".into(),
        });
        inode.entry = Entry::File(content.to_vec());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), HandlerError> {
        self.entries.lock().remove(path);
        Ok(())
    }

    async fn read_content(&self, path: &Path) -> Result<Option<Vec<u8>>, HandlerError> {
        Ok(match self.entries.lock().get(path).map(|i| &i.entry) {
            Some(Entry::File(bytes)) => Some(bytes.clone()),
            Some(_) => Some(Vec::new()),
            None => None,
        })
    }

    async fn kind(&self, path: &Path) -> Result<Option<FileKind>, HandlerError> {
        Ok(self.entries.lock().get(path).map(|i| match i.entry {
            Entry::File(_) => FileKind::File,
            Entry::Directory => FileKind::Directory,
            Entry::Symlink(_) => FileKind::Symlink,
        }))
    }

    async fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, HandlerError> {
        Ok(match self.entries.lock().get(path).map(|i| &i.entry) {
            Some(Entry::Symlink(target)) => Some(target.clone()),
            _ => None,
        })
    }

    async fn create_dir(&self, path: &Path, mode: u32) -> Result<(), HandlerError> {
        self.entries.lock().insert(
            path.to_path_buf(),
            Inode {
                entry: Entry::Directory,
                mode,
                owner: "root".into(),
                group: "root".into(),
            },
        );
        Ok(())
    }

    async fn symlink(&self, target: &Path, path: &Path) -> Result<(), HandlerError> {
        self.entries.lock().insert(
            path.to_path_buf(),
            Inode {
                entry: Entry::Symlink(target.to_path_buf()),
                mode: 0o777,
                owner: "root".into(),
                group: "root".into(),
            },
        );
        Ok(())
    }
}

// ============================================================================
// Exec and node
// ============================================================================

#[derive(Default)]
pub struct FakeExec {
    calls: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<String>>,
}

impl FakeExec {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn fail(&self, command: &str) {
        self.failing.lock().insert(command.to_string());
    }
}

#[async_trait]
impl ExecHandler for FakeExec {
    async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, HandlerError> {
        let line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().push(line);
        let exit_code = if self.failing.lock().contains(command) { 1 } else { 0 };
        Ok(CommandOutput {
            exit_code,
            ..Default::default()
        })
    }
}

pub struct FakeNode {
    info: Mutex<SysInfo>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeNode {
    pub fn new(info: SysInfo) -> Self {
        Self {
            info: Mutex::new(info),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn rebooted(&self) -> bool {
        self.calls.lock().contains(&"reboot")
    }
}

#[async_trait]
impl NodeHandler for FakeNode {
    async fn info(&self) -> Result<SysInfo, HandlerError> {
        Ok(self.info.lock().clone())
    }

    async fn upgrade(&self) -> Result<(), HandlerError> {
        self.calls.lock().push("upgrade");
        Ok(())
    }

    async fn reboot(&self) {
        self.calls.lock().push("reboot");
    }

    fn hostname(&self) -> Result<String, HandlerError> {
        Ok(self.info.lock().hostname.clone())
    }
}

// ============================================================================
// Host
// ============================================================================

pub fn sys_info(hostname: &str) -> SysInfo {
    SysInfo {
        os_id: "arch".into(),
        os_release: "6.9.7-arch1-1".into(),
        arch: "x86_64".into(),
        hostname: hostname.into(),
    }
}

/// One fake host; `system()` hands out the adapter set.
pub struct FakeHost {
    pub packages: Arc<FakePackages>,
    pub services: Arc<FakeServices>,
    pub files: Arc<MemoryFs>,
    pub exec: Arc<FakeExec>,
    pub node: Arc<FakeNode>,
}

impl FakeHost {
    pub fn new(hostname: &str) -> Self {
        Self::with_packages(hostname, FakePackages::default())
    }

    pub fn with_packages(hostname: &str, packages: FakePackages) -> Self {
        Self {
            packages: Arc::new(packages),
            services: Arc::new(FakeServices::default()),
            files: Arc::new(MemoryFs::default()),
            exec: Arc::new(FakeExec::default()),
            node: Arc::new(FakeNode::new(sys_info(hostname))),
        }
    }

    pub fn system(&self) -> System {
        System {
            packages: self.packages.clone(),
            services: self.services.clone(),
            files: self.files.clone(),
            exec: self.exec.clone(),
            node: self.node.clone(),
        }
    }
}
