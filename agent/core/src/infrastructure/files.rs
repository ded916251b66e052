// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Local File Handler
//!
//! [`FileHandler`] over the host filesystem. Ownership and mode changes are
//! skipped when the path already matches, so repeated convergence passes do
//! not touch inode metadata.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Managed file primitives for the convergence reconciler

use async_trait::async_trait;
use nix::unistd::{Gid, Group, Uid, User};
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::system::{FileHandler, FileKind, HandlerError};

const MODE_MASK: u32 = 0o7777;

pub struct LocalFileHandler {
    default_owner: String,
    default_group: String,
}

impl LocalFileHandler {
    pub fn new(default_owner: impl Into<String>, default_group: impl Into<String>) -> Self {
        Self {
            default_owner: default_owner.into(),
            default_group: default_group.into(),
        }
    }

    fn resolve_ids(&self, owner: &str, group: &str) -> Result<(Uid, Gid), HandlerError> {
        let owner = if owner.is_empty() { &self.default_owner } else { owner };
        let group = if group.is_empty() { &self.default_group } else { group };

        let user = User::from_name(owner)
            .map_err(|e| HandlerError::io(owner, e.into()))?
            .ok_or_else(|| HandlerError::NotFound(format!("user {}", owner)))?;
        let group = Group::from_name(group)
            .map_err(|e| HandlerError::io(group, e.into()))?
            .ok_or_else(|| HandlerError::NotFound(format!("group {}", group)))?;

        Ok((user.uid, group.gid))
    }
}

fn not_found_as_none<T>(result: std::io::Result<T>, path: &Path) -> Result<Option<T>, HandlerError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HandlerError::io(path, e)),
    }
}

#[async_trait]
impl FileHandler for LocalFileHandler {
    async fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<(), HandlerError> {
        let (uid, gid) = self.resolve_ids(owner, group)?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| HandlerError::io(path, e))?;
        if metadata.uid() == uid.as_raw() && metadata.gid() == gid.as_raw() {
            return Ok(());
        }

        debug!(path = %path.display(), uid = uid.as_raw(), gid = gid.as_raw(), "Setting ownership");
        nix::unistd::chown(path, Some(uid), Some(gid)).map_err(|e| HandlerError::io(path, e.into()))
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> Result<(), HandlerError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| HandlerError::io(path, e))?;
        if metadata.permissions().mode() & MODE_MASK == mode & MODE_MASK {
            return Ok(());
        }

        debug!(path = %path.display(), mode = format!("{:o}", mode), "Setting mode");
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| HandlerError::io(path, e))
    }

    async fn write_content_file(&self, path: &Path, content: &[u8]) -> Result<(), HandlerError> {
        info!(path = %path.display(), bytes = content.len(), "Writing file");
        tokio::fs::write(path, content)
            .await
            .map_err(|e| HandlerError::io(path, e))
    }

    async fn remove(&self, path: &Path) -> Result<(), HandlerError> {
        let Some(metadata) = not_found_as_none(tokio::fs::symlink_metadata(path).await, path)? else {
            return Ok(());
        };

        // Only empty directories are removed.
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        not_found_as_none(result, path).map(|_| ())
    }

    async fn read_content(&self, path: &Path) -> Result<Option<Vec<u8>>, HandlerError> {
        not_found_as_none(tokio::fs::read(path).await, path)
    }

    async fn kind(&self, path: &Path) -> Result<Option<FileKind>, HandlerError> {
        let metadata = not_found_as_none(tokio::fs::symlink_metadata(path).await, path)?;
        Ok(metadata.map(|m| {
            let file_type = m.file_type();
            if file_type.is_symlink() {
                FileKind::Symlink
            } else if file_type.is_dir() {
                FileKind::Directory
            } else if file_type.is_file() {
                FileKind::File
            } else {
                FileKind::Other
            }
        }))
    }

    async fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, HandlerError> {
        match tokio::fs::read_link(path).await {
            Ok(target) => Ok(Some(target)),
            Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::InvalidInput => Ok(None),
            Err(e) => Err(HandlerError::io(path, e)),
        }
    }

    async fn create_dir(&self, path: &Path, mode: u32) -> Result<(), HandlerError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| HandlerError::io(path, e))?;
        self.set_mode(path, mode).await
    }

    async fn symlink(&self, target: &Path, path: &Path) -> Result<(), HandlerError> {
        tokio::fs::symlink(target, path)
            .await
            .map_err(|e| HandlerError::io(path, e))
    }
}
