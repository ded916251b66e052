// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Convergence Reconciler
//!
//! Drives one host toward a `ConfigSet`. Phases run in a fixed order,
//! packages, files, services, execs, because the service and exec phases
//! fire on the files changed earlier in the same pass.
//!
//! Every phase compares live state before acting, so a second pass with no
//! external change performs no writes and reports no changed files.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Idempotent package/file/service/exec convergence

use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::config_set::{
    ConfigSet, Exec, File, FileEnsure, PackageEnsure, Package, Service, ServiceEnsure,
    UnrecognizedEnsure,
};
use crate::domain::node::{labels_match, ManagedNode};
use crate::domain::repository::{ReferenceRepository, RepositoryError};
use crate::domain::system::{parse_mode, FileKind, HandlerError, ServiceStatus, System};
use crate::domain::template::{TemplateError, TemplateRenderer};

/// Directories are created with this mode unless one is declared.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Restart,
    Exec,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Restart => f.write_str("restart"),
            TriggerKind::Exec => f.write_str("exec"),
        }
    }
}

/// A file-triggered side effect that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerFailure {
    pub kind: TriggerKind,
    pub target: String,
    pub error: String,
}

impl fmt::Display for TriggerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.target, self.error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvergenceError {
    #[error(transparent)]
    UnrecognizedValue(#[from] UnrecognizedEnsure),

    #[error("package {operation} {name:?}: {source}")]
    Package {
        operation: &'static str,
        name: String,
        #[source]
        source: HandlerError,
    },

    #[error("file {path:?}: {source}")]
    File {
        path: String,
        #[source]
        source: HandlerError,
    },

    #[error("reference {name:?} for file {path:?}: {source}")]
    Reference {
        path: String,
        name: String,
        #[source]
        source: RepositoryError,
    },

    #[error("template for {path:?}: {source}")]
    Template {
        path: String,
        #[source]
        source: TemplateError,
    },

    #[error("service {operation} {name:?}: {source}")]
    Service {
        operation: &'static str,
        name: String,
        #[source]
        source: HandlerError,
    },

    /// Triggered restarts or execs failed; every other trigger still ran.
    #[error("{} trigger(s) failed: {}", .failures.len(), join_failures(.failures))]
    Triggers {
        changed_files: Vec<String>,
        failures: Vec<TriggerFailure>,
    },
}

fn join_failures(failures: &[TriggerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn file_err(path: &str) -> impl FnOnce(HandlerError) -> ConvergenceError + '_ {
    move |source| ConvergenceError::File {
        path: path.to_string(),
        source,
    }
}

fn content_digest(content: &[u8]) -> [u8; 32] {
    Sha256::digest(content).into()
}

pub struct ConfigSetReconciler {
    system: System,
    references: Arc<dyn ReferenceRepository>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl ConfigSetReconciler {
    pub fn new(
        system: System,
        references: Arc<dyn ReferenceRepository>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            system,
            references,
            renderer,
        }
    }

    /// Converge this host toward `config_set`. Returns the paths changed in
    /// this pass; a ConfigSet whose selector does not match `node` is a no-op.
    pub async fn reconcile(
        &self,
        config_set: &ConfigSet,
        node: &ManagedNode,
    ) -> Result<Vec<String>, ConvergenceError> {
        let name = &config_set.metadata.name;
        if !labels_match(node.labels(), config_set.selector()) {
            debug!(configset = %name, node = node.name(), "Node labels do not match ConfigSet selector");
            return Ok(Vec::new());
        }

        let spec = &config_set.spec;
        self.converge_packages(&spec.packages).await?;
        let changed_files = self
            .converge_files(&config_set.metadata.namespace, &spec.files, node)
            .await?;

        if !changed_files.is_empty() {
            metrics::counter!("fleetkeeper_files_changed_total").increment(changed_files.len() as u64);
            info!(configset = %name, files = ?changed_files, "Files changed");
        }

        let mut failures = self.converge_services(&spec.services, &changed_files).await?;
        failures.extend(self.run_triggered_execs(&spec.executions, &changed_files).await);

        if !failures.is_empty() {
            for failure in &failures {
                metrics::counter!("fleetkeeper_trigger_failures_total", "kind" => failure.kind.to_string())
                    .increment(1);
            }
            return Err(ConvergenceError::Triggers {
                changed_files,
                failures,
            });
        }

        Ok(changed_files)
    }

    // ========================================================================
    // Packages
    // ========================================================================

    async fn converge_packages(&self, packages: &[Package]) -> Result<(), ConvergenceError> {
        if packages.is_empty() {
            return Ok(());
        }

        let installed: BTreeSet<String> = self
            .system
            .packages
            .list()
            .await
            .map_err(|source| ConvergenceError::Package {
                operation: "list",
                name: String::new(),
                source,
            })?
            .into_iter()
            .collect();

        for package in packages {
            let present = installed.contains(&package.name);
            match package.ensure()? {
                PackageEnsure::Installed if !present => {
                    info!(package = %package.name, "Installing package");
                    self.system.packages.install(&package.name).await.map_err(|source| {
                        ConvergenceError::Package {
                            operation: "install",
                            name: package.name.clone(),
                            source,
                        }
                    })?;
                }
                PackageEnsure::Absent if present => {
                    info!(package = %package.name, "Removing package");
                    self.system.packages.remove(&package.name).await.map_err(|source| {
                        ConvergenceError::Package {
                            operation: "remove",
                            name: package.name.clone(),
                            source,
                        }
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    async fn converge_files(
        &self,
        namespace: &str,
        files: &[File],
        node: &ManagedNode,
    ) -> Result<Vec<String>, ConvergenceError> {
        // Parse every entry and resolve every reference before touching disk.
        let mut planned = Vec::with_capacity(files.len());
        for file in files {
            let ensure = file.ensure()?;
            let content = match ensure {
                FileEnsure::File if file.is_templated() => {
                    let context = self.render_context(namespace, file, node).await?;
                    let rendered = self.renderer.render(&file.template, &context).map_err(|source| {
                        ConvergenceError::Template {
                            path: file.path.clone(),
                            source,
                        }
                    })?;
                    Some(rendered)
                }
                _ => None,
            };
            planned.push((file, ensure, content));
        }

        let mut changed = Vec::new();
        for (file, ensure, rendered) in planned {
            let path = Path::new(&file.path);
            let touched = match ensure {
                FileEnsure::File => {
                    let content = rendered.as_deref().unwrap_or(file.content.as_str());
                    self.converge_file_content(file, path, content.as_bytes()).await?
                }
                FileEnsure::Directory => self.converge_directory(file, path).await?,
                FileEnsure::Symlink => self.converge_symlink(file, path).await?,
                FileEnsure::Absent => self.converge_absent(file, path).await?,
            };
            if touched {
                changed.push(file.path.clone());
            }
        }
        Ok(changed)
    }

    async fn render_context(
        &self,
        namespace: &str,
        file: &File,
        node: &ManagedNode,
    ) -> Result<serde_json::Value, ConvergenceError> {
        let labels = node.labels();
        let labels_only = json!({ "node": { "labels": labels } });

        let mut secrets = BTreeMap::new();
        for reference in &file.secret_refs {
            let name = self
                .renderer
                .render(reference, &labels_only)
                .map_err(|source| ConvergenceError::Template {
                    path: file.path.clone(),
                    source,
                })?;
            let data = self
                .references
                .secret(namespace, &name)
                .await
                .map_err(|source| ConvergenceError::Reference {
                    path: file.path.clone(),
                    name: name.clone(),
                    source,
                })?;
            for (key, value) in data {
                secrets.insert(key, String::from_utf8_lossy(&value).into_owned());
            }
        }

        let mut config_maps = BTreeMap::new();
        for name in &file.config_map_refs {
            let data = self
                .references
                .config_map(namespace, name)
                .await
                .map_err(|source| ConvergenceError::Reference {
                    path: file.path.clone(),
                    name: name.clone(),
                    source,
                })?;
            config_maps.extend(data);
        }

        Ok(json!({
            "node": {
                "labels": labels,
                "secrets": secrets,
                "config_maps": config_maps,
            }
        }))
    }

    async fn converge_file_content(
        &self,
        file: &File,
        path: &Path,
        content: &[u8],
    ) -> Result<bool, ConvergenceError> {
        let files = &self.system.files;
        let existing = files.read_content(path).await.map_err(file_err(&file.path))?;
        let exists = existing.is_some();
        let current = existing.unwrap_or_default();

        let mut written = false;
        if content_digest(content) != content_digest(&current) {
            info!(
                path = %file.path,
                sha256 = %hex::encode(content_digest(content)),
                "Writing file"
            );
            files
                .write_content_file(path, content)
                .await
                .map_err(file_err(&file.path))?;
            written = true;
        }

        if exists || written {
            self.apply_attributes(file, path).await?;
        }
        Ok(written)
    }

    async fn apply_attributes(&self, file: &File, path: &Path) -> Result<(), ConvergenceError> {
        let files = &self.system.files;
        files
            .chown(path, &file.owner, &file.group)
            .await
            .map_err(file_err(&file.path))?;
        if !file.mode.is_empty() {
            let mode = parse_mode(&file.mode).map_err(file_err(&file.path))?;
            files.set_mode(path, mode).await.map_err(file_err(&file.path))?;
        }
        Ok(())
    }

    async fn converge_directory(&self, file: &File, path: &Path) -> Result<bool, ConvergenceError> {
        let files = &self.system.files;
        let mode = if file.mode.is_empty() {
            None
        } else {
            Some(parse_mode(&file.mode).map_err(file_err(&file.path))?)
        };

        match files.kind(path).await.map_err(file_err(&file.path))? {
            None => {
                info!(path = %file.path, "Creating directory");
                files
                    .create_dir(path, mode.unwrap_or(DEFAULT_DIRECTORY_MODE))
                    .await
                    .map_err(file_err(&file.path))?;
                if !file.owner.is_empty() || !file.group.is_empty() {
                    files
                        .chown(path, &file.owner, &file.group)
                        .await
                        .map_err(file_err(&file.path))?;
                }
                Ok(true)
            }
            Some(FileKind::Directory) => {
                if let Some(mode) = mode {
                    files.set_mode(path, mode).await.map_err(file_err(&file.path))?;
                }
                Ok(false)
            }
            Some(other) => Err(ConvergenceError::File {
                path: file.path.clone(),
                source: HandlerError::Unsupported(format!(
                    "path exists as {:?}, expected a directory",
                    other
                )),
            }),
        }
    }

    async fn converge_symlink(&self, file: &File, path: &Path) -> Result<bool, ConvergenceError> {
        let files = &self.system.files;
        let target = Path::new(&file.target);
        let current = files.read_link(path).await.map_err(file_err(&file.path))?;
        if current.as_deref() == Some(target) {
            return Ok(false);
        }

        info!(path = %file.path, target = %file.target, "Linking file");
        if files.kind(path).await.map_err(file_err(&file.path))?.is_some() {
            files.remove(path).await.map_err(file_err(&file.path))?;
        }
        files
            .symlink(target, path)
            .await
            .map_err(file_err(&file.path))?;
        Ok(true)
    }

    async fn converge_absent(&self, file: &File, path: &Path) -> Result<bool, ConvergenceError> {
        let files = &self.system.files;
        if files.kind(path).await.map_err(file_err(&file.path))?.is_none() {
            return Ok(false);
        }
        info!(path = %file.path, "Removing file");
        files.remove(path).await.map_err(file_err(&file.path))?;
        Ok(true)
    }

    // ========================================================================
    // Services
    // ========================================================================

    /// Enable/disable, arguments and run state abort on failure; restarts
    /// triggered by changed files are collected as failures instead.
    async fn converge_services(
        &self,
        services: &[Service],
        changed_files: &[String],
    ) -> Result<Vec<TriggerFailure>, ConvergenceError> {
        let mut planned = Vec::with_capacity(services.len());
        let mut restarts: Vec<&str> = Vec::new();
        for service in services {
            let ensure = service.ensure()?;
            if ensure == ServiceEnsure::Running
                && service.subscribes_to_any(changed_files)
                && !restarts.contains(&service.name.as_str())
            {
                restarts.push(&service.name);
            }
            planned.push((service, ensure));
        }

        let handler = &self.system.services;
        for (service, ensure) in planned {
            let name = service.name.as_str();
            let svc_err = |operation: &'static str| {
                move |source: HandlerError| ConvergenceError::Service {
                    operation,
                    name: name.to_string(),
                    source,
                }
            };

            if service.enable {
                handler.enable(name).await.map_err(svc_err("enable"))?;
            } else {
                handler.disable(name).await.map_err(svc_err("disable"))?;
            }

            if !service.arguments.is_empty() {
                handler
                    .set_arguments(name, &service.arguments)
                    .await
                    .map_err(svc_err("set arguments"))?;
            }

            if ensure == ServiceEnsure::Unmanaged {
                continue;
            }

            let status = handler.status(name).await.unwrap_or_else(|e| {
                warn!(service = name, error = %e, "Failed to query service status");
                ServiceStatus::Unknown
            });

            match ensure {
                ServiceEnsure::Running if status != ServiceStatus::Running => {
                    info!(service = name, status = %status, "Starting service");
                    handler.start(name).await.map_err(svc_err("start"))?;
                }
                ServiceEnsure::Stopped if status != ServiceStatus::Stopped => {
                    info!(service = name, status = %status, "Stopping service");
                    handler.stop(name).await.map_err(svc_err("stop"))?;
                }
                _ => {}
            }
        }

        let mut failures = Vec::new();
        for name in restarts {
            info!(service = name, "Restarting service for changed files");
            if let Err(e) = handler.restart(name).await {
                warn!(service = name, error = %e, "Service restart failed");
                failures.push(TriggerFailure {
                    kind: TriggerKind::Restart,
                    target: name.to_string(),
                    error: e.to_string(),
                });
            }
        }
        Ok(failures)
    }

    // ========================================================================
    // Execs
    // ========================================================================

    async fn run_triggered_execs(&self, execs: &[Exec], changed_files: &[String]) -> Vec<TriggerFailure> {
        let mut seen: Vec<(&str, &[String])> = Vec::new();
        let mut failures = Vec::new();

        for exec in execs.iter().filter(|e| e.subscribes_to_any(changed_files)) {
            let key = (exec.command.as_str(), exec.args.as_slice());
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            let exec_display = exec.display();
            info!(command = %exec_display, "Running exec for changed files");
            let outcome = self
                .system
                .exec
                .run_command(&exec.command, &exec.args)
                .await
                .and_then(|output| output.check(exec_display.clone()));
            if let Err(e) = outcome {
                warn!(command = %exec_display, error = %e, "Exec failed");
                failures.push(TriggerFailure {
                    kind: TriggerKind::Exec,
                    target: exec_display,
                    error: e.to_string(),
                });
            }
        }
        failures
    }
}
