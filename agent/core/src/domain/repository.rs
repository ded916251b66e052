// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Contracts over the shared versioned record store. Every node in the fleet
//! reads and writes through these traits; the store's only coordination
//! primitive is the conditional update keyed on `resource_version`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `NodeRepository` | `ManagedNode` | `InMemoryNodeRepository`, `ControlPlaneRepository` |
//! | `ConfigSetRepository` | `ConfigSet` | `InMemoryConfigSetRepository`, `ControlPlaneRepository` |
//! | `ReferenceRepository` | Secrets / ConfigMaps | `InMemoryReferenceRepository`, `ControlPlaneRepository` |

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::config_set::ConfigSet;
use crate::domain::node::{ManagedNode, NamespacedName};

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn get(&self, key: &NamespacedName) -> Result<ManagedNode, RepositoryError>;

    /// Nodes in `namespace` whose labels satisfy every selector pair.
    async fn list(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedNode>, RepositoryError>;

    async fn create(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError>;

    /// Replace metadata and spec. Fails with `Conflict` when the record's
    /// `resource_version` no longer matches the stored one.
    async fn update(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError>;

    /// Replace status only, with the same version check as `update`.
    async fn update_status(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError>;
}

#[async_trait]
pub trait ConfigSetRepository: Send + Sync {
    async fn list(&self, namespace: &str) -> Result<Vec<ConfigSet>, RepositoryError>;

    async fn get(&self, key: &NamespacedName) -> Result<ConfigSet, RepositoryError>;
}

/// Key-value blobs referenced by templated files.
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    async fn secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, RepositoryError>;

    async fn config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict(_))
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        RepositoryError::Backend(err.to_string())
    }
}
