// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the store contracts defined in the
//! domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve ManagedNodes, ConfigSets and references
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## Control Plane
//!
//! - **ControlPlaneRepository** - Kubernetes-style REST store over `reqwest`
//!
//! ## In-Memory Repositories
//!
//! Versioned, linearizable stores for tests and one-shot `apply` runs:
//! - **InMemoryNodeRepository** - conditional updates on `resource_version`
//! - **InMemoryConfigSetRepository** - ConfigSet records by namespace
//! - **InMemoryReferenceRepository** - Secrets and ConfigMaps

pub mod control_plane;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::config_set::ConfigSet;
use crate::domain::node::{labels_match, ManagedNode, NamespacedName};
use crate::domain::repository::{
    ConfigSetRepository, NodeRepository, ReferenceRepository, RepositoryError,
};

pub use control_plane::ControlPlaneRepository;

#[derive(Debug, Default)]
struct VersionedNodes {
    records: HashMap<NamespacedName, ManagedNode>,
    next_version: u64,
}

impl VersionedNodes {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn current(&self, node: &ManagedNode) -> Result<&ManagedNode, RepositoryError> {
        let key = node.key();
        let stored = self
            .records
            .get(&key)
            .ok_or_else(|| RepositoryError::NotFound(format!("managednode {}", key)))?;
        if let Some(expected) = &node.metadata.resource_version {
            if stored.metadata.resource_version.as_ref() != Some(expected) {
                return Err(RepositoryError::Conflict(format!(
                    "managednode {} was modified (have {}, stored {})",
                    key,
                    expected,
                    stored.metadata.resource_version.as_deref().unwrap_or("-")
                )));
            }
        }
        Ok(stored)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNodeRepository {
    nodes: Arc<RwLock<VersionedNodes>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored node, ordered by key.
    pub fn snapshot(&self) -> Vec<ManagedNode> {
        let nodes = self.nodes.read();
        let mut all: Vec<ManagedNode> = nodes.records.values().cloned().collect();
        all.sort_by_key(|n| n.key());
        all
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn get(&self, key: &NamespacedName) -> Result<ManagedNode, RepositoryError> {
        let nodes = self.nodes.read();
        nodes
            .records
            .get(key)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("managednode {}", key)))
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedNode>, RepositoryError> {
        let nodes = self.nodes.read();
        let mut matched: Vec<ManagedNode> = nodes
            .records
            .values()
            .filter(|n| n.metadata.namespace == namespace && labels_match(n.labels(), selector))
            .cloned()
            .collect();
        matched.sort_by_key(|n| n.key());
        Ok(matched)
    }

    async fn create(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError> {
        let mut nodes = self.nodes.write();
        let key = node.key();
        if nodes.records.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!(
                "managednode {} already exists",
                key
            )));
        }
        let mut created = node.clone();
        created.metadata.resource_version = Some(nodes.bump());
        nodes.records.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError> {
        let mut nodes = self.nodes.write();
        let status = nodes.current(node)?.status.clone();
        let mut updated = node.clone();
        updated.status = status;
        updated.metadata.resource_version = Some(nodes.bump());
        nodes.records.insert(node.key(), updated.clone());
        Ok(updated)
    }

    async fn update_status(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError> {
        let mut nodes = self.nodes.write();
        let mut updated = nodes.current(node)?.clone();
        updated.status = node.status.clone();
        updated.metadata.resource_version = Some(nodes.bump());
        nodes.records.insert(node.key(), updated.clone());
        Ok(updated)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryConfigSetRepository {
    config_sets: Arc<RwLock<HashMap<NamespacedName, ConfigSet>>>,
}

impl InMemoryConfigSetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config_set: ConfigSet) {
        self.config_sets
            .write()
            .insert(config_set.metadata.key(), config_set);
    }
}

#[async_trait]
impl ConfigSetRepository for InMemoryConfigSetRepository {
    async fn list(&self, namespace: &str) -> Result<Vec<ConfigSet>, RepositoryError> {
        let config_sets = self.config_sets.read();
        let mut matched: Vec<ConfigSet> = config_sets
            .values()
            .filter(|cs| cs.metadata.namespace == namespace)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(matched)
    }

    async fn get(&self, key: &NamespacedName) -> Result<ConfigSet, RepositoryError> {
        self.config_sets
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("configset {}", key)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryReferenceRepository {
    secrets: Arc<RwLock<HashMap<NamespacedName, BTreeMap<String, Vec<u8>>>>>,
    config_maps: Arc<RwLock<HashMap<NamespacedName, BTreeMap<String, String>>>>,
}

impl InMemoryReferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data: BTreeMap<String, Vec<u8>>) {
        self.secrets
            .write()
            .insert(NamespacedName::new(namespace, name), data);
    }

    pub fn insert_config_map(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.config_maps
            .write()
            .insert(NamespacedName::new(namespace, name), data);
    }
}

#[async_trait]
impl ReferenceRepository for InMemoryReferenceRepository {
    async fn secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, RepositoryError> {
        let key = NamespacedName::new(namespace, name);
        self.secrets
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("secret {}", key)))
    }

    async fn config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, RepositoryError> {
        let key = NamespacedName::new(namespace, name);
        self.config_maps
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("configmap {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::LABEL_UPGRADE_GROUP;

    #[tokio::test]
    async fn test_conditional_update_rejects_stale_version() {
        let repo = InMemoryNodeRepository::new();
        let created = repo
            .create(&ManagedNode::new("default", "host-a"))
            .await
            .unwrap();

        let mut first = created.clone();
        first.metadata.annotations.insert("a".into(), "1".into());
        repo.update(&first).await.unwrap();

        let mut stale = created;
        stale.metadata.annotations.insert("b".into(), "2".into());
        let err = repo.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_preserves_status_and_status_update_preserves_metadata() {
        let repo = InMemoryNodeRepository::new();
        let mut node = repo
            .create(&ManagedNode::new("default", "host-a"))
            .await
            .unwrap();

        node.status.release = "6.1".into();
        let node = repo.update_status(&node).await.unwrap();

        let mut relabeled = node.clone();
        relabeled.status.release = "ignored".into();
        relabeled.metadata.labels.insert("role".into(), "db".into());
        let stored = repo.update(&relabeled).await.unwrap();

        assert_eq!(stored.status.release, "6.1");
        assert_eq!(stored.labels().get("role").map(String::as_str), Some("db"));
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let repo = InMemoryNodeRepository::new();
        for (ns, name, group) in [("default", "a", "g1"), ("default", "b", "g2"), ("other", "c", "g1")] {
            let mut node = ManagedNode::new(ns, name);
            node.metadata
                .labels
                .insert(LABEL_UPGRADE_GROUP.to_string(), group.to_string());
            repo.create(&node).await.unwrap();
        }

        let selector = BTreeMap::from([(LABEL_UPGRADE_GROUP.to_string(), "g1".to_string())]);
        let listed = repo.list("default", &selector).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name(), "a");

        assert_eq!(repo.list("default", &BTreeMap::new()).await.unwrap().len(), 2);
        assert!(repo
            .get(&NamespacedName::new("default", "zzz"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
