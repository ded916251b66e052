// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! # ManagedNode Record
//!
//! One `ManagedNode` exists per host. Its labels describe the host identity
//! and upgrade-group membership, its annotations carry the upgrade
//! coordination state, and its spec declares the upgrade schedule.
//!
//! The record doubles as the fleet lock record: `locked-since` present means
//! the host holds its group's lock. Raw annotation strings are only read and
//! written through the typed accessors below.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const API_GROUP: &str = "fleetkeeper.io";
pub const API_VERSION: &str = "v1";

// Identity labels kept in sync with the host on every pass.
pub const LABEL_OS: &str = "kubernetes.io/os";
pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";
pub const LABEL_UPGRADE_GROUP: &str = "upgrade.fleetkeeper/group";

pub const ANNOTATION_LOCKED_SINCE: &str = "upgrade.fleetkeeper/locked-since";
pub const ANNOTATION_LAST_UPGRADE: &str = "upgrade.fleetkeeper/last-upgrade";

/// Store key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kubernetes-style object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Optimistic concurrency token; updates are rejected when stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradeSpec {
    /// Upgrade group; at most one member reboots at a time.
    #[serde(default)]
    pub group: String,

    /// Cron expression of upgrade windows.
    #[serde(default)]
    pub schedule: String,

    /// Minimum time between two completed upgrades (humantime, e.g. "24h").
    #[serde(default)]
    pub delay: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedNodeSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    #[serde(default)]
    pub upgrade: UpgradeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedNodeStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNode {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ManagedNodeSpec,

    #[serde(default)]
    pub status: ManagedNodeStatus,
}

fn default_api_version() -> String {
    format!("{}/{}", API_GROUP, API_VERSION)
}

fn default_kind() -> String {
    "ManagedNode".to_string()
}

impl ManagedNode {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            spec: ManagedNodeSpec::default(),
            status: ManagedNodeStatus::default(),
        }
    }

    pub fn key(&self) -> NamespacedName {
        self.metadata.key()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    /// Raw `locked-since` value, `None` when absent or empty.
    pub fn locked_since_raw(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ANNOTATION_LOCKED_SINCE)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn holds_lock(&self) -> bool {
        self.locked_since_raw().is_some()
    }

    pub fn set_locked_since(&mut self, at: DateTime<Utc>) {
        self.metadata
            .annotations
            .insert(ANNOTATION_LOCKED_SINCE.to_string(), format_timestamp(at));
    }

    pub fn clear_locked_since(&mut self) {
        self.metadata.annotations.remove(ANNOTATION_LOCKED_SINCE);
    }

    /// Parsed `last-upgrade`; `Ok(None)` when the node never completed a cycle.
    pub fn last_upgrade(&self) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
        match self.metadata.annotations.get(ANNOTATION_LAST_UPGRADE) {
            Some(raw) if !raw.is_empty() => parse_timestamp(raw).map(Some),
            _ => Ok(None),
        }
    }

    pub fn set_last_upgrade(&mut self, at: DateTime<Utc>) {
        self.metadata
            .annotations
            .insert(ANNOTATION_LAST_UPGRADE.to_string(), format_timestamp(at));
    }

    /// Merge `desired` into the label set. Returns true when anything changed.
    pub fn merge_labels(&mut self, desired: &BTreeMap<String, String>) -> bool {
        let mut changed = false;
        for (key, value) in desired {
            if self.metadata.labels.get(key) != Some(value) {
                self.metadata.labels.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

/// Label gate: every selector key must be present with an equal value.
pub fn labels_match(labels: &BTreeMap<String, String>, selector: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}
