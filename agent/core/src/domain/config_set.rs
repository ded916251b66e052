// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! # ConfigSet Record
//!
//! Declarative host configuration: packages, files, services and
//! file-triggered commands. A ConfigSet applies to every node whose labels
//! satisfy the ConfigSet's own metadata labels.
//!
//! `ensure` values travel as plain strings so that a record with an unknown
//! value still deserializes; each entry is parsed when it is applied and an
//! unknown value aborts that phase.

use crate::domain::node::{ObjectMeta, API_GROUP, API_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized ensure value {value:?} for {kind} {name:?}")]
pub struct UnrecognizedEnsure {
    pub kind: &'static str,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageEnsure {
    Installed,
    Absent,
}

impl FromStr for PackageEnsure {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installed" => Ok(Self::Installed),
            "absent" => Ok(Self::Absent),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEnsure {
    File,
    Directory,
    Symlink,
    Absent,
}

impl FromStr for FileEnsure {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "file" => Ok(Self::File),
            "directory" => Ok(Self::Directory),
            "symlink" => Ok(Self::Symlink),
            "absent" => Ok(Self::Absent),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FileEnsure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Absent => "absent",
        };
        f.write_str(s)
    }
}

/// Desired run state of a service. `Unmanaged` leaves it as found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEnsure {
    Running,
    Stopped,
    Unmanaged,
}

impl FromStr for ServiceEnsure {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "" => Ok(Self::Unmanaged),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,

    #[serde(default)]
    pub ensure: String,
}

impl Package {
    pub fn ensure(&self) -> Result<PackageEnsure, UnrecognizedEnsure> {
        self.ensure.parse().map_err(|_| UnrecognizedEnsure {
            kind: "package",
            name: self.name.clone(),
            value: self.ensure.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub path: String,

    #[serde(default)]
    pub ensure: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    /// Inline template rendered with node labels, secrets and config maps.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,

    /// Symlink target.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_refs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_map_refs: Vec<String>,
}

impl File {
    pub fn ensure(&self) -> Result<FileEnsure, UnrecognizedEnsure> {
        self.ensure.parse().map_err(|_| UnrecognizedEnsure {
            kind: "file",
            name: self.path.clone(),
            value: self.ensure.clone(),
        })
    }

    pub fn is_templated(&self) -> bool {
        !self.template.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,

    #[serde(default)]
    pub enable: bool,

    #[serde(default)]
    pub ensure: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arguments: String,

    #[serde(default, rename = "subscribe_files", skip_serializing_if = "Vec::is_empty")]
    pub subscribe_files: Vec<String>,
}

impl Service {
    pub fn ensure(&self) -> Result<ServiceEnsure, UnrecognizedEnsure> {
        self.ensure.parse().map_err(|_| UnrecognizedEnsure {
            kind: "service",
            name: self.name.clone(),
            value: self.ensure.clone(),
        })
    }

    pub fn subscribes_to_any(&self, changed: &[String]) -> bool {
        self.subscribe_files.iter().any(|f| changed.contains(f))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exec {
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, rename = "subscribe_files", skip_serializing_if = "Vec::is_empty")]
    pub subscribe_files: Vec<String>,
}

impl Exec {
    pub fn subscribes_to_any(&self, changed: &[String]) -> bool {
        self.subscribe_files.iter().any(|f| changed.contains(f))
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSetSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executions: Vec<Exec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSet {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ConfigSetSpec,
}

fn default_api_version() -> String {
    format!("{}/{}", API_GROUP, API_VERSION)
}

fn default_kind() -> String {
    "ConfigSet".to_string()
}

impl ConfigSet {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: ConfigSetSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            spec,
        }
    }

    /// Node label selector of this ConfigSet.
    pub fn selector(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_parsing() {
        let pkg = Package {
            name: "vim".into(),
            ensure: "installed".into(),
        };
        assert_eq!(pkg.ensure().unwrap(), PackageEnsure::Installed);

        let pkg = Package {
            name: "vim".into(),
            ensure: "latest".into(),
        };
        let err = pkg.ensure().unwrap_err();
        assert_eq!(err.kind, "package");
        assert_eq!(err.value, "latest");

        let file = File {
            path: "/etc/motd".into(),
            ..Default::default()
        };
        assert_eq!(file.ensure().unwrap(), FileEnsure::File);

        let svc = Service {
            name: "sshd".into(),
            ensure: "sleeping".into(),
            ..Default::default()
        };
        assert!(svc.ensure().is_err());
    }

    #[test]
    fn test_config_set_yaml() {
        let yaml = r#"
apiVersion: fleetkeeper.io/v1
kind: ConfigSet
metadata:
  name: base
  namespace: default
  labels:
    role: db
spec:
  packages:
    - name: postgresql
      ensure: installed
  files:
    - path: /etc/postgresql/postgresql.conf
      template: "listen_addresses = '{{node.labels.role}}'"
      secretRefs: ["pg-{{node.labels.role}}"]
      mode: "0644"
  services:
    - name: postgresql
      enable: true
      ensure: running
      subscribe_files: ["/etc/postgresql/postgresql.conf"]
  executions:
    - command: /usr/bin/logger
      args: ["reloaded"]
      subscribe_files: ["/etc/postgresql/postgresql.conf"]
"#;
        let cs = ConfigSet::from_yaml_str(yaml).unwrap();
        assert_eq!(cs.selector().get("role").map(String::as_str), Some("db"));
        assert_eq!(cs.spec.files[0].secret_refs, vec!["pg-{{node.labels.role}}"]);
        assert!(cs.spec.files[0].is_templated());
        assert!(cs.spec.services[0]
            .subscribes_to_any(&["/etc/postgresql/postgresql.conf".to_string()]));
        assert_eq!(cs.spec.executions[0].display(), "/usr/bin/logger reloaded");
    }
}
