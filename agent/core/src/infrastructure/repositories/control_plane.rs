// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Control Plane Repository
//!
//! Kubernetes-style REST store for ManagedNodes, ConfigSets, Secrets and
//! ConfigMaps.
//!
//! # Endpoints
//!
//! - `/apis/{group}/{version}/namespaces/{ns}/managednodes[/{name}[/status]]`
//! - `/apis/{group}/{version}/namespaces/{ns}/configsets[/{name}]`
//! - `/api/v1/namespaces/{ns}/secrets/{name}` (values base64-decoded)
//! - `/api/v1/namespaces/{ns}/configmaps/{name}`
//!
//! Optimistic concurrency rides on `metadata.resourceVersion`: the server
//! answers a stale PUT with 409, which surfaces as `RepositoryError::Conflict`.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::domain::agent_config::StoreConfig;
use crate::domain::config_set::ConfigSet;
use crate::domain::node::{ManagedNode, NamespacedName};
use crate::domain::repository::{
    ConfigSetRepository, NodeRepository, ReferenceRepository, RepositoryError,
};

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DataObject<V> {
    #[serde(default = "BTreeMap::new")]
    data: BTreeMap<String, V>,
}

#[derive(Clone)]
pub struct ControlPlaneRepository {
    client: Client,
    base_url: String,
    group: String,
    version: String,
    token: Option<String>,
}

impl ControlPlaneRepository {
    pub fn new(
        base_url: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            group: group.into(),
            version: version.into(),
            token,
        }
    }

    /// Build from the store section of the agent config. A missing token file
    /// means unauthenticated requests.
    pub async fn from_config(config: &StoreConfig) -> Result<Self, RepositoryError> {
        let base_url = config
            .api_url
            .clone()
            .ok_or_else(|| RepositoryError::Backend("store.api_url is not set".to_string()))?;

        let token = match tokio::fs::read_to_string(&config.token_path).await {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %config.token_path.display(),
                    "Token file not found, using unauthenticated requests"
                );
                None
            }
            Err(e) => {
                return Err(RepositoryError::Backend(format!(
                    "failed to read token {}: {}",
                    config.token_path.display(),
                    e
                )))
            }
        };

        Ok(Self::new(base_url, &config.group, &config.version, token))
    }

    fn custom_path(&self, namespace: &str, plural: &str) -> String {
        format!(
            "{}/apis/{}/{}/namespaces/{}/{}",
            self.base_url, self.group, self.version, namespace, plural
        )
    }

    fn node_path(&self, key: &NamespacedName) -> String {
        format!("{}/{}", self.custom_path(&key.namespace, "managednodes"), key.name)
    }

    fn core_path(&self, namespace: &str, plural: &str, name: &str) -> String {
        format!("{}/api/v1/namespaces/{}/{}/{}", self.base_url, namespace, plural, name)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, RepositoryError> {
        let response = self.authorized(request).send().await?;
        let response = check_status(response, what).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = %status, body = %body, "Control plane request failed");
    Err(match status {
        StatusCode::NOT_FOUND => RepositoryError::NotFound(what.to_string()),
        StatusCode::CONFLICT => RepositoryError::Conflict(what.to_string()),
        _ => RepositoryError::Backend(format!("{} returned {}: {}", what, status, body.trim())),
    })
}

/// `k1=v1,k2=v2` label selector.
fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl NodeRepository for ControlPlaneRepository {
    async fn get(&self, key: &NamespacedName) -> Result<ManagedNode, RepositoryError> {
        let what = format!("managednode {}", key);
        self.send(self.client.get(self.node_path(key)), &what).await
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedNode>, RepositoryError> {
        let mut request = self.client.get(self.custom_path(namespace, "managednodes"));
        if !selector.is_empty() {
            request = request.query(&[("labelSelector", label_selector(selector))]);
        }
        let list: ObjectList<ManagedNode> = self
            .send(request, &format!("managednodes in {}", namespace))
            .await?;
        Ok(list.items)
    }

    async fn create(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError> {
        let key = node.key();
        let mut body = node.clone();
        body.metadata.resource_version = None;
        let request = self
            .client
            .post(self.custom_path(&key.namespace, "managednodes"))
            .json(&body);
        self.send(request, &format!("managednode {}", key)).await
    }

    async fn update(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError> {
        let key = node.key();
        let request = self.client.put(self.node_path(&key)).json(node);
        self.send(request, &format!("managednode {}", key)).await
    }

    async fn update_status(&self, node: &ManagedNode) -> Result<ManagedNode, RepositoryError> {
        let key = node.key();
        let request = self
            .client
            .put(format!("{}/status", self.node_path(&key)))
            .json(node);
        self.send(request, &format!("managednode {} status", key)).await
    }
}

#[async_trait]
impl ConfigSetRepository for ControlPlaneRepository {
    async fn list(&self, namespace: &str) -> Result<Vec<ConfigSet>, RepositoryError> {
        let request = self.client.get(self.custom_path(namespace, "configsets"));
        let list: ObjectList<ConfigSet> = self
            .send(request, &format!("configsets in {}", namespace))
            .await?;
        Ok(list.items)
    }

    async fn get(&self, key: &NamespacedName) -> Result<ConfigSet, RepositoryError> {
        let url = format!("{}/{}", self.custom_path(&key.namespace, "configsets"), key.name);
        self.send(self.client.get(url), &format!("configset {}", key)).await
    }
}

#[async_trait]
impl ReferenceRepository for ControlPlaneRepository {
    async fn secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, RepositoryError> {
        let url = self.core_path(namespace, "secrets", name);
        let secret: DataObject<String> = self
            .send(self.client.get(url), &format!("secret {}/{}", namespace, name))
            .await?;

        secret
            .data
            .into_iter()
            .map(|(key, encoded)| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map(|value| (key.clone(), value))
                    .map_err(|e| {
                        RepositoryError::Serialization(format!(
                            "secret {}/{} key {}: {}",
                            namespace, name, key, e
                        ))
                    })
            })
            .collect()
    }

    async fn config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, RepositoryError> {
        let url = self.core_path(namespace, "configmaps", name);
        let config_map: DataObject<String> = self
            .send(self.client.get(url), &format!("configmap {}/{}", namespace, name))
            .await?;
        Ok(config_map.data)
    }
}
