// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only store client backed by a running caching proxy, together with
//! the JSON documents the proxy exchanges.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::{Labels, SecretEntry, SecretStoreClient, StoreEntry, StoreError};

/// Body of `GET /list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyListing {
    #[serde(default, deserialize_with = "null_as_default")]
    pub secrets: Vec<ProxySecret>,
}

/// Identity of one secret as reported by the proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxySecret {
    pub short_name: String,
    pub full_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Labels,
}

/// Body of `GET /get`; `data` is base64 without padding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxySecretDetail {
    pub proxy_secret: ProxySecret,
    pub data: String,
}

impl ProxySecret {
    pub fn from_entry(entry: &dyn SecretEntry) -> Self {
        Self {
            short_name: entry.short_name().to_string(),
            full_name: entry.full_name().to_string(),
            labels: entry.labels(),
        }
    }
}

impl ProxySecretDetail {
    pub fn new(entry: &dyn SecretEntry, data: &[u8]) -> Self {
        Self {
            proxy_secret: ProxySecret::from_entry(entry),
            data: STANDARD_NO_PAD.encode(data),
        }
    }

    pub fn decode_data(&self) -> Result<Vec<u8>, StoreError> {
        STANDARD_NO_PAD
            .decode(self.data.trim_end_matches('='))
            .map_err(|e| StoreError::Upstream(format!("proxy base64 failed: {e}")))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Store client that reads through a caching proxy for one project.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    address: Arc<str>,
    project: Arc<str>,
}

impl ProxyClient {
    /// `address` is the proxy base URL, e.g. `http://127.0.0.1:8080`.
    pub fn new(address: &str, project: &str) -> Self {
        Self::with_http_client(reqwest::Client::new(), address, project)
    }

    pub fn with_http_client(http: reqwest::Client, address: &str, project: &str) -> Self {
        Self {
            http,
            address: Arc::from(address.trim_end_matches('/')),
            project: Arc::from(project),
        }
    }

    async fn json_request<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, StoreError> {
        let query: Vec<String> = query
            .iter()
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect();
        let url = format!("{}/{path}?{}", self.address, query.join("&"));

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Upstream(format!(
                "proxy/{path} failed: request status not ok: {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| StoreError::Upstream(format!("proxy/{path} failed: body parsing failed: {e}")))
    }
}

#[async_trait]
impl SecretStoreClient for ProxyClient {
    async fn list_keys(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let listing: ProxyListing = self
            .json_request("list", &[("project", &*self.project)])
            .await?;

        Ok(listing
            .secrets
            .into_iter()
            .map(|secret| {
                Arc::new(ProxyEntry {
                    client: self.clone(),
                    secret,
                }) as StoreEntry
            })
            .collect())
    }

    async fn get(&self, name: &str) -> Result<StoreEntry, StoreError> {
        self.list_keys()
            .await?
            .into_iter()
            .find(|entry| entry.short_name() == name || entry.full_name() == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create(&self, _short_name: &str, _labels: Labels) -> Result<StoreEntry, StoreError> {
        Err(StoreError::ReadOnly)
    }
}

#[derive(Debug)]
struct ProxyEntry {
    client: ProxyClient,
    secret: ProxySecret,
}

#[async_trait]
impl SecretEntry for ProxyEntry {
    fn full_name(&self) -> &str {
        &self.secret.full_name
    }

    fn short_name(&self) -> &str {
        &self.secret.short_name
    }

    fn labels(&self) -> Labels {
        self.secret.labels.clone()
    }

    async fn set_labels(&self, _labels: Labels) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    async fn get_value(&self) -> Result<Vec<u8>, StoreError> {
        let detail: ProxySecretDetail = self
            .client
            .json_request(
                "get",
                &[
                    ("project", &*self.client.project),
                    ("shortName", self.secret.short_name.as_str()),
                    ("fullName", self.secret.full_name.as_str()),
                ],
            )
            .await?;
        detail.decode_data()
    }

    async fn set_value(&self, _data: &[u8]) -> Result<String, StoreError> {
        Err(StoreError::ReadOnly)
    }
}
