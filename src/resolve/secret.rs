// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use serde_json::Value;

use crate::schema::ConfigurationLeaf;
use crate::store::{StoreClient, StoreEntry, StoreError};

/// Where the value of one leaf comes from.
#[derive(Debug, Clone)]
pub enum ResolvedSecret {
    /// A secret in the store.
    Store(StoreSecret),
    /// Left to the application's own default or environment variable.
    Runtime(RuntimeSecret),
}

/// Store-backed resolution. When `entry` is absent the secret is looked up
/// by `key` at fetch time.
#[derive(Debug, Clone)]
pub struct StoreSecret {
    pub key: String,
    pub entry: Option<StoreEntry>,
    pub client: Option<StoreClient>,
}

#[derive(Debug, Clone)]
pub struct RuntimeSecret {
    pub leaf: ConfigurationLeaf,
}

impl ResolvedSecret {
    pub fn store(key: impl Into<String>, entry: Option<StoreEntry>, client: Option<StoreClient>) -> Self {
        ResolvedSecret::Store(StoreSecret {
            key: key.into(),
            entry,
            client,
        })
    }

    pub fn runtime(leaf: &ConfigurationLeaf) -> Self {
        ResolvedSecret::Runtime(RuntimeSecret { leaf: leaf.clone() })
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, ResolvedSecret::Runtime(_))
    }

    /// Provenance string embedded in rendered output.
    pub fn annotation(&self) -> String {
        match self {
            ResolvedSecret::Store(StoreSecret {
                entry: Some(entry), ..
            }) => format!("secretmanager(fullname: {})", entry.full_name()),
            other => other.to_string(),
        }
    }

    /// Fetch the payload. Runtime-backed secrets never carry one.
    pub async fn get_secret_value(&self) -> Result<Option<Value>, StoreError> {
        match self {
            ResolvedSecret::Runtime(_) => Ok(None),
            ResolvedSecret::Store(secret) => {
                let entry = match (&secret.entry, &secret.client) {
                    (Some(entry), _) => entry.clone(),
                    (None, Some(client)) => client.get(&secret.key).await?,
                    (None, None) => return Err(StoreError::NotFound(secret.key.clone())),
                };
                let data = entry.get_value().await?;
                let text = String::from_utf8(data)
                    .map_err(|_| StoreError::InvalidUtf8(entry.full_name().to_string()))?;
                Ok(Some(Value::String(text)))
            }
        }
    }
}

impl fmt::Display for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedSecret::Store(secret) => write!(f, "secretmanager(key: {})", secret.key),
            ResolvedSecret::Runtime(RuntimeSecret { leaf }) => {
                let mut sources = Vec::new();
                if let Some(env) = leaf.env.as_deref().filter(|e| !e.is_empty()) {
                    sources.push(format!("env: ${env}"));
                }
                if let Some(default) = &leaf.default_value {
                    sources.push(format!("default: {default}"));
                }
                write!(f, "runtime({})", sources.join(" or "))
            }
        }
    }
}
