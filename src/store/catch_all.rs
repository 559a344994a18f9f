// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Store that pretends every secret exists with an empty value.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Labels, SecretEntry, SecretStoreClient, StoreEntry, StoreError};

const STORE: &str = "catch-all store";

/// Dry-run store: any name resolves to an empty [`CatchAllEntry`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CatchAllClient;

/// Synthetic, empty-valued secret.
#[derive(Debug, Clone)]
pub struct CatchAllEntry {
    full_name: String,
    short_name: String,
}

impl CatchAllEntry {
    pub fn new(short_name: &str) -> Self {
        Self {
            full_name: format!("catch-all/{short_name}"),
            short_name: short_name.to_string(),
        }
    }
}

#[async_trait]
impl SecretStoreClient for CatchAllClient {
    async fn list_keys(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Ok(vec![Arc::new(CatchAllEntry::new("*"))])
    }

    async fn get(&self, short_name: &str) -> Result<StoreEntry, StoreError> {
        Ok(Arc::new(CatchAllEntry::new(short_name)))
    }

    async fn create(&self, _short_name: &str, _labels: Labels) -> Result<StoreEntry, StoreError> {
        Err(StoreError::Unsupported {
            store: STORE,
            operation: "create",
        })
    }
}

#[async_trait]
impl SecretEntry for CatchAllEntry {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn labels(&self) -> Labels {
        Labels::new()
    }

    async fn set_labels(&self, _labels: Labels) -> Result<(), StoreError> {
        Err(StoreError::Unsupported {
            store: STORE,
            operation: "set_labels",
        })
    }

    async fn get_value(&self) -> Result<Vec<u8>, StoreError> {
        Ok(Vec::new())
    }

    async fn set_value(&self, _data: &[u8]) -> Result<String, StoreError> {
        Err(StoreError::Unsupported {
            store: STORE,
            operation: "set_value",
        })
    }
}
