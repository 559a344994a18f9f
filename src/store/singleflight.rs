// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Store wrapper that collapses concurrent identical calls.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Labels, SecretEntry, SecretStoreClient, StoreClient, StoreEntry, StoreError};
use crate::flight::SingleFlight;

/// Wraps a [`StoreClient`] so that concurrent listings, concurrent lookups of
/// one name and concurrent value reads of one secret each reach the inner
/// client once. Nothing is retained after the call completes.
#[derive(Debug)]
pub struct SingleFlightClient {
    inner: StoreClient,
    listing: SingleFlight<(), Vec<StoreEntry>>,
    lookups: SingleFlight<String, StoreEntry>,
    values: Arc<SingleFlight<String, Vec<u8>>>,
}

impl SingleFlightClient {
    pub fn new(inner: StoreClient) -> Self {
        Self {
            inner,
            listing: SingleFlight::new(),
            lookups: SingleFlight::new(),
            values: Arc::new(SingleFlight::new()),
        }
    }

    fn wrap(&self, entry: StoreEntry) -> StoreEntry {
        Arc::new(SingleFlightEntry {
            inner: entry,
            values: self.values.clone(),
        })
    }
}

#[async_trait]
impl SecretStoreClient for SingleFlightClient {
    async fn list_keys(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let inner = self.inner.clone();
        let (result, _) = self
            .listing
            .run((), move || async move { inner.list_keys().await })
            .await;
        Ok(result?.into_iter().map(|entry| self.wrap(entry)).collect())
    }

    async fn get(&self, short_name: &str) -> Result<StoreEntry, StoreError> {
        let inner = self.inner.clone();
        let name = short_name.to_string();
        let (result, _) = self
            .lookups
            .run(short_name.to_string(), move || async move {
                inner.get(&name).await
            })
            .await;
        Ok(self.wrap(result?))
    }

    async fn create(&self, short_name: &str, labels: Labels) -> Result<StoreEntry, StoreError> {
        let entry = self.inner.create(short_name, labels).await?;
        Ok(self.wrap(entry))
    }
}

#[derive(Debug)]
struct SingleFlightEntry {
    inner: StoreEntry,
    values: Arc<SingleFlight<String, Vec<u8>>>,
}

#[async_trait]
impl SecretEntry for SingleFlightEntry {
    fn full_name(&self) -> &str {
        self.inner.full_name()
    }

    fn short_name(&self) -> &str {
        self.inner.short_name()
    }

    fn labels(&self) -> Labels {
        self.inner.labels()
    }

    async fn set_labels(&self, labels: Labels) -> Result<(), StoreError> {
        self.inner.set_labels(labels).await
    }

    async fn get_value(&self) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.clone();
        let (result, _) = self
            .values
            .run(self.inner.full_name().to_string(), move || async move {
                inner.get_value().await
            })
            .await;
        result
    }

    async fn set_value(&self, data: &[u8]) -> Result<String, StoreError> {
        self.inner.set_value(data).await
    }
}
