// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-lifetime caches behind the proxy endpoints.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::flight::SingleFlight;
use crate::store::{SingleFlightClient, StoreClient, StoreEntry, StoreError};

/// Builds the upstream client for a project.
pub type ClientFactory = Arc<dyn Fn(&str) -> Result<StoreClient, StoreError> + Send + Sync>;

/// Listing cache keyed by project, lookup cache keyed by project and short
/// name, value cache keyed by full secret name. Entries are never evicted;
/// failed fetches are not cached.
pub struct ProxyCache {
    factory: ClientFactory,
    clients: Mutex<HashMap<String, StoreClient>>,
    listings: SingleFlight<String, Vec<StoreEntry>>,
    lookups: SingleFlight<(String, String), StoreEntry>,
    values: SingleFlight<String, Vec<u8>>,
}

/// A secret together with its payload.
#[derive(Debug, Clone)]
pub struct CachedSecret {
    pub entry: StoreEntry,
    pub data: Vec<u8>,
}

impl ProxyCache {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
            listings: SingleFlight::caching(),
            lookups: SingleFlight::caching(),
            values: SingleFlight::caching(),
        }
    }

    /// Memoized, single-flight wrapped client for `project`.
    pub fn client(&self, project: &str) -> Result<StoreClient, StoreError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(project) {
            return Ok(client.clone());
        }
        let client: StoreClient = Arc::new(SingleFlightClient::new((self.factory)(project)?));
        clients.insert(project.to_string(), client.clone());
        Ok(client)
    }

    /// All secrets of `project` and whether they came from the cache.
    pub async fn list(&self, project: &str) -> Result<(Vec<StoreEntry>, bool), StoreError> {
        let client = self.client(project)?;
        let (result, source) = self
            .listings
            .run(project.to_string(), move || async move { client.list_keys().await })
            .await;
        Ok((result?, source.is_cache_hit()))
    }

    /// Secret `short_name` of `project` with its latest value, and whether the
    /// value came from the cache.
    ///
    /// The entry is taken from a cached listing when there is one; otherwise
    /// it is looked up upstream once and remembered.
    pub async fn get(&self, project: &str, short_name: &str) -> Result<(CachedSecret, bool), StoreError> {
        let listed = self.listings.peek(&project.to_string()).and_then(|entries| {
            entries
                .into_iter()
                .find(|entry| entry.short_name() == short_name)
        });
        let entry = match listed {
            Some(entry) => entry,
            None => {
                let client = self.client(project)?;
                let name = short_name.to_string();
                let key = (project.to_string(), name.clone());
                let (result, _) = self
                    .lookups
                    .run(key, move || async move { client.get(&name).await })
                    .await;
                result?
            }
        };

        let fetch_entry = entry.clone();
        let (result, source) = self
            .values
            .run(entry.full_name().to_string(), move || async move {
                fetch_entry.get_value().await
            })
            .await;
        let data = result?;
        Ok((CachedSecret { entry, data }, source.is_cache_hit()))
    }

    pub fn cached_projects(&self) -> usize {
        self.listings.cached_len()
    }

    pub fn cached_values(&self) -> usize {
        self.values.cached_len()
    }
}

impl fmt::Debug for ProxyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCache")
            .field("projects", &self.cached_projects())
            .field("values", &self.cached_values())
            .finish_non_exhaustive()
    }
}
