// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Map-backed store used in tests and for offline runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Labels, SecretEntry, SecretStoreClient, StoreEntry, StoreError};

/// In-memory secret store for a single project.
#[derive(Debug)]
pub struct InMemoryClient {
    project: String,
    data: Mutex<BTreeMap<String, Arc<MemoryEntry>>>,
}

#[derive(Debug, Default)]
struct EntryState {
    versions: Vec<Vec<u8>>,
    labels: Labels,
}

/// A secret held by [`InMemoryClient`].
#[derive(Debug)]
pub struct MemoryEntry {
    full_name: String,
    short_name: String,
    state: Mutex<EntryState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryClient {
    /// Create a store seeded with `(short name, value)` pairs; each seeded
    /// secret starts with a single version.
    pub fn new<I, K, V>(project: &str, seed: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let client = Self {
            project: project.to_string(),
            data: Mutex::new(BTreeMap::new()),
        };
        {
            let mut data = lock(&client.data);
            for (name, value) in seed {
                let name = name.into();
                let entry = client.entry(&name, Labels::new(), vec![value.into()]);
                data.insert(name, Arc::new(entry));
            }
        }
        client
    }

    /// Empty store.
    pub fn empty(project: &str) -> Self {
        Self::new(project, Vec::<(String, String)>::new())
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn entry(&self, short_name: &str, labels: Labels, versions: Vec<Vec<u8>>) -> MemoryEntry {
        MemoryEntry {
            full_name: format!("projects/{}/secrets/{}", self.project, short_name),
            short_name: short_name.to_string(),
            state: Mutex::new(EntryState { versions, labels }),
        }
    }
}

#[async_trait]
impl SecretStoreClient for InMemoryClient {
    async fn list_keys(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Ok(lock(&self.data)
            .values()
            .map(|entry| entry.clone() as StoreEntry)
            .collect())
    }

    async fn get(&self, short_name: &str) -> Result<StoreEntry, StoreError> {
        lock(&self.data)
            .get(short_name)
            .map(|entry| entry.clone() as StoreEntry)
            .ok_or_else(|| StoreError::NotFound(short_name.to_string()))
    }

    async fn create(&self, short_name: &str, labels: Labels) -> Result<StoreEntry, StoreError> {
        let mut data = lock(&self.data);
        if data.contains_key(short_name) {
            return Err(StoreError::AlreadyExists(short_name.to_string()));
        }
        let entry = Arc::new(self.entry(short_name, labels, Vec::new()));
        data.insert(short_name.to_string(), entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl SecretEntry for MemoryEntry {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn labels(&self) -> Labels {
        lock(&self.state).labels.clone()
    }

    async fn set_labels(&self, labels: Labels) -> Result<(), StoreError> {
        lock(&self.state).labels = labels;
        Ok(())
    }

    async fn get_value(&self) -> Result<Vec<u8>, StoreError> {
        lock(&self.state)
            .versions
            .last()
            .cloned()
            .ok_or_else(|| StoreError::NoVersions(self.full_name.clone()))
    }

    async fn set_value(&self, data: &[u8]) -> Result<String, StoreError> {
        let mut state = lock(&self.state);
        state.versions.push(data.to_vec());
        Ok(format!("{}/versions/{}", self.full_name, state.versions.len()))
    }
}
