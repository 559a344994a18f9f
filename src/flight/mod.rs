// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-key call deduplication.
//!
//! A [`SingleFlight`] keeps one slot per key. The first caller for a key
//! starts the fetch; callers arriving while it runs join the same in-flight
//! result (success or error). A caching flight keeps successful results for
//! the life of the value; a plain flight forgets them once delivered.
//!
//! ```text
//! Empty ──first caller──▶ Fetching ──ok (caching)──▶ Cached
//!   ▲                        │
//!   └────── error / ok (plain) ┘
//! ```
//!
//! The fetch runs on its own task outside the slot lock, so it finishes and
//! updates the slot even when every caller has gone away.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::store::StoreError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, StoreError>>>;

enum Slot<V> {
    Fetching(SharedFetch<V>),
    Cached(V),
}

/// How a [`SingleFlight::run`] call obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from a completed, retained fetch.
    Cached,
    /// Waited on a fetch started by another caller.
    Joined,
    /// Started the fetch.
    Fetched,
}

impl Source {
    pub fn is_cache_hit(self) -> bool {
        matches!(self, Source::Cached)
    }
}

type Slots<K, V> = Arc<Mutex<HashMap<K, Slot<V>>>>;

/// Deduplicates concurrent calls that share a key.
pub struct SingleFlight<K, V> {
    slots: Slots<K, V>,
    retain: bool,
}

fn lock<K, V>(slots: &Slots<K, V>) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Flight that only collapses concurrent calls.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            retain: false,
        }
    }

    /// Flight that also keeps every successful result.
    pub fn caching() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            retain: true,
        }
    }

    /// Cached result for `key`, if one has completed.
    pub fn peek(&self, key: &K) -> Option<V> {
        match lock(&self.slots).get(key) {
            Some(Slot::Cached(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Number of keys holding a cached value.
    pub fn cached_len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| matches!(slot, Slot::Cached(_)))
            .count()
    }

    /// Return the result for `key`, calling `fetch` only when no fetch for the
    /// key is cached or in flight.
    pub async fn run<F, Fut>(&self, key: K, fetch: F) -> (Result<V, StoreError>, Source)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
    {
        let (pending, source) = {
            let mut slots = lock(&self.slots);
            match slots.get(&key) {
                Some(Slot::Cached(value)) => return (Ok(value.clone()), Source::Cached),
                Some(Slot::Fetching(pending)) => (pending.clone(), Source::Joined),
                None => {
                    let pending = self.start(key.clone(), fetch());
                    slots.insert(key, Slot::Fetching(pending.clone()));
                    (pending, Source::Fetched)
                }
            }
        };

        (pending.await, source)
    }

    // Called with the slot lock held; the spawned task cannot settle the slot
    // before the caller has inserted `Fetching`.
    fn start<Fut>(&self, key: K, fetch: Fut) -> SharedFetch<V>
    where
        Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
    {
        let slots = self.slots.clone();
        let retain = self.retain;
        let settle_key = key.clone();

        let task = tokio::spawn(async move {
            let result = fetch.await;
            let mut slots = lock(&slots);
            match &result {
                Ok(value) if retain => {
                    slots.insert(settle_key, Slot::Cached(value.clone()));
                }
                _ => {
                    slots.remove(&settle_key);
                }
            }
            result
        });

        let slots = self.slots.clone();
        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    lock(&slots).remove(&key);
                    Err(StoreError::Upstream(format!("fetch task failed: {err}")))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("retain", &self.retain)
            .finish_non_exhaustive()
    }
}
