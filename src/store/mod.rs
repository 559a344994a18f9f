// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Secret store contract and the backends shipped with the crate.
//!
//! Everything that reads secrets talks to a [`SecretStoreClient`] and the
//! [`SecretEntry`] handles it hands out. Backends:
//!
//! - [`InMemoryClient`] – map-backed, seeded with key/value pairs; also the
//!   offline backend when loaded from a dotenv file
//! - [`CatchAllClient`] – answers every lookup with a synthetic empty secret,
//!   used for dry runs
//! - [`ProxyClient`] – read-only client talking to a running caching proxy
//! - [`SingleFlightClient`] – wraps any client so concurrent identical calls
//!   collapse into one

mod catch_all;
mod memory;
mod offline;
mod proxy_client;
mod singleflight;


use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use catch_all::{CatchAllClient, CatchAllEntry};
pub use memory::{InMemoryClient, MemoryEntry};
pub use proxy_client::{ProxyClient, ProxyListing, ProxySecret, ProxySecretDetail};
pub use singleflight::SingleFlightClient;

/// Labels attached to a secret.
pub type Labels = BTreeMap<String, String>;

/// Shared handle to a secret held by some store.
pub type StoreEntry = Arc<dyn SecretEntry>;

/// Shared handle to a store client.
pub type StoreClient = Arc<dyn SecretStoreClient>;

/// Errors returned by store backends.
///
/// The type is `Clone` so that one failed upstream call can be handed to
/// every caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No secret with that name exists.
    #[error("secret not found: {0:?}")]
    NotFound(String),

    /// The secret exists but has no enabled version.
    #[error("secret {0} has no enabled versions")]
    NoVersions(String),

    /// A secret with that name already exists.
    #[error("secret already exists: {0:?}")]
    AlreadyExists(String),

    /// Write attempted through a read-only client.
    #[error("proxy is a read-only store; do not use it to make edits")]
    ReadOnly,

    /// The backend does not implement the operation.
    #[error("{store} does not support {operation}")]
    Unsupported {
        store: &'static str,
        operation: &'static str,
    },

    /// The upstream call failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A local resource backing the store could not be read.
    #[error("IO error: {0}")]
    Io(String),

    /// The payload cannot be used as a configuration string.
    #[error("secret {0} is not valid UTF-8")]
    InvalidUtf8(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Upstream(err.to_string())
    }
}

/// One secret inside a store, with its append-only list of versions.
#[async_trait]
pub trait SecretEntry: Debug + Send + Sync {
    /// Store-qualified, globally unique name.
    fn full_name(&self) -> &str;

    /// Short, human-chosen name that schema keys are matched against.
    fn short_name(&self) -> &str;

    fn labels(&self) -> Labels;

    /// Replace all labels.
    async fn set_labels(&self, labels: Labels) -> Result<(), StoreError>;

    /// Payload of the latest enabled version.
    async fn get_value(&self) -> Result<Vec<u8>, StoreError>;

    /// Append a new version and return its identifier.
    async fn set_value(&self, data: &[u8]) -> Result<String, StoreError>;
}

/// Client for a secret store.
#[async_trait]
pub trait SecretStoreClient: Debug + Send + Sync {
    /// Every secret in the store.
    async fn list_keys(&self) -> Result<Vec<StoreEntry>, StoreError>;

    /// Secret by short name.
    async fn get(&self, short_name: &str) -> Result<StoreEntry, StoreError>;

    /// Create an empty secret.
    async fn create(&self, short_name: &str, labels: Labels) -> Result<StoreEntry, StoreError>;
}
