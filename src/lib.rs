// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! sema - schema-driven secret hydration with a caching secret-store proxy.
//!
//! An application declares its configuration as a JSON5 schema of typed
//! leaves. sema resolves every leaf against a secret store, falls back to a
//! runtime value (environment alias or default) where the schema allows it,
//! and hydrates the resolved secrets back into a nested document.
//!
//! # Pipeline
//!
//! 1. [`schema::parse`] turns schema bytes into a [`ConfigurationSchema`].
//! 2. A [`Resolver`] maps each leaf to a [`ResolvedSecret`], listing the store
//!    once per resolver instance.
//! 3. [`hydrate::hydrate`] fetches resolved values and rebuilds the tree.
//!
//! # Caching proxy
//!
//! [`ProxyServer`] fronts a store over HTTP (`GET /list`, `GET /get`). Every
//! listing and value is fetched at most once per process, with concurrent
//! callers sharing one in-flight fetch. [`store::ProxyClient`] is the
//! matching read-only client.
//!
//! ```rust,no_run
//! use sema::{Sema, schema};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sema = Sema::loader().with_config_file("sema.toml").build().await?;
//! let schema = schema::parse_file("config-schema.json")?;
//! let document = sema.render(&schema).await?;
//! println!("{document}");
//! # Ok(())
//! # }
//! ```

#[macro_use]
pub mod logging;

pub mod config;
pub mod flight;
pub mod format;
pub mod hydrate;
pub mod loader;
pub mod multierror;
pub mod resolve;
pub mod schema;
pub mod server;
pub mod store;

pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
pub use format::{FormatError, FormatType};
pub use hydrate::{EmptyPolicy, Hydrated, hydrate, hydrate_document};
pub use loader::{LoaderError, Sema, SemaLoader};
pub use multierror::MultiError;
pub use resolve::{
    CatchAllResolver, ResolutionMap, ResolveError, ResolveReport, ResolvedSecret, Resolver,
    ResolverOptions, SchemaResolver,
};
pub use schema::{ConfigurationLeaf, ConfigurationSchema, ConfigurationTree, ParseError};
pub use server::{ProxyCache, ProxyServer, ServerConfig, ServerError};
pub use store::{SecretEntry, SecretStoreClient, StoreClient, StoreEntry, StoreError};
