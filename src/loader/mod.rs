// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry point.
//!
//! The [`SemaLoader`] consumes configuration, initializes logging, picks the
//! secret-store backend and returns a [`Sema`] that can resolve and hydrate
//! schemas or run the caching proxy.


use std::env;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::hydrate::{self, EmptyPolicy};
use crate::logging::{self, LoggingConfig};
use crate::multierror::MultiError;
use crate::resolve::{CatchAllResolver, Resolver, ResolverOptions, SchemaResolver};
use crate::schema::{ConfigurationSchema, ParseError};
use crate::server::{ClientFactory, ProxyCache, ProxyServer, ServerConfig, ServerError};
use crate::store::{CatchAllClient, InMemoryClient, StoreClient, StoreError};
use crate::{info_fmt, warn_fmt};

/// Errors that can occur while building or running sema.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("schema error: {0}")]
    ParseError(#[from] ParseError),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("server error: {0}")]
    ServerError(#[from] ServerError),

    /// Leaves for which no secret and no runtime fallback exists.
    #[error("no secret value resolved for: {}", .0.join(", "))]
    Unresolved(Vec<String>),

    #[error("{0}")]
    HydrateError(MultiError),

    #[error("{0}")]
    Other(String),
}

/// Secret-store backend selected by `store.backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-memory store, seeded from `store.offline_file` when set.
    Offline,
    /// Synthetic empty secret for every name.
    CatchAll,
}

impl Backend {
    fn parse(name: &str) -> Result<Self, LoaderError> {
        match name {
            "offline" => Ok(Backend::Offline),
            "catch-all" => Ok(Backend::CatchAll),
            other => Err(LoaderError::Other(format!(
                "unknown store backend {other:?}; expected \"offline\" or \"catch-all\""
            ))),
        }
    }
}

/// Builder for initializing sema.
#[derive(Default)]
pub struct SemaLoader {
    config: Option<Config>,
    config_file_path: Option<String>,
    client_factory: Option<ClientFactory>,
}

impl std::fmt::Debug for SemaLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemaLoader")
            .field("config", &self.config)
            .field("config_file_path", &self.config_file_path)
            .field("client_factory", &self.client_factory.is_some())
            .finish()
    }
}

impl SemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the file/environment layers.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Layer `file_path` under the `SEMA_` environment variables.
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Build store clients with `factory` instead of `store.backend`.
    pub fn with_client_factory(mut self, factory: ClientFactory) -> Self {
        self.client_factory = Some(factory);
        self
    }

    pub async fn build(self) -> Result<Sema, LoaderError> {
        let config = match self.config {
            Some(config) => config,
            None => Config::layered(self.config_file_path.as_deref())?,
        };

        let logging_config: LoggingConfig =
            config.get_or_default("proxy.logging", LoggingConfig::default())?;
        let level = env::var("RUST_LOG_LEVEL").unwrap_or_else(|_| logging_config.level.clone());
        logging::init_with_config(logging::level_filter(&level), &logging_config);

        info_fmt!("Startup", "sema starting up");

        let project: String = config.get_or_default("store.project", "default".to_string())?;
        let options = ResolverOptions {
            prefix: config.get_or_default("resolver.prefix", String::new())?,
            verbose: config.get_or_default("resolver.verbose", false)?,
            ..ResolverOptions::default()
        };

        let (factory, backend) = match self.client_factory {
            Some(factory) => (factory, None),
            None => {
                let name: String = config.get_or_default("store.backend", "offline".to_string())?;
                let backend = Backend::parse(&name)?;
                (backend_factory(&config, backend)?, Some(backend))
            }
        };

        let server_config: ServerConfig = config.get_or_default("server", ServerConfig::default())?;
        let cache = Arc::new(ProxyCache::new(factory.clone()));
        let server = ProxyServer::new(server_config, cache, logging_config);

        Ok(Sema {
            config: Arc::new(config),
            project,
            options,
            factory,
            backend,
            server,
        })
    }
}

/// Client factory for the backend named by `store.backend`.
fn backend_factory(config: &Config, backend: Backend) -> Result<ClientFactory, LoaderError> {
    let factory: ClientFactory = match backend {
        Backend::CatchAll => Arc::new(|_project: &str| -> Result<StoreClient, StoreError> {
            let client: StoreClient = Arc::new(CatchAllClient);
            Ok(client)
        }),
        Backend::Offline => match config.get::<String>("store.offline_file")? {
            Some(path) => {
                info_fmt!("Startup", "Using offline secrets from {path}");
                Arc::new(move |project: &str| -> Result<StoreClient, StoreError> {
                    let client: StoreClient = Arc::new(InMemoryClient::from_dotenv(&path, project)?);
                    Ok(client)
                })
            }
            None => {
                warn_fmt!("Startup", "store.offline_file is not set; the offline store is empty");
                Arc::new(|project: &str| -> Result<StoreClient, StoreError> {
                    let client: StoreClient = Arc::new(InMemoryClient::empty(project));
                    Ok(client)
                })
            }
        },
    };
    Ok(factory)
}

/// An initialized sema instance.
#[derive(Clone)]
pub struct Sema {
    config: Arc<Config>,
    project: String,
    options: ResolverOptions,
    factory: ClientFactory,
    backend: Option<Backend>,
    server: ProxyServer,
}

impl std::fmt::Debug for Sema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sema")
            .field("project", &self.project)
            .field("options", &self.options)
            .field("backend", &self.backend)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

impl Sema {
    pub fn loader() -> SemaLoader {
        SemaLoader::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Project used to qualify secret names.
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn resolver_options(&self) -> &ResolverOptions {
        &self.options
    }

    /// A fresh store client for the configured project.
    pub fn store_client(&self) -> Result<StoreClient, LoaderError> {
        Ok((self.factory)(&self.project)?)
    }

    /// Backend selected by `store.backend`; `None` with a custom factory.
    pub fn backend(&self) -> Option<Backend> {
        self.backend
    }

    /// A resolver over the configured project; each resolver lists the store
    /// once.
    pub fn resolver(&self) -> Result<SchemaResolver, LoaderError> {
        Ok(SchemaResolver::new(self.store_client()?, self.options.clone()))
    }

    /// The resolver `render` uses: the catch-all backend resolves every
    /// required leaf to an empty secret, anything else goes through the store.
    pub fn schema_resolver(&self) -> Result<Box<dyn Resolver>, LoaderError> {
        match self.backend {
            Some(Backend::CatchAll) => Ok(Box::new(CatchAllResolver)),
            _ => Ok(Box::new(self.resolver()?)),
        }
    }

    /// Resolve and hydrate `schema` into a nested document.
    ///
    /// Any unresolved leaf fails the whole render, as does any fetch or
    /// format error during hydration.
    pub async fn render(&self, schema: &ConfigurationSchema) -> Result<Value, LoaderError> {
        let report = self.schema_resolver()?.resolve(schema).await?;
        if !report.is_complete() {
            return Err(LoaderError::Unresolved(
                report.failures.iter().map(|f| f.leaf().key()).collect(),
            ));
        }

        let hydrated = hydrate::hydrate_document(&schema.tree, &report.resolved, EmptyPolicy::EmptyObject).await;
        let value = hydrated.into_result().map_err(LoaderError::HydrateError)?;
        Ok(value.unwrap_or(Value::Null))
    }

    pub fn server(&self) -> &ProxyServer {
        &self.server
    }

    /// Run the caching proxy until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), LoaderError> {
        self.server.start().await.map_err(LoaderError::ServerError)
    }
}
