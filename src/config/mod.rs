// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layered configuration.
//!
//! A [`Config`] is an ordered list of [`ConfigProvider`]s; later providers
//! override earlier ones. The usual stack is:
//!
//! 1. `FileConfigProvider` – `sema.{toml,json,yaml}`
//! 2. `EnvConfigProvider`  – `SEMA_SERVER_PORT=9090` or `SEMA_SERVER__PORT=9090`
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `server.host`        | string | `127.0.0.1` | Address the proxy binds to |
//! | `server.port`        | u16    | `8080`      | Proxy port                 |
//! | `resolver.prefix`    | string | `""`        | Prefix tried before bare keys |
//! | `resolver.verbose`   | bool   | `false`     | Log every candidate per key |
//! | `store.backend`      | string | `offline`   | `offline` or `catch-all`   |
//! | `store.offline_file` | string | –           | Dotenv file for the offline store |
//! | `store.project`      | string | `default`   | Project used to qualify names |
//! | `proxy.logging`      | object | defaults    | See `LoggingConfig`        |

mod env;
pub mod error;
mod file;


pub use env::EnvConfigProvider;
pub use error::ConfigError;
pub use file::{FileConfigProvider, FileFormat};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A source of configuration values. Object-safe.
pub trait ConfigProvider: Debug + Send + Sync {
    /// Whether the provider holds `key`.
    fn has(&self, key: &str) -> bool;

    fn provider_name(&self) -> &str;

    /// Raw value for a dotted key.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed access on top of [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        deserialize(key, self.get_raw(key)?)
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

fn deserialize<T: DeserializeOwned>(key: &str, raw: Option<Value>) -> Result<Option<T>, ConfigError> {
    match raw {
        Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
            ConfigError::ParseError(format!("failed to deserialize '{key}': {e}"))
        }),
        None => Ok(None),
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider; it overrides every provider added before it.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// Configuration assembled from several providers.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        for provider in self.providers.iter().rev() {
            if provider.has(key) {
                return provider.get_raw(key);
            }
        }
        Ok(None)
    }

    /// Value from the last provider that has `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        deserialize(key, self.get_raw(key)?)
    }

    pub fn get_or_default<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// File values overridden by `SEMA_` environment variables. Without a
    /// file only the environment is consulted.
    pub fn layered(file_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Some(path) = file_path {
            builder = builder.with_provider(FileConfigProvider::new(path)?);
        }
        Ok(builder.with_provider(EnvConfigProvider::default()).build())
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_name()).collect()
    }
}
