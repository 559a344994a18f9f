// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable configuration provider.

use std::collections::HashMap;
use std::env;

use serde_json::{Value, json};

use super::ConfigError;
use super::ConfigProvider;

/// Reads `PREFIX_…` variables.
///
/// A dotted key `store.offline_file` is looked up as `store__offline_file`
/// first and then as `store_offline_file`, so both `SEMA_STORE__OFFLINE_FILE`
/// and `SEMA_STORE_OFFLINE_FILE` work.
#[derive(Debug)]
pub struct EnvConfigProvider {
    prefix: String,
    /// Lower-cased variable names with the prefix stripped.
    cache: HashMap<String, String>,
}

impl EnvConfigProvider {
    pub fn new(prefix: &str) -> Self {
        let mut provider = Self {
            prefix: prefix.to_string(),
            cache: HashMap::new(),
        };
        provider.refresh_cache();
        provider
    }

    /// Re-read the process environment.
    pub fn refresh_cache(&mut self) {
        self.cache = env::vars()
            .filter_map(|(name, value)| {
                name.strip_prefix(&self.prefix)
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .collect();
    }

    fn lookup(&self, key: &str) -> Option<&String> {
        let key = key.to_lowercase();
        self.cache
            .get(&key.replace('.', "__"))
            .or_else(|| self.cache.get(&key.replace('.', "_")))
    }

    /// Values are read as JSON when possible, then as bool or number, and
    /// otherwise kept as strings.
    fn parse_value(value: &str) -> Value {
        if let Ok(parsed) = serde_json::from_str::<Value>(value) {
            return parsed;
        }
        if value.eq_ignore_ascii_case("true") {
            return json!(true);
        }
        if value.eq_ignore_ascii_case("false") {
            return json!(false);
        }
        json!(value)
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new("SEMA_")
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.lookup(key).map(|value| Self::parse_value(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProviderExt;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_provider_reads_prefixed_variables() {
        unsafe {
            env::set_var("SEMA_SERVER_HOST", "0.0.0.0");
            env::set_var("SEMA_SERVER__PORT", "9090");
            env::set_var("SEMA_RESOLVER_VERBOSE", "TRUE");
            env::set_var("SEMA_STORE_OFFLINE_FILE", "/tmp/secrets.env");
        }

        let provider = EnvConfigProvider::default();

        let host: String = provider.get("server.host").unwrap().unwrap();
        assert_eq!(host, "0.0.0.0");
        let port: u16 = provider.get("server.port").unwrap().unwrap();
        assert_eq!(port, 9090);
        let verbose: bool = provider.get("resolver.verbose").unwrap().unwrap();
        assert!(verbose);
        let file: String = provider.get("store.offline_file").unwrap().unwrap();
        assert_eq!(file, "/tmp/secrets.env");
        assert!(!provider.has("store.project"));

        unsafe {
            env::remove_var("SEMA_SERVER_HOST");
            env::remove_var("SEMA_SERVER__PORT");
            env::remove_var("SEMA_RESOLVER_VERBOSE");
            env::remove_var("SEMA_STORE_OFFLINE_FILE");
        }
    }

    #[test]
    #[serial]
    fn test_refresh_cache_sees_new_variables() {
        let mut provider = EnvConfigProvider::new("SEMATEST_");
        assert!(!provider.has("value"));

        unsafe {
            env::set_var("SEMATEST_VALUE", "42");
        }
        assert!(!provider.has("value"));

        provider.refresh_cache();
        let value: i32 = provider.get("value").unwrap().unwrap();
        assert_eq!(value, 42);

        unsafe {
            env::remove_var("SEMATEST_VALUE");
        }
    }

    #[test]
    fn test_parse_value_types() {
        assert_eq!(EnvConfigProvider::parse_value("12"), json!(12));
        assert_eq!(EnvConfigProvider::parse_value("False"), json!(false));
        assert_eq!(EnvConfigProvider::parse_value("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(EnvConfigProvider::parse_value("plain"), json!("plain"));
    }
}
