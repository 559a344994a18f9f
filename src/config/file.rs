// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! File configuration provider.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::ConfigError;
use super::ConfigProvider;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    /// `.yaml` or `.yml`
    Yaml,
}

impl FileFormat {
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "yaml" | "yml" => Some(FileFormat::Yaml),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Result<Value, ConfigError> {
        let invalid = |e: &dyn std::fmt::Display| {
            ConfigError::provider_error("file", format!("invalid {self:?}: {e}"))
        };
        match self {
            FileFormat::Json => serde_json::from_str(content).map_err(|e| invalid(&e)),
            FileFormat::Toml => toml::from_str::<toml::Value>(content)
                .map_err(|e| invalid(&e))
                .and_then(|v| serde_json::to_value(v).map_err(|e| invalid(&e))),
            FileFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
                .map_err(|e| invalid(&e))
                .and_then(|v| serde_json::to_value(v).map_err(|e| invalid(&e))),
        }
    }
}

/// Configuration read once from a JSON, TOML or YAML file.
#[derive(Debug)]
pub struct FileConfigProvider {
    path: PathBuf,
    data: Map<String, Value>,
}

impl FileConfigProvider {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let path = PathBuf::from(path);
        let format = FileFormat::from_extension(&path)
            .ok_or_else(|| ConfigError::provider_error("file", "unsupported file format"))?;

        let content = fs::read_to_string(&path).map_err(|e| {
            ConfigError::provider_error("file", format!("failed to read {}: {e}", path.display()))
        })?;

        Ok(Self {
            data: Self::root_object(format.parse(&content)?)?,
            path,
        })
    }

    /// Provider over an in-memory document.
    pub fn from_content(content: &str, format: FileFormat) -> Result<Self, ConfigError> {
        Ok(Self {
            data: Self::root_object(format.parse(content)?)?,
            path: PathBuf::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn root_object(value: Value) -> Result<Map<String, Value>, ConfigError> {
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::provider_error(
                "file",
                "root configuration must be an object",
            )),
        }
    }

    fn get_nested_value(&self, key_path: &str) -> Option<&Value> {
        let mut parts = key_path.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }
}

impl ConfigProvider for FileConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.get_nested_value(key).is_some()
    }

    fn provider_name(&self) -> &str {
        "file"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.get_nested_value(key).cloned())
    }
}
