// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration read from a JSON, TOML or YAML file.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::{ConfigError, ConfigProvider, lookup};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.json`
    Json,
    /// `.toml`
    Toml,
    /// `.yaml`, `.yml`
    Yaml,
}

impl FileFormat {
    /// Detect the format from the file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "yaml" | "yml" => Some(FileFormat::Yaml),
            _ => None,
        }
    }

    /// Parse a document into a JSON object.
    pub fn parse(self, content: &str) -> Result<Value, ConfigError> {
        let value = match self {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::provider_error("file", format!("invalid JSON: {e}")))?,
            FileFormat::Toml => {
                let parsed: toml::Value = toml::from_str(content)
                    .map_err(|e| ConfigError::provider_error("file", format!("invalid TOML: {e}")))?;
                serde_json::to_value(parsed).map_err(|e| {
                    ConfigError::provider_error("file", format!("failed to convert TOML: {e}"))
                })?
            }
            FileFormat::Yaml => {
                let parsed: serde_yaml::Value = serde_yaml::from_str(content)
                    .map_err(|e| ConfigError::provider_error("file", format!("invalid YAML: {e}")))?;
                serde_json::to_value(parsed).map_err(|e| {
                    ConfigError::provider_error("file", format!("failed to convert YAML: {e}"))
                })?
            }
        };

        if !value.is_object() {
            return Err(ConfigError::provider_error(
                "file",
                "root configuration must be an object",
            ));
        }
        Ok(value)
    }
}

/// File-based configuration provider.
#[derive(Debug)]
pub struct FileConfigProvider {
    path: PathBuf,
    data: Value,
}

impl FileConfigProvider {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let path = PathBuf::from(path);
        let format = FileFormat::from_extension(&path)
            .ok_or_else(|| ConfigError::provider_error("file", "unsupported file format"))?;
        let content = fs::read_to_string(&path).map_err(|e| {
            ConfigError::provider_error("file", format!("failed to read {}: {e}", path.display()))
        })?;
        let data = format.parse(&content)?;
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for FileConfigProvider {
    fn has(&self, key: &str) -> bool {
        lookup(&self.data, key).is_some()
    }

    fn provider_name(&self) -> &str {
        "file"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(lookup(&self.data, key).cloned())
    }
}
