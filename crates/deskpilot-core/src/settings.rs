use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use deskpilot_schema::{normalize_api_key, ServerConfig};
use serde_json::Value;

pub const HTTP_SERVER_ENABLED: &str = "httpServerEnabled";
pub const HTTP_SERVER_PORT: &str = "httpServerPort";
pub const HTTP_SERVER_HOST: &str = "httpServerHost";
pub const HTTP_SERVER_API_KEY: &str = "httpServerApiKey";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for setting {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Typed key-value settings owned by the host application.
pub trait SettingsProvider: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError>;
    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError>;
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
        self
    }
}

impl SettingsProvider for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Flat YAML map on disk, loaded once and written through on every `set`.
#[derive(Debug)]
pub struct YamlSettingsStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, Value>>,
}

impl YamlSettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
                path: path.clone(),
                source,
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&content).map_err(|source| SettingsError::Yaml {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, Value>) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let yaml = serde_yaml::to_string(values).map_err(|source| SettingsError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, yaml).map_err(io_err)
    }
}

impl SettingsProvider for YamlSettingsStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        self.flush(&values)
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Reads the control-server settings, falling back to defaults for missing keys.
pub fn load_server_config(provider: &dyn SettingsProvider) -> Result<ServerConfig, SettingsError> {
    let mut config = ServerConfig::default();

    match provider.get(HTTP_SERVER_ENABLED)? {
        None | Some(Value::Null) => {}
        Some(Value::Bool(enabled)) => config.enabled = enabled,
        Some(other) => return Err(invalid(HTTP_SERVER_ENABLED, format!("expected bool, got {other}"))),
    }

    match provider.get(HTTP_SERVER_PORT)? {
        None | Some(Value::Null) => {}
        Some(value) => {
            let port = value
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| invalid(HTTP_SERVER_PORT, format!("expected port number, got {value}")))?;
            config.port = port;
        }
    }

    match provider.get(HTTP_SERVER_HOST)? {
        None | Some(Value::Null) => {}
        Some(Value::String(host)) => config.host = host,
        Some(other) => return Err(invalid(HTTP_SERVER_HOST, format!("expected string, got {other}"))),
    }

    match provider.get(HTTP_SERVER_API_KEY)? {
        None | Some(Value::Null) => {}
        Some(Value::String(key)) => config.api_key = normalize_api_key(Some(key)),
        Some(other) => {
            return Err(invalid(HTTP_SERVER_API_KEY, format!("expected string, got {other}")))
        }
    }

    config.validate().map_err(|err| match err {
        deskpilot_schema::ConfigError::InvalidPort(_) => invalid(HTTP_SERVER_PORT, err.to_string()),
        deskpilot_schema::ConfigError::EmptyHost => invalid(HTTP_SERVER_HOST, err.to_string()),
    })?;
    Ok(config)
}

/// Writes back only the keys that differ between `previous` and `next`.
pub fn store_server_config(
    provider: &dyn SettingsProvider,
    previous: &ServerConfig,
    next: &ServerConfig,
) -> Result<(), SettingsError> {
    if previous.enabled != next.enabled {
        provider.set(HTTP_SERVER_ENABLED, Value::Bool(next.enabled))?;
    }
    if previous.port != next.port {
        provider.set(HTTP_SERVER_PORT, Value::from(next.port))?;
    }
    if previous.host != next.host {
        provider.set(HTTP_SERVER_HOST, Value::String(next.host.clone()))?;
    }
    if previous.api_key != next.api_key {
        let key = next.api_key.clone().unwrap_or_default();
        provider.set(HTTP_SERVER_API_KEY, Value::String(key))?;
    }
    Ok(())
}
