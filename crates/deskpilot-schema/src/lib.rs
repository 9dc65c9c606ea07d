use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
/// Lowest port the control server may bind; everything below is privileged.
pub const MIN_PORT: u16 = 1024;

/// Lifecycle phase of the agent, as reported to HTTP clients and the UI layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Pause,
    End,
    CallUser,
    UserStopped,
    MaxLoop,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Pause => "pause",
            AgentStatus::End => "end",
            AgentStatus::CallUser => "call_user",
            AgentStatus::UserStopped => "user_stopped",
            AgentStatus::MaxLoop => "max_loop",
            AgentStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Human,
    Gpt,
    System,
}

/// One transcript entry produced while a run is in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    pub from: Speaker,
    pub value: String,
    pub at: DateTime<Utc>,
    /// Base64 screenshot captured alongside the step, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl ConversationEntry {
    pub fn new(from: Speaker, value: impl Into<String>) -> Self {
        Self {
            from,
            value: value.into(),
            at: Utc::now(),
            screenshot: None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port {0} is out of range (1024-65535)")]
    InvalidPort(u16),
    #[error("host must not be empty")]
    EmptyHost,
}

/// Settings of the embedded HTTP control server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            api_key: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port < MIN_PORT {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        Ok(())
    }

    /// Shallow merge: every field present in `patch` overwrites, the rest is kept.
    pub fn merged(&self, patch: &ServerConfigPatch) -> Result<ServerConfig, ConfigError> {
        let mut next = self.clone();
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        if let Some(port) = patch.port {
            next.port = port;
        }
        if let Some(host) = &patch.host {
            next.host = host.clone();
        }
        if let Some(key) = &patch.api_key {
            next.api_key = normalize_api_key(Some(key.clone()));
        }
        next.validate()?;
        Ok(next)
    }

    /// True when a running listener has to be rebuilt to pick up `other`.
    pub fn listener_differs(&self, other: &ServerConfig) -> bool {
        self.host != other.host || self.port != other.port || self.api_key != other.api_key
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Empty keys mean "no authentication configured".
pub fn normalize_api_key(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.is_empty())
}

/// Partial update for [`ServerConfig`]. A present but empty `api_key` clears the key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ServerConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.port.is_none() && self.host.is_none() && self.api_key.is_none()
    }
}

// ---- HTTP wire types ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub agent_status: AgentStatus,
    pub is_running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: AgentStatus,
    pub instructions: String,
    pub is_running: bool,
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunAccepted {
    pub success: bool,
    pub message: String,
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
