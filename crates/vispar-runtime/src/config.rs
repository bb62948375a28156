//! Runtime configuration
//!
//! Supports both YAML and TOML files. Every section and field has a default,
//! so a file only needs to name what it changes.
//!
//! # Example YAML configuration:
//! ```yaml
//! logging:
//!   level: debug
//!   format: json
//!
//! actor:
//!   inbox_capacity: 512
//!
//! registry:
//!   namespace: vispar
//!
//! checkpoint:
//!   pretty: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,

    /// Window actor channel sizing
    pub actor: ActorConfig,

    /// Operator name resolution
    pub registry: RegistryConfig,

    /// Checkpoint blob encoding
    pub checkpoint: CheckpointConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    pub format: LogFormat,

    /// Include timestamps
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            timestamps: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded inbox size; `admit` waits when the inbox is full
    pub inbox_capacity: usize,

    /// Bounded size of the timer-expiry channel
    pub expiry_channel_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 1024,
            expiry_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix for the namespaced operator aliases (`<namespace>:and`, ...).
    /// Empty disables them.
    pub namespace: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "vispar".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Write indented JSON blobs
    pub pretty: bool,
}

impl RuntimeConfig {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => Self::from_yaml(&content).or_else(|_| Self::from_toml(&content)),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Merge another config into this one (other values take precedence if set)
    pub fn merge(&mut self, other: RuntimeConfig) {
        let logging = LoggingConfig::default();
        if other.logging.level != logging.level {
            self.logging.level = other.logging.level;
        }
        if other.logging.format != logging.format {
            self.logging.format = other.logging.format;
        }
        if !other.logging.timestamps {
            self.logging.timestamps = false;
        }

        let actor = ActorConfig::default();
        if other.actor.inbox_capacity != actor.inbox_capacity {
            self.actor.inbox_capacity = other.actor.inbox_capacity;
        }
        if other.actor.expiry_channel_capacity != actor.expiry_channel_capacity {
            self.actor.expiry_channel_capacity = other.actor.expiry_channel_capacity;
        }

        if other.registry.namespace != RegistryConfig::default().namespace {
            self.registry.namespace = other.registry.namespace;
        }

        if other.checkpoint.pretty {
            self.checkpoint.pretty = true;
        }
    }

    pub fn example() -> Self {
        Self {
            logging: LoggingConfig {
                level: "vispar_runtime=debug,info".to_string(),
                format: LogFormat::Json,
                timestamps: true,
            },
            actor: ActorConfig {
                inbox_capacity: 4096,
                expiry_channel_capacity: 1024,
            },
            registry: RegistryConfig::default(),
            checkpoint: CheckpointConfig { pretty: true },
        }
    }

    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}
