use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::agents::AgentType;
use crate::error::{CoordinationError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub coordination: CoordinationConfig,
    pub client_store: ClientStoreConfig,
    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub api_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinationConfig {
    #[serde(with = "humantime_serde")]
    pub sla_threshold: Duration,
    #[serde(with = "humantime_serde")]
    pub default_max_response_time: Duration,
    pub retry_with_fallback: bool,
    pub fallback_to_any_on_preferred_miss: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientStoreBackend {
    Memory,
    JsonFiles,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientStoreConfig {
    pub backend: ClientStoreBackend,
    pub data_directory: PathBuf,
    pub file_pattern: String, // "{client_id}.json"
    pub access_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AgentDefinition {
    pub id: String,
    pub agent_type: AgentType,
    pub endpoint: String,
    pub max_capacity: u32,
    /// Upper bound for a single invocation of this agent.
    #[serde(with = "humantime_serde")]
    pub sla: Duration,
    pub version: String,
    /// Initial estimate in seconds, refined as invocations complete.
    pub average_response_time: f64,
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, agent_type: AgentType) -> Self {
        let id = id.into();
        Self {
            endpoint: format!("http://{}/api", id.replace('_', "-")),
            id,
            agent_type,
            max_capacity: 100,
            sla: Duration::from_secs(10),
            version: "1.0.0".to_string(),
            average_response_time: 0.5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                api_port: 8000,
                api_token: None,
            },
            coordination: CoordinationConfig {
                sla_threshold: Duration::from_secs(2),
                default_max_response_time: Duration::from_secs(30),
                retry_with_fallback: true,
                fallback_to_any_on_preferred_miss: false,
            },
            client_store: ClientStoreConfig {
                backend: ClientStoreBackend::JsonFiles,
                data_directory: PathBuf::from("./data/clients"),
                file_pattern: "{client_id}.json".to_string(),
                access_file: "access.json".to_string(),
            },
            agents: AgentType::ALL
                .iter()
                .map(|agent_type| AgentDefinition::new(format!("{}_agent", agent_type), *agent_type))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Path from `COORDINATOR_CONFIG`, falling back to `config.toml`.
    pub fn from_env() -> Self {
        let path = std::env::var("COORDINATOR_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::new(PathBuf::from(path))
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| CoordinationError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| CoordinationError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully ({} agents)", config.agents.len());
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        // checking agent list
        if config.agents.is_empty() {
            return Err(CoordinationError::ConfigError("At least one agent must be configured".to_string()));
        }

        let mut seen = HashSet::new();
        for agent in &config.agents {
            if agent.id.trim().is_empty() {
                return Err(CoordinationError::ConfigError("Agent id cannot be empty".to_string()));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(CoordinationError::ConfigError(format!("Duplicate agent id '{}'", agent.id)));
            }
            if agent.max_capacity == 0 {
                return Err(CoordinationError::ConfigError(format!(
                    "Agent '{}' max_capacity must be greater than 0",
                    agent.id
                )));
            }
            if agent.sla.is_zero() {
                return Err(CoordinationError::ConfigError(format!("Agent '{}' sla must be non-zero", agent.id)));
            }
            if !agent.endpoint.starts_with("http://") && !agent.endpoint.starts_with("https://") {
                return Err(CoordinationError::ConfigError(format!(
                    "Agent '{}' endpoint must start with http:// or https://",
                    agent.id
                )));
            }
            if agent.average_response_time < 0.0 {
                return Err(CoordinationError::ConfigError(format!(
                    "Agent '{}' average_response_time cannot be negative",
                    agent.id
                )));
            }
        }

        // checking coordination timings
        if config.coordination.sla_threshold.is_zero() {
            return Err(CoordinationError::ConfigError("sla_threshold must be non-zero".to_string()));
        }
        if config.coordination.default_max_response_time.is_zero() {
            return Err(CoordinationError::ConfigError(
                "default_max_response_time must be non-zero".to_string(),
            ));
        }

        // checking server config
        if config.server.api_port < 1024 {
            return Err(CoordinationError::ConfigError("api_port must be between 1024 and 65535".to_string()));
        }

        // checking client store config
        let pattern = config.client_store.file_pattern.trim();
        if pattern.is_empty() || !pattern.contains("{client_id}") {
            return Err(CoordinationError::ConfigError(
                "file_pattern must contain the {client_id} placeholder".to_string(),
            ));
        }
        if config.client_store.access_file.trim().is_empty() {
            return Err(CoordinationError::ConfigError("access_file cannot be empty".to_string()));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| CoordinationError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| CoordinationError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config).map_err(|e| {
            CoordinationError::ConfigError(format!("Failed to serialize default config: {}", e))
        })?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CoordinationError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| CoordinationError::ConfigError(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}
