use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const INIT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const INBOUND_QUEUE_CAPACITY: usize = 4;

/// Top-level configuration (`reeflow.toml` + `REEFLOW_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReeflowConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub expert: ExpertConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for ReeflowConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            expert: ExpertConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            base_url: default_llm_base_url(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertConfig {
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_expert_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for ExpertConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_expert_timeout_secs(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_model() -> String {
    "reeflow-default".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_expert_timeout_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.reeflow/reeflow.db", home)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.reeflow/reeflow.toml", home)
}

impl ReeflowConfig {
    /// Load config from a TOML file with `REEFLOW_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, `~/.reeflow/reeflow.toml`.
    /// Missing file is not an error — `Figment` simply skips it and the
    /// struct's `#[serde(default = ...)]` functions fill every field in.
    pub fn load(config_path: Option<&str>) -> crate::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ReeflowConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("REEFLOW_").split("_"))
            .extract()
            .map_err(|e| crate::ReeflowError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = ReeflowConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert!(cfg.expert.enabled);
        assert_eq!(cfg.llm.temperature, 0.7);
    }
}
