use std::time::Duration;

use serde_json::Value;

/// Runtime settings resolved from `reeflow_core::config::ExpertConfig`.
///
/// Kept as its own type (rather than depending on `reeflow-core`'s config
/// struct directly in the client API) so this crate's public surface
/// doesn't change shape every time the config file grows a field.
#[derive(Debug, Clone)]
pub struct ExpertSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub enabled: bool,
}

impl From<&reeflow_core::config::ExpertConfig> for ExpertSettings {
    fn from(cfg: &reeflow_core::config::ExpertConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            enabled: cfg.enabled,
        }
    }
}

impl Default for ExpertSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Outcome of one `consult` call.
#[derive(Debug, Clone, Default)]
pub struct ExpertResult {
    pub success: bool,
    pub answer: String,
    pub confidence: Option<f32>,
    pub sources: Option<Vec<String>>,
    pub metadata: Option<Value>,
    /// Set for the `not_configured` skip path; `None` on a normal success.
    pub error: Option<String>,
}

impl ExpertResult {
    /// The `{success:false, error:"not_configured"}` result returned
    /// without performing any I/O.
    pub fn not_configured() -> Self {
        Self {
            success: false,
            error: Some("not_configured".to_string()),
            ..Default::default()
        }
    }
}
