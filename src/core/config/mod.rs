pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::{ConfigValidator, RunMode};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "rulebot.toml";

/// Process configuration loaded from rulebot.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// GitHub App credentials and API endpoint
    #[serde(default)]
    pub github: GitHubConfig,

    /// Webhook listener
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Rule evaluation switches
    #[serde(default)]
    pub engine: EngineSettings,
}

/// GitHub App configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub app_id: Option<u64>,

    /// PEM-encoded private key
    #[serde(default, skip_serializing)]
    pub app_key: Option<String>,

    /// File holding the PEM key; read when `app_key` is unset
    #[serde(default)]
    pub app_key_path: Option<PathBuf>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Installation tokens are refreshed this long before they expire
    #[serde(default = "default_token_refresh_margin")]
    pub token_refresh_margin_seconds: u64,
}

/// Webhook listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared HMAC secret
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Rule evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Log intended mutations instead of sending them
    #[serde(default)]
    pub dry_run: bool,

    /// Include internal error detail in webhook responses
    #[serde(default)]
    pub verbose_errors: bool,

    /// Read rules from `local_rules_path` instead of the target repository
    #[serde(default)]
    pub use_local_rules: bool,

    #[serde(default = "default_local_rules_path")]
    pub local_rules_path: PathBuf,

    /// Timeout for metadata page fetches
    #[serde(default = "default_page_timeout")]
    pub page_timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_refresh_margin() -> u64 {
    300
}

fn default_bind() -> String {
    "127.0.0.1:7070".to_string()
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_local_rules_path() -> PathBuf {
    PathBuf::from(crate::core::rules::RULES_FILE_PATH)
}

fn default_page_timeout() -> u64 {
    10
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_key: None,
            app_key_path: None,
            api_base: default_api_base(),
            token_refresh_margin_seconds: default_token_refresh_margin(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            secret: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose_errors: false,
            use_local_rules: false,
            local_rules_path: default_local_rules_path(),
            page_timeout_seconds: default_page_timeout(),
        }
    }
}
