#![allow(clippy::result_large_err)]

use super::{EngineConfig, DEFAULT_CONFIG_FILE};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from `path`, or `rulebot.toml` in the working directory.
    /// Environment variables override file values; a missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<EngineConfig, AppError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load_from_file(&path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Self::resolve_app_key(&mut config)?;
        Ok(config)
    }

    /// Returns Ok(None) if the file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<EngineConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values
    pub fn apply_env_overrides(config: &mut EngineConfig) {
        if let Ok(value) = env::var("RULEBOT_APP_ID") {
            if let Ok(app_id) = value.trim().parse::<u64>() {
                config.github.app_id = Some(app_id);
            }
        }

        if let Ok(key) = env::var("RULEBOT_APP_KEY") {
            if !key.trim().is_empty() {
                config.github.app_key = Some(key);
            }
        }

        if let Ok(api_base) = env::var("RULEBOT_API_BASE") {
            config.github.api_base = api_base;
        }

        if let Ok(secret) = env::var("RULEBOT_WEBHOOK_SECRET") {
            config.webhook.secret = Some(secret);
        }

        if let Ok(bind) = env::var("RULEBOT_BIND") {
            config.webhook.bind = bind;
        }

        if let Some(dry_run) = env_flag("RULEBOT_DRY_RUN") {
            config.engine.dry_run = dry_run;
        }

        if let Some(verbose) = env_flag("RULEBOT_VERBOSE_ERRORS") {
            config.engine.verbose_errors = verbose;
        }

        if let Some(use_local) = env_flag("RULEBOT_USE_LOCAL_RULES") {
            config.engine.use_local_rules = use_local;
        }

        if let Ok(path) = env::var("RULEBOT_LOCAL_RULES_PATH") {
            config.engine.local_rules_path = PathBuf::from(path);
        }
    }

    fn resolve_app_key(config: &mut EngineConfig) -> Result<(), AppError> {
        if config.github.app_key.is_some() {
            return Ok(());
        }
        if let Some(path) = &config.github.app_key_path {
            let key = std::fs::read_to_string(path).map_err(|e| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("Failed to read app key {}: {}", path.display(), e),
                )
            })?;
            config.github.app_key = Some(key);
        }
        Ok(())
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "RULEBOT_APP_ID - GitHub App id",
            "RULEBOT_APP_KEY - GitHub App private key (PEM)",
            "RULEBOT_API_BASE - GitHub API base URL (default: https://api.github.com)",
            "RULEBOT_WEBHOOK_SECRET - Shared webhook HMAC secret",
            "RULEBOT_BIND - Webhook listener address (default: 127.0.0.1:7070)",
            "RULEBOT_DRY_RUN - Log mutations instead of sending them (true/false)",
            "RULEBOT_VERBOSE_ERRORS - Include error detail in responses (true/false)",
            "RULEBOT_USE_LOCAL_RULES - Read rules from a local file (true/false)",
            "RULEBOT_LOCAL_RULES_PATH - Local rules file (default: .github/rulebot.yml)",
            "RULEBOT_LOG_DIR - Directory for the log file",
        ]
    }
}

/// Accepts true/false and 1/0.
fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
