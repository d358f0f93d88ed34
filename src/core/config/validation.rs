#![allow(clippy::result_large_err)]

use super::EngineConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::net::SocketAddr;
use url::Url;

/// What the process is about to do with the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Offline,
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &EngineConfig, mode: RunMode) -> Result<(), AppError> {
        Url::parse(&config.github.api_base).map_err(|e| {
            invalid(format!("github.api_base is not a valid URL: {}", e))
        })?;

        if mode == RunMode::Offline {
            return Ok(());
        }

        config
            .webhook
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| invalid(format!("webhook.bind '{}' is invalid: {}", config.webhook.bind, e)))?;

        let secret_missing = config
            .webhook
            .secret
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true);
        if secret_missing {
            return Err(invalid("webhook secret is required to serve (RULEBOT_WEBHOOK_SECRET)"));
        }

        if config.webhook.max_body_bytes == 0 {
            return Err(invalid("webhook.max_body_bytes must be greater than zero"));
        }

        // Reads still go to GitHub with local rules or dry-run enabled.
        if config.github.app_id.is_none() || config.github.app_key.is_none() {
            return Err(invalid(
                "github.app_id and an app key are required (RULEBOT_APP_ID, RULEBOT_APP_KEY)",
            ));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("CFG-INVALID")
}
