#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Installation token with its reported expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Usable at `now` when at least `margin` remains before expiry.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

type TokenSlot = Arc<Mutex<Option<CachedToken>>>;

/// Process-wide installation token cache.
///
/// Each installation has its own slot whose lock is held across a refresh, so
/// concurrent callers for a stale token wait for one refresh. The outer map lock is
/// only held to look up or create a slot.
pub struct TokenCache {
    margin: Duration,
    slots: Mutex<HashMap<u64, TokenSlot>>,
}

impl TokenCache {
    pub fn new(margin: Duration) -> Self {
        Self {
            margin,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    async fn slot(&self, installation: u64) -> TokenSlot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(installation).or_default())
    }

    /// Return a fresh token for `installation`, calling `refresh` when needed.
    pub async fn get_or_refresh<F, Fut>(&self, installation: u64, refresh: F) -> Result<String, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken, AppError>>,
    {
        let slot = self.slot(installation).await;
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now(), self.margin) {
                return Ok(token.value.clone());
            }
        }
        debug!(installation, "refreshing installation token");
        let token = refresh().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}
