use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use common::error::Res;
use tokio::sync::Mutex;

/// Tokens are refreshed this long before PayPal would expire them.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        AccessToken {
            value: value.into(),
            expires_at: now + Duration::seconds(expires_in_secs),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_at
    }
}

/// Process-wide PayPal access token. The lock is held across a refresh, so
/// concurrent callers wait for one token request instead of each sending
/// their own.
#[derive(Debug, Default)]
pub struct TokenCache {
    current: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Res<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Res<AccessToken>>,
    {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = refresh().await?;
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    /// Drops the cached token, e.g. after PayPal rejected it.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}
