use chrono::{Duration, SecondsFormat, Utc};
use common::{
    env_config::ShippoConfig,
    error::{AppError, Res},
    misc::Environment,
};
use reqwest::{Client, StatusCode, Url, header::AUTHORIZATION};
use serde_json::{Value, json};

use crate::models::{
    ShippoError, ShippoTrack, TrackingEvent, TrackingStatus, map_tracking_status,
};

/// Thin client over the Shippo tracking API.
///
/// In development, or with a `shippo_test` key, status lookups return
/// canned data and webhook registration is skipped.
#[derive(Clone)]
pub struct ShippoClient {
    http: Client,
    base_url: String,
    api_key: String,
    mock: bool,
}

impl ShippoClient {
    pub fn new(config: &ShippoConfig, environment: Environment) -> Self {
        let mock = environment == Environment::Development || config.api_key.starts_with("shippo_test");
        ShippoClient {
            http: Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            mock,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// `{base}/{segments...}`; each segment is percent-encoded, so caller
    /// input cannot change the request path.
    fn endpoint(&self, segments: &[&str]) -> Res<Url> {
        if segments.iter().any(|segment| matches!(*segment, "" | "." | "..")) {
            return Err(AppError::BadRequest("Invalid tracking path".to_string()));
        }
        let invalid = || AppError::Internal("Invalid Shippo API URL".to_string());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn api_key(&self) -> Res<&str> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::Internal(
                "Shippo API key is not configured".to_string(),
            ));
        }
        Ok(&self.api_key)
    }

    /// Current carrier status of a tracking number. `Ok(None)` means Shippo
    /// has no data for it yet, which is not an error.
    pub async fn get_tracking_status(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Option<TrackingStatus>> {
        let api_key = self.api_key()?;
        let carrier = carrier.to_lowercase();

        if self.mock {
            log::info!(
                "Mock tracking status for {} (carrier: {})",
                tracking_number,
                carrier
            );
            return Ok(Some(mock_tracking_status()));
        }

        let url = self.endpoint(&["tracks", &carrier, tracking_number.trim()])?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("ShippoToken {}", api_key))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let error: ShippoError = serde_json::from_str(&body).unwrap_or_default();
            let not_found = error
                .detail
                .as_deref()
                .is_some_and(|detail| detail.contains("not found"));
            if status == StatusCode::NOT_FOUND || not_found {
                log::info!("Tracking number {} not found via Shippo", tracking_number);
                return Ok(None);
            }

            log::error!("Shippo API error ({}): {}", status, body);
            return Err(AppError::Upstream(error.detail.or(error.message).unwrap_or_else(
                || format!("Failed to get tracking status ({})", status.as_u16()),
            )));
        }

        let data: ShippoTrack = serde_json::from_str(&body)?;
        let mapped = map_tracking_status(&data);
        if mapped.is_none() {
            log::info!("No tracking status or history for {}", tracking_number);
        }
        Ok(mapped)
    }

    /// Registers the tracking number with Shippo so status changes are pushed
    /// to the webhook endpoint. Returns the Shippo track id, or `None` when
    /// registration was skipped in mock mode.
    pub async fn register_webhook(
        &self,
        tracking_number: &str,
        carrier: &str,
        subscription_id: i64,
    ) -> Res<Option<String>> {
        let api_key = self.api_key()?;
        let cleaned: String = tracking_number.split_whitespace().collect();
        let carrier = carrier.to_lowercase();

        if self.mock {
            log::info!(
                "Mock mode: skipping webhook for {} (carrier: {}) on subscription {}",
                cleaned,
                carrier,
                subscription_id
            );
            return Ok(None);
        }

        let response = self
            .http
            .post(self.endpoint(&["tracks"])?)
            .header(AUTHORIZATION, format!("ShippoToken {}", api_key))
            .json(&json!({
                "carrier": carrier,
                "tracking_number": cleaned,
                "metadata": format!("Subscription {}", subscription_id),
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::error!("Shippo webhook registration error ({}): {}", status, body);
            let error: ShippoError = serde_json::from_str(&body).unwrap_or_default();
            return Err(AppError::Upstream(
                error
                    .detail
                    .or(error.message)
                    .unwrap_or_else(|| "Failed to create Shippo webhook".to_string()),
            ));
        }

        let data: Value = serde_json::from_str(&body)?;
        let webhook_id = ["id", "object_id"]
            .iter()
            .find_map(|key| data.get(*key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Upstream("Shippo webhook creation did not return a webhook ID".to_string())
            })?;

        log::info!(
            "Shippo webhook {} created for {} (subscription {})",
            webhook_id,
            cleaned,
            subscription_id
        );
        Ok(Some(webhook_id.to_string()))
    }
}

fn mock_tracking_status() -> TrackingStatus {
    let now = Utc::now();
    let stamp = |at: chrono::DateTime<Utc>| at.to_rfc3339_opts(SecondsFormat::Millis, true);

    TrackingStatus {
        status: "TRANSIT".to_string(),
        summary: "Package in transit for testing".to_string(),
        details: "This is mock data for development/testing".to_string(),
        last_update: stamp(now),
        delivery_date: Some(stamp(now + Duration::days(3))),
        location: Some("Test Location, CA".to_string()),
        events: vec![
            TrackingEvent {
                status: "TRANSIT".to_string(),
                location: Some("Test Location, CA".to_string()),
                timestamp: stamp(now),
            },
            TrackingEvent {
                status: "LABEL_CREATED".to_string(),
                location: Some("Origin Facility, CA".to_string()),
                timestamp: stamp(now - Duration::days(1)),
            },
        ],
    }
}
