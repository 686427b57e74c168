use std::sync::Arc;

use chrono::Utc;
use common::{
    env_config::PayPalConfig,
    error::{AppError, Res},
};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::services::token::{AccessToken, TokenCache};

const TOKEN_FAILURE: &str = "Failed to get PayPal access token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Default, Deserialize)]
struct PayPalError {
    message: Option<String>,
}

/// Order or subscription created at PayPal, awaiting buyer approval.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalReference {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct Money {
    currency_code: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
    status: Option<String>,
    custom_id: Option<String>,
    amount: Option<Money>,
}

#[derive(Debug, Default, Deserialize)]
struct CapturePayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct CaptureUnit {
    reference_id: Option<String>,
    #[serde(default)]
    payments: CapturePayments,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<CaptureUnit>,
}

/// What we keep from a captured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOrder {
    pub order_id: String,
    pub status: String,
    pub capture_id: Option<String>,
    pub capture_status: Option<String>,
    pub custom_id: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    /// Tracking number the order was created for.
    pub reference_id: Option<String>,
}

impl From<CaptureResponse> for CapturedOrder {
    fn from(response: CaptureResponse) -> Self {
        let unit = response.purchase_units.into_iter().next();
        let reference_id = unit.as_ref().and_then(|unit| unit.reference_id.clone());
        let capture = unit.and_then(|unit| unit.payments.captures.into_iter().next());

        let (capture_id, capture_status, custom_id, amount, currency) = match capture {
            Some(capture) => {
                let (amount, currency) = match capture.amount {
                    Some(money) => (Some(money.value), Some(money.currency_code)),
                    None => (None, None),
                };
                (
                    Some(capture.id),
                    capture.status,
                    capture.custom_id,
                    amount,
                    currency,
                )
            }
            None => (None, None, None, None, None),
        };

        CapturedOrder {
            order_id: response.id,
            status: response.status,
            capture_id,
            capture_status,
            custom_id,
            amount,
            currency,
            reference_id,
        }
    }
}

/// One-time order as sent to `/v2/checkout/orders`.
#[derive(Debug, Clone)]
pub struct OrderRequest<'a> {
    pub tracking_number: &'a str,
    pub description: &'a str,
    pub custom_id: &'a str,
    /// Two-decimal USD amount.
    pub amount: &'a str,
    /// Sent as `PayPal-Request-Id`.
    pub request_id: &'a str,
}

/// Client for the PayPal REST API. The access token lives in an injected
/// [`TokenCache`] shared by every clone of the client.
#[derive(Clone)]
pub struct PayPalClient {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    return_url: String,
    cancel_url: String,
    tokens: Arc<TokenCache>,
}

/// PayPal order and subscription ids are alphanumeric with dashes. Anything
/// else is refused before it can reach a request path.
fn resource_id<'a>(kind: &str, id: &'a str) -> Res<&'a str> {
    let id = id.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Ok(id)
    } else {
        Err(AppError::BadRequest(format!("Invalid PayPal {} id", kind)))
    }
}

fn error_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<PayPalError>(body)
        .unwrap_or_default()
        .message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

impl PayPalClient {
    pub fn new(config: &PayPalConfig, tokens: Arc<TokenCache>) -> Self {
        PayPalClient {
            http: Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            return_url: config.return_url.clone(),
            cancel_url: config.cancel_url.clone(),
            tokens,
        }
    }

    /// `{base}/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Res<Url> {
        let invalid = || AppError::Internal("Invalid PayPal API URL".to_string());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request_token(&self) -> Res<AccessToken> {
        let response = self
            .http
            .post(self.endpoint(&["v1", "oauth2", "token"])?)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::error!("PayPal token request failed ({}): {}", status, body);
            return Err(AppError::Upstream(TOKEN_FAILURE.to_string()));
        }

        let token: TokenResponse = response.json().await.map_err(|error| {
            log::error!("Unreadable PayPal token response: {}", error);
            AppError::Upstream(TOKEN_FAILURE.to_string())
        })?;

        Ok(AccessToken::new(token.access_token, token.expires_in, Utc::now()))
    }

    pub async fn access_token(&self) -> Res<String> {
        self.tokens.get_or_refresh(|| self.request_token()).await
    }

    /// Reads a create/capture response, turning a rejection into `Upstream`
    /// with PayPal's message or `fallback`.
    async fn read_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        fallback: &str,
    ) -> Res<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::error!("PayPal API error ({}): {}", status, body);
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            return Err(AppError::Upstream(error_message(&body, fallback)));
        }

        Ok(serde_json::from_str(&body)?)
    }

    pub async fn create_subscription(&self, plan_id: &str, custom_id: &str) -> Res<PayPalReference> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(self.endpoint(&["v1", "billing", "subscriptions"])?)
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(&json!({
                "plan_id": plan_id,
                "custom_id": custom_id,
                "application_context": {
                    "return_url": self.return_url,
                    "cancel_url": self.cancel_url,
                    "user_action": "SUBSCRIBE_NOW",
                },
            }))
            .send()
            .await?;

        let reference: PayPalReference = self
            .read_json(response, "Failed to create PayPal subscription")
            .await?;
        log::info!("PayPal subscription {} created", reference.id);
        Ok(reference)
    }

    pub async fn create_order(&self, order: OrderRequest<'_>) -> Res<PayPalReference> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(self.endpoint(&["v2", "checkout", "orders"])?)
            .bearer_auth(token)
            .header("PayPal-Request-Id", order.request_id)
            .json(&json!({
                "intent": "CAPTURE",
                "purchase_units": [{
                    "reference_id": order.tracking_number,
                    "description": order.description,
                    "custom_id": order.custom_id,
                    "amount": {
                        "currency_code": "USD",
                        "value": order.amount,
                    },
                }],
                "application_context": {
                    "return_url": self.return_url,
                    "cancel_url": self.cancel_url,
                    "user_action": "PAY_NOW",
                },
            }))
            .send()
            .await?;

        let reference: PayPalReference = self
            .read_json(response, "Failed to create PayPal order")
            .await?;
        log::info!("PayPal order {} created", reference.id);
        Ok(reference)
    }

    pub async fn capture_order(&self, order_id: &str) -> Res<CapturedOrder> {
        let order_id = resource_id("order", order_id)?;
        let url = self.endpoint(&["v2", "checkout", "orders", order_id, "capture"])?;
        let token = self.access_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let captured: CaptureResponse = self
            .read_json(response, "Failed to capture PayPal order")
            .await?;
        Ok(captured.into())
    }

    /// Cancels a PayPal subscription. An empty id means there is nothing to
    /// cancel; anything but 204 from PayPal is an error.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Res<()> {
        if subscription_id.trim().is_empty() {
            log::warn!("No PayPal subscription id given; nothing to cancel");
            return Ok(());
        }

        let subscription_id = resource_id("subscription", subscription_id)?;
        let url = self.endpoint(&["v1", "billing", "subscriptions", subscription_id, "cancel"])?;
        let token = self.access_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "reason": "Customer requested cancellation or plan change" }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            log::info!("PayPal subscription {} cancelled", subscription_id);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let details = serde_json::from_str::<Value>(&body)
            .unwrap_or_else(|_| json!({ "statusText": status.canonical_reason().unwrap_or("") }));
        log::error!(
            "Failed to cancel PayPal subscription {}: {} {}",
            subscription_id,
            status,
            details
        );
        Err(AppError::Upstream(format!(
            "PayPal API Error: {} - {}",
            status.as_u16(),
            details
        )))
    }
}
