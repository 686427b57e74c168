use std::sync::Arc;

use actix_web::{
    Responder, post,
    web::{self},
};
use common::{env_config::Config, error::Res, http::Success};
use db::store::Store;
use notify::NotificationDispatcher;
use serde_json::Value;

use crate::{dtos::webhook::WebhookQuery, services};

/// Receives Shippo `track_updated` events.
///
/// # Arguments
///
/// * `config` - The application configuration, for the webhook token.
/// * `store` - The persistence store.
/// * `dispatcher` - Sends the status-update alert.
/// * `query` - `token`, required when `SHIPPO_WEBHOOK_TOKEN` is set.
/// * `body` - The raw Shippo event.
///
/// # Returns
///
/// A `Result` containing a `Success` response telling whether the update was
/// new and whether an alert went out.
#[post("/tracking")]
pub async fn post_tracking(
    config: web::Data<Arc<Config>>,
    store: web::Data<Arc<dyn Store>>,
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    query: web::Query<WebhookQuery>,
    body: web::Json<Value>,
) -> Res<impl Responder> {
    services::webhook::check_token(
        config.shippo.webhook_token.as_deref(),
        query.token.as_deref(),
    )?;

    let outcome =
        services::webhook::record_tracking_event(store.get_ref().as_ref(), &dispatcher, &body)
            .await?;
    Success::ok(outcome)
}
