use common::error::{AppError, Res};
use db::store::Store;
use notify::NotificationDispatcher;
use serde_json::Value;

use crate::dtos::webhook::WebhookOutcome;

/// Rejects the call when a webhook token is configured and not presented.
pub fn check_token(expected: Option<&str>, given: Option<&str>) -> Res<()> {
    match expected {
        Some(expected) if given != Some(expected) => {
            log::warn!("Tracking webhook called with an invalid token");
            Err(AppError::Unauthorized("Invalid webhook token".to_string()))
        }
        _ => Ok(()),
    }
}

/// Stores a Shippo `track_updated` event and alerts the owner of the active
/// package when the status is new.
pub async fn record_tracking_event(
    store: &dyn Store,
    dispatcher: &NotificationDispatcher,
    body: &Value,
) -> Res<WebhookOutcome> {
    let update = tracking::parse_track_event(body)?;
    let (stored, inserted) = store.create_tracking_update(update).await?;

    if !inserted {
        log::info!(
            "Tracking update {} for {} already recorded",
            stored.status,
            stored.tracking_number
        );
        return Ok(WebhookOutcome {
            received: true,
            ..Default::default()
        });
    }

    let Some(package) = store
        .find_active_package_by_tracking(&stored.tracking_number)
        .await?
    else {
        log::info!("No active package tracks {}", stored.tracking_number);
        return Ok(WebhookOutcome {
            received: true,
            recorded: true,
            notified: false,
        });
    };

    let notified = match dispatcher.send_status_update(&package, &stored).await {
        Ok(delivery) => {
            log::info!("Status update for package {}: {:?}", package.id, delivery);
            true
        }
        Err(failure) => {
            log::error!("Status update for package {} failed: {}", package.id, failure);
            false
        }
    };

    Ok(WebhookOutcome {
        received: true,
        recorded: true,
        notified,
    })
}
