use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::dtos::tracking::TrackingUpdateCreateRequest;
use serde::Deserialize;
use serde_json::Value;

use crate::models::ShippoTrack;

const TRACK_UPDATED: &str = "track_updated";

#[derive(Debug, Deserialize)]
struct ShippoWebhookEvent {
    event: String,
    data: ShippoTrack,
}

/// Turns a Shippo `track_updated` webhook body into a tracking update.
pub fn parse_track_event(body: &Value) -> Res<TrackingUpdateCreateRequest> {
    let event: ShippoWebhookEvent = serde_json::from_value(body.clone())
        .map_err(|e| AppError::BadRequest(format!("Invalid tracking webhook payload: {}", e)))?;

    if event.event != TRACK_UPDATED {
        return Err(AppError::BadRequest(format!(
            "Unsupported tracking webhook event: {}",
            event.event
        )));
    }

    let data = event.data;
    let tracking_number = data
        .tracking_number
        .filter(|number| !number.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Tracking webhook without tracking number".into()))?;
    let current = data
        .tracking_status
        .ok_or_else(|| AppError::BadRequest("Tracking webhook without tracking status".into()))?;

    let status_date = current
        .status_date
        .as_deref()
        .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
        .map(|date| date.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let location = match current.location {
        Some(location) => Some(serde_json::to_value(location)?),
        None => None,
    };

    Ok(TrackingUpdateCreateRequest {
        tracking_number,
        status: current.status.unwrap_or_else(|| "UNKNOWN".to_string()),
        status_details: current.status_details.unwrap_or_default(),
        status_date,
        carrier: data.carrier.unwrap_or_else(|| "usps".to_string()),
        location,
    })
}
