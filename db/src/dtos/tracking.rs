use chrono::{DateTime, Utc};
use sqlx::types::JsonValue;

#[derive(Debug, Clone)]
pub struct TrackingUpdateCreateRequest {
    pub tracking_number: String,
    pub status: String,
    pub status_details: String,
    pub status_date: DateTime<Utc>,
    pub carrier: String,
    pub location: Option<JsonValue>,
}
