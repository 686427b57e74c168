use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::JsonValue;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub id: i64,
    pub tracking_number: String,
    pub status: String,
    pub status_details: String,
    pub status_date: DateTime<Utc>,
    pub carrier: String,
    pub location: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}
