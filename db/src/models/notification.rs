use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: i64,
    pub package_id: Option<i64>,
    pub user_id: i64,
    pub notification_type: Channel,
    pub contact_info: String,
    pub purpose: String,
    pub tracking_number: String,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}
