use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub user_id: Option<i64>,
    pub subscription_id: Option<i64>,
    pub package_id: Option<i64>,
    pub paypal_order_id: Option<String>,
    pub paypal_capture_id: Option<String>,
    pub paypal_subscription_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
