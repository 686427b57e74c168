use db::models::user::Channel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferenceRequest {
    pub price: String,
    pub tracking_number: String,
    pub carrier: Option<String>,
    pub plan_type: String,
    pub paypal_plan_id: Option<String>,
    pub user_id: Option<i64>,
    pub pending_package_id: Option<i64>,
    pub contact_info: Option<String>,
    pub notification_type: Option<Channel>,
    #[serde(rename = "cancelPreviousPayPalSubId")]
    pub cancel_previous_paypal_sub_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Order,
    Subscription,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferenceResponse {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub id: String,
    pub db_subscription_id: i64,
    pub user_id: i64,
    pub pending_package_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimePaymentResponse {
    pub success: bool,
    pub message: String,
    pub paypal_order_id: String,
    pub capture_id: Option<String>,
    pub db_subscription_id: Option<i64>,
    pub activated_package_id: Option<i64>,
    pub warning: Option<String>,
}
