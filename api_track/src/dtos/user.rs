use api_pay::Plan;
use db::models::{package::PackageStatus, subscription::Tier, user::Channel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub tracking_number: String,
    pub carrier: Option<String>,
    pub notification_type: Channel,
    pub contact_info: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    pub user_id: i64,
    pub pending_package_id: i64,
    pub package_status: PackageStatus,
    pub has_active_subscription: bool,
    pub tier_name: Option<Tier>,
    /// Whether the package can be activated with the current subscription.
    pub has_credit: bool,
    #[serde(rename = "currentPayPalSubscriptionId")]
    pub current_paypal_subscription_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusRequest {
    pub contact_info: String,
    pub contact_type: Channel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub user_id: Option<i64>,
    pub current_tier: Option<Plan>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchPlanRequest {
    pub user_id: i64,
    pub new_tier: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchPlanResponse {
    pub user_id: i64,
    pub current_tier: Option<Tier>,
    pub plan: Plan,
    /// Pass on to create-reference so the old PayPal subscription is
    /// cancelled when the new one is created.
    #[serde(rename = "cancelPreviousPayPalSubId")]
    pub cancel_previous_paypal_sub_id: Option<String>,
}
