use db::models::subscription::{Subscription, SubscriptionStatus, Tier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateSubscriptionRequest {
    pub subscription_id: Option<i64>,
    pub paypal_subscription_id: Option<String>,
    pub pending_package_id: Option<i64>,
    pub tracking_number: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub id: i64,
    pub status: SubscriptionStatus,
    pub tier_name: Tier,
    pub is_monthly: bool,
    pub paypal_subscription_id: Option<String>,
}

impl From<&Subscription> for SubscriptionSummary {
    fn from(subscription: &Subscription) -> Self {
        SubscriptionSummary {
            id: subscription.id,
            status: subscription.status,
            tier_name: subscription.tier_name,
            is_monthly: subscription.is_monthly,
            paypal_subscription_id: subscription.paypal_subscription_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionActivationResponse {
    pub success: bool,
    pub message: String,
    pub db_subscription_id: i64,
    pub activated_package_id: Option<i64>,
    pub subscription: SubscriptionSummary,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionResponse {
    pub success: bool,
    pub message: String,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditActivationResponse {
    pub success: bool,
    pub message: String,
    pub db_subscription_id: Option<i64>,
    pub activated_package_id: i64,
    pub warning: Option<String>,
}
