use bigdecimal::BigDecimal;

use crate::models::subscription::Tier;

pub struct SubscriptionCreateRequest {
    pub user_id: i64,
    pub tier: Tier,
    pub paypal_plan_id: Option<String>,
    pub package_limit: i32,
    pub amount: BigDecimal,
}
