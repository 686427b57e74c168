use bigdecimal::BigDecimal;

#[derive(Debug, Clone)]
pub struct PaymentCreateRequest {
    pub user_id: Option<i64>,
    pub subscription_id: Option<i64>,
    pub package_id: Option<i64>,
    pub paypal_order_id: Option<String>,
    pub paypal_capture_id: Option<String>,
    pub paypal_subscription_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
}
