use std::sync::Arc;

use actix_web::{
    Responder, post,
    web::{self},
};
use common::{error::Res, http::Success};

use crate::{
    dtos::sub::{ActivateSubscriptionRequest, CancelSubscriptionRequest, CancelSubscriptionResponse},
    services::orchestrator::PaymentOrchestrator,
};

/// Activates a subscription after the buyer approved it at PayPal.
///
/// # Arguments
///
/// * `orchestrator` - The payment orchestrator.
/// * `req` - Our subscription id, the PayPal subscription id, the user id and
///   optionally the package to activate.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the activation outcome or
/// an `AppError` if an error occurs.
#[post("/activate")]
pub async fn post_activate(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    req: web::Json<ActivateSubscriptionRequest>,
) -> Res<impl Responder> {
    let outcome = orchestrator
        .process_subscription_activation(req.into_inner())
        .await?;
    Success::ok(outcome)
}

/// Cancels the user's active subscription, at PayPal too when it is recurring.
#[post("/cancel")]
pub async fn post_cancel(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    req: web::Json<CancelSubscriptionRequest>,
) -> Res<impl Responder> {
    let subscription = orchestrator.cancel_user_subscription(req.user_id).await?;
    Success::ok(CancelSubscriptionResponse {
        success: true,
        message: "Subscription cancelled.".to_string(),
        subscription: (&subscription).into(),
    })
}
