use std::sync::Arc;

use actix_web::{
    Responder, get, post,
    web::{self},
};
use api_pay::{
    PaymentOrchestrator,
    dtos::sub::{CancelSubscriptionRequest, CancelSubscriptionResponse},
};
use common::{error::Res, http::Success};
use db::store::Store;

use crate::{
    dtos::user::{PrepareRequest, SubscriptionStatusRequest, SwitchPlanRequest, UserQuery},
    services,
};

/// Finds or creates the user and the pending package for a tracking request.
///
/// # Arguments
///
/// * `store` - The persistence store.
/// * `req` - Tracking number, carrier and the contact to notify.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the user and package ids and
/// the user's subscription standing, or an `AppError` if an error occurs.
#[post("/check-status-and-prepare")]
pub async fn post_check_status_and_prepare(
    store: web::Data<Arc<dyn Store>>,
    req: web::Json<PrepareRequest>,
) -> Res<impl Responder> {
    let prepared = services::user::prepare_checkout(store.get_ref().as_ref(), req.into_inner())
        .await?;
    Success::ok(prepared)
}

/// Returns the user's active subscription, 404 if there is none.
#[get("/subscription")]
pub async fn get_subscription(
    store: web::Data<Arc<dyn Store>>,
    query: web::Query<UserQuery>,
) -> Res<impl Responder> {
    let subscription =
        services::user::get_active_subscription(store.get_ref().as_ref(), query.user_id).await?;
    Success::ok(subscription)
}

/// Looks up the current plan of the user behind a contact.
///
/// # Arguments
///
/// * `store` - The persistence store.
/// * `orchestrator` - The payment orchestrator, for the plan catalog.
/// * `req` - The contact and its type.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the user id and current
/// tier, both null for unknown contacts.
#[post("/subscription-status")]
pub async fn post_subscription_status(
    store: web::Data<Arc<dyn Store>>,
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    req: web::Json<SubscriptionStatusRequest>,
) -> Res<impl Responder> {
    let status = services::user::subscription_status(
        store.get_ref().as_ref(),
        orchestrator.plans(),
        &req.contact_info,
        req.contact_type,
    )
    .await?;
    Success::ok(status)
}

/// Prepares a plan change. The returned PayPal subscription id is cancelled by
/// the next create-reference call.
#[post("/switch-plan")]
pub async fn post_switch_plan(
    store: web::Data<Arc<dyn Store>>,
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    req: web::Json<SwitchPlanRequest>,
) -> Res<impl Responder> {
    let switch = services::user::switch_plan(
        store.get_ref().as_ref(),
        orchestrator.plans(),
        req.user_id,
        &req.new_tier,
    )
    .await?;
    Success::ok(switch)
}

#[post("/cancel-subscription")]
pub async fn post_cancel_subscription(
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
