use std::sync::Arc;

use actix_web::{
    Responder, post,
    web::{self},
};
use common::{error::Res, http::Success};

use crate::{
    dtos::pay::{CaptureRequest, CreateReferenceRequest},
    services::orchestrator::PaymentOrchestrator,
};

/// Creates the PayPal order (single tier) or subscription (recurring tiers)
/// the buyer approves, together with a PENDING subscription row.
///
/// # Arguments
///
/// * `orchestrator` - The payment orchestrator.
/// * `req` - Plan, price, tracking number and either a user id or contact details.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the PayPal reference id and
/// our subscription, user and package ids, or an `AppError` if an error occurs.
#[post("/create-reference")]
pub async fn post_create_reference(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    req: web::Json<CreateReferenceRequest>,
) -> Res<impl Responder> {
    let reference = orchestrator.create_reference(req.into_inner()).await?;
    Success::created(reference)
}

/// Captures an approved one-time order and activates the package it paid for.
///
/// # Arguments
///
/// * `orchestrator` - The payment orchestrator.
/// * `req` - The PayPal order id.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the activation outcome or
/// an `AppError` if the capture failed.
#[post("/capture-paypal-reference")]
pub async fn post_capture_reference(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    req: web::Json<CaptureRequest>,
) -> Res<impl Responder> {
    let outcome = orchestrator.process_one_time_payment(&req.order_id).await?;
    Success::ok(outcome)
}
