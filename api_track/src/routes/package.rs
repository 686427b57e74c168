use std::sync::Arc;

use actix_web::{
    Responder, get, post,
    web::{self},
};
use api_pay::PaymentOrchestrator;
use common::{error::Res, http::Success};
use db::store::Store;
use tracking::ShippoClient;

use crate::{
    dtos::package::{ActivateExistingRequest, StatusQuery, UpdatesQuery},
    services,
};

/// Current carrier status of a tracking number and the active package, if
/// any user already tracks it.
///
/// # Arguments
///
/// * `store` - The persistence store.
/// * `shippo` - The Shippo tracking client.
/// * `query` - `trackingNumber` and optional `carrier`.
///
/// # Returns
///
/// A `Result` containing a `Success` response with `trackingStatus` and
/// `activePackageInfo` (either may be null), or an `AppError` if Shippo failed.
#[get("/status")]
pub async fn get_status(
    store: web::Data<Arc<dyn Store>>,
    shippo: web::Data<Arc<ShippoClient>>,
    query: web::Query<StatusQuery>,
) -> Res<impl Responder> {
    let status = services::package::package_status(
        store.get_ref().as_ref(),
        shippo.get_ref().as_ref(),
        &query.tracking_number,
        query.carrier.as_deref(),
    )
    .await?;
    Success::ok(status)
}

/// Activates a pending package with the credit of the user's recurring
/// subscription.
#[post("/activate-existing")]
pub async fn post_activate_existing(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    req: web::Json<ActivateExistingRequest>,
) -> Res<impl Responder> {
    let outcome = orchestrator
        .activate_with_credit(req.user_id, req.pending_package_id)
        .await?;
    Success::ok(outcome)
}

#[get("/updates")]
pub async fn get_updates(
    store: web::Data<Arc<dyn Store>>,
    query: web::Query<UpdatesQuery>,
) -> Res<impl Responder> {
    let updates =
        services::package::tracking_updates(store.get_ref().as_ref(), &query.tracking_number)
            .await?;
    Success::ok(updates)
}
