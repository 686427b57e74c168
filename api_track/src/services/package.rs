use common::error::{AppError, Res};
use db::store::Store;
use tracking::ShippoClient;

use crate::dtos::package::{ActivePackageInfo, PackageStatusResponse, UpdatesResponse};

const DEFAULT_CARRIER: &str = "usps";

/// Carrier status from Shippo plus who, if anyone, already tracks the number.
pub async fn package_status(
    store: &dyn Store,
    shippo: &ShippoClient,
    tracking_number: &str,
    carrier: Option<&str>,
) -> Res<PackageStatusResponse> {
    let tracking_number = tracking_number.trim();
    if tracking_number.is_empty() {
        return Err(AppError::BadRequest("trackingNumber is required".to_string()));
    }
    let carrier = carrier
        .map(str::trim)
        .filter(|carrier| !carrier.is_empty())
        .unwrap_or(DEFAULT_CARRIER);

    let tracking_status = shippo.get_tracking_status(tracking_number, carrier).await?;
    let active_package_info = store
        .find_active_package_by_tracking(tracking_number)
        .await?
        .map(|package| ActivePackageInfo {
            package_id: package.id,
            user_id: package.user_id,
            subscription_id: package.subscription_id,
            carrier: package.carrier,
            status: package.status,
            activated_at: package.updated_at,
        });

    Ok(PackageStatusResponse {
        tracking_status,
        active_package_info,
    })
}

pub async fn tracking_updates(store: &dyn Store, tracking_number: &str) -> Res<UpdatesResponse> {
    let tracking_number = tracking_number.trim();
    if tracking_number.is_empty() {
        return Err(AppError::BadRequest("trackingNumber is required".to_string()));
    }

    let updates = store.get_tracking_updates(tracking_number).await?;
    Ok(UpdatesResponse {
        tracking_number: tracking_number.to_string(),
        updates,
    })
}
