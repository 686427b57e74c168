use chrono::{DateTime, Utc};
use db::models::{package::PackageStatus, tracking::TrackingUpdate};
use serde::{Deserialize, Serialize};
use tracking::TrackingStatus;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub tracking_number: String,
    pub carrier: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePackageInfo {
    pub package_id: i64,
    pub user_id: i64,
    pub subscription_id: Option<i64>,
    pub carrier: String,
    pub status: PackageStatus,
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageStatusResponse {
    pub tracking_status: Option<TrackingStatus>,
    pub active_package_info: Option<ActivePackageInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateExistingRequest {
    pub user_id: i64,
    pub pending_package_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesQuery {
    pub tracking_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesResponse {
    pub tracking_number: String,
    pub updates: Vec<TrackingUpdate>,
}
