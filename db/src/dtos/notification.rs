use crate::models::{notification::DeliveryStatus, user::Channel};

#[derive(Debug, Clone)]
pub struct NotificationCreateRequest {
    pub package_id: Option<i64>,
    pub user_id: i64,
    pub channel: Channel,
    pub contact_info: String,
    /// `welcome` or `status_update`
    pub purpose: String,
    pub tracking_number: String,
    pub status: DeliveryStatus,
}
