use common::error::{AppError, Res};
use serde::{Deserialize, Serialize};

pub const MISSING_CAPTURE_IDS: &str =
    "Internal processing error: Missing necessary IDs in captured order data.";

/// Ids carried through PayPal in `custom_id` so a capture or an approved
/// subscription can be tied back to our rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CorrelationMetadata {
    pub db_sub_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_package_id: Option<i64>,
    pub db_user_id: i64,
}

impl CorrelationMetadata {
    pub fn encode(&self) -> Res<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(raw: &str) -> Res<Self> {
        serde_json::from_str(raw).map_err(|error| {
            log::error!("Invalid correlation metadata {:?}: {}", raw, error);
            AppError::Internal(MISSING_CAPTURE_IDS.to_string())
        })
    }
}
