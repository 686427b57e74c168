use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookOutcome {
    pub received: bool,
    /// False when the same status was already stored.
    pub recorded: bool,
    pub notified: bool,
}
