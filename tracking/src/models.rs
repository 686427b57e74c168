use serde::{Deserialize, Serialize};

/// Location block as Shippo sends it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShippoLocation {
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippoTrackingEvent {
    pub status: Option<String>,
    pub status_description: Option<String>,
    pub status_date: Option<String>,
    pub location: Option<ShippoLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippoTrackingStatus {
    pub status: Option<String>,
    pub status_details: Option<String>,
    pub status_description: Option<String>,
    pub status_date: Option<String>,
    pub location: Option<ShippoLocation>,
}

/// Body of `GET /tracks/{carrier}/{number}` and of `track_updated` webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippoTrack {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub tracking_status: Option<ShippoTrackingStatus>,
    #[serde(default)]
    pub tracking_history: Vec<ShippoTrackingEvent>,
    pub eta: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShippoError {
    pub detail: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: String,
    pub location: Option<String>,
    pub timestamp: String,
}

/// Carrier status in the shape the API hands to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStatus {
    pub status: String,
    pub summary: String,
    pub details: String,
    pub last_update: String,
    pub delivery_date: Option<String>,
    pub location: Option<String>,
    pub events: Vec<TrackingEvent>,
}

/// "City, ST 12345"; `None` when Shippo sent no location.
pub fn format_location(location: Option<&ShippoLocation>) -> Option<String> {
    let location = location?;
    let city = location.city.as_deref().unwrap_or_default();
    let state = location.state.as_deref().unwrap_or_default();
    let zip = location.zip.as_deref().unwrap_or_default();
    Some(format!("{}, {} {}", city, state, zip).trim_end().to_string())
}

fn map_tracking_event(event: &ShippoTrackingEvent) -> TrackingEvent {
    let status = event
        .status_description
        .clone()
        .filter(|description| !description.is_empty())
        .or_else(|| event.status.clone())
        .unwrap_or_default();

    TrackingEvent {
        status,
        location: format_location(event.location.as_ref()),
        timestamp: event.status_date.clone().unwrap_or_default(),
    }
}

/// Returns `None` when Shippo knows nothing about the number yet.
pub fn map_tracking_status(data: &ShippoTrack) -> Option<TrackingStatus> {
    if data.tracking_status.is_none() && data.tracking_history.is_empty() {
        return None;
    }

    let current = data.tracking_status.as_ref();
    let field = |pick: fn(&ShippoTrackingStatus) -> Option<&String>| {
        current.and_then(pick).cloned().unwrap_or_default()
    };

    Some(TrackingStatus {
        status: current
            .and_then(|status| status.status.clone())
            .filter(|status| !status.is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        summary: field(|status| status.status_details.as_ref()),
        details: field(|status| status.status_description.as_ref()),
        last_update: field(|status| status.status_date.as_ref()),
        delivery_date: data.eta.clone(),
        location: format_location(current.and_then(|status| status.location.as_ref())),
        events: data.tracking_history.iter().map(map_tracking_event).collect(),
    })
}
