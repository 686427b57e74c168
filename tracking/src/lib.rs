pub mod client;
pub mod event;
pub mod models;

pub use client::ShippoClient;
pub use event::parse_track_event;
pub use models::{TrackingEvent, TrackingStatus};
