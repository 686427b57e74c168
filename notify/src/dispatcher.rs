use std::{fmt, sync::Arc};

use db::{
    dtos::notification::NotificationCreateRequest,
    models::{
        notification::DeliveryStatus, package::Package, tracking::TrackingUpdate,
        user::{Channel, User},
    },
    store::Store,
};
use serde_json::json;
use thiserror::Error;
use tracking::ShippoClient;

use crate::channel::{ChannelError, EmailChannel, SmsChannel};

pub const WELCOME_TEMPLATE: &str = "TrackingWelcome";
pub const STATUS_UPDATE_TEMPLATE: &str = "TrackingUpdate";
pub const PURPOSE_WELCOME: &str = "welcome";
pub const PURPOSE_STATUS_UPDATE: &str = "status_update";

const DEFAULT_CARRIER: &str = "usps";
const STATUS_UNAVAILABLE: &str = "Status Unavailable";

/// How a notification went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Outside production nothing is sent.
    Simulated,
    Email,
    Sms,
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Delivery::Simulated => "Test environment - notification simulated",
            Delivery::Email => "Welcome email sent successfully",
            Delivery::Sms => "Welcome SMS sent successfully",
        })
    }
}

/// Outcome of the email fallback after an SMS permission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsFallback {
    NoEmail,
    Sent,
    Failed,
}

impl SmsFallback {
    fn message(&self) -> &'static str {
        match self {
            SmsFallback::NoEmail => {
                "SMS notification failed due to missing IAM permissions (sms-voice:SendTextMessage)."
            }
            SmsFallback::Sent => "SMS notification failed due to permissions. Sent fallback email.",
            SmsFallback::Failed => "Failed to send both SMS and fallback email notification.",
        }
    }
}

fn delivery_message(channel: &Channel, reason: &str) -> String {
    match channel {
        Channel::Sms => format!("SMS notification failed: {}", reason),
        Channel::Email => format!("Notification failed: {}", reason),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyFailure {
    #[error("Failed to fetch user preferences: {0}")]
    UserLookup(String),

    #[error("User has no {0} contact information")]
    MissingContact(Channel),

    #[error("{}", .fallback.message())]
    SmsAccessDenied { fallback: SmsFallback },

    /// The provider refused our credentials.
    #[error("{}", delivery_message(.channel, .reason))]
    CredentialsRejected { channel: Channel, reason: String },

    #[error("{}", delivery_message(.channel, .reason))]
    Delivery { channel: Channel, reason: String },
}

impl NotifyFailure {
    fn from_channel(channel: Channel, error: ChannelError) -> Self {
        match error {
            ChannelError::CredentialsRejected(reason) => {
                NotifyFailure::CredentialsRejected { channel, reason }
            }
            ChannelError::AccessDenied(reason) | ChannelError::Provider(reason) => {
                NotifyFailure::Delivery { channel, reason }
            }
        }
    }
}

/// Adds the US country code to numbers stored without one.
pub fn to_e164(phone: &str) -> String {
    let phone = phone.trim();
    if phone.starts_with('+') {
        phone.to_string()
    } else {
        format!("+1{}", phone)
    }
}

pub fn welcome_sms_body(
    site_url: &str,
    tracking_number: &str,
    carrier: &str,
    current_status: &str,
) -> String {
    format!(
        "NotifyTracking: Your package tracking is set up.\n\
         Tracking #: {tn}\n\
         Current status: {status}\n\
         We'll update you on every status change.\n\n\
         Track at: {site}?tracking={tn}&carrier={carrier}\n\n\
         Messages sent for status changes (max 1 per change). Msg&Data rates may apply. HELP for help, STOP to cancel.",
        tn = tracking_number,
        status = current_status,
        site = site_url,
        carrier = carrier,
    )
}

pub fn status_update_sms_body(site_url: &str, update: &TrackingUpdate) -> String {
    let mut body = format!(
        "NotifyTracking: Update for {}\nStatus: {}\n",
        update.tracking_number, update.status
    );
    if !update.status_details.is_empty() {
        body.push_str(&update.status_details);
        body.push('\n');
    }
    body.push_str(&format!(
        "\nTrack at: {}?tracking={}&carrier={}\n\nSTOP to cancel.",
        site_url, update.tracking_number, update.carrier
    ));
    body
}

/// Sends welcome and status-change notifications over the user's preferred
/// channel and records every attempt in the notification log.
pub struct NotificationDispatcher {
    store: Arc<dyn Store>,
    email: Arc<dyn EmailChannel>,
    sms: Arc<dyn SmsChannel>,
    tracking: Arc<ShippoClient>,
    simulate: bool,
    site_url: String,
}

struct Recipient {
    user: User,
    channel: Channel,
    contact: String,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        email: Arc<dyn EmailChannel>,
        sms: Arc<dyn SmsChannel>,
        tracking: Arc<ShippoClient>,
        simulate: bool,
        site_url: impl Into<String>,
    ) -> Self {
        NotificationDispatcher {
            store,
            email,
            sms,
            tracking,
            simulate,
            site_url: site_url.into(),
        }
    }

    async fn recipient(&self, user_id: i64) -> Result<Recipient, NotifyFailure> {
        let user = match self.store.find_user_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(NotifyFailure::UserLookup("User not found".to_string())),
            Err(error) => {
                log::error!("Error fetching user {} preferences: {}", user_id, error);
                return Err(NotifyFailure::UserLookup(error.to_string()));
            }
        };

        let channel = user.notification_preference;
        let Some(contact) = user.preferred_contact().map(str::to_string) else {
            log::error!("User {} has no {} contact information", user_id, channel);
            return Err(NotifyFailure::MissingContact(channel));
        };

        Ok(Recipient {
            user,
            channel,
            contact,
        })
    }

    /// The user's active package for this number, else their pending one.
    async fn find_user_package(&self, user_id: i64, tracking_number: &str) -> Option<Package> {
        let lookup = async {
            if let Some(active) = self
                .store
                .find_active_package_by_tracking(tracking_number)
                .await?
                .filter(|package| package.user_id == user_id)
            {
                return Ok(Some(active));
            }
            self.store
                .find_pending_package_by_tracking(user_id, tracking_number)
                .await
        };

        match lookup.await {
            Ok(package) => package,
            Err(error) => {
                log::error!("Error finding package for notification logging: {}", error);
                None
            }
        }
    }

    async fn record(
        &self,
        recipient: &Recipient,
        channel: Channel,
        contact: &str,
        package_id: Option<i64>,
        purpose: &str,
        tracking_number: &str,
        status: DeliveryStatus,
    ) {
        self.store
            .log_notification(NotificationCreateRequest {
                package_id,
                user_id: recipient.user.id,
                channel,
                contact_info: contact.to_string(),
                purpose: purpose.to_string(),
                tracking_number: tracking_number.to_string(),
                status,
            })
            .await;
    }

    /// Welcome notification after a package was activated.
    pub async fn send_confirmation(
        &self,
        user_id: i64,
        tracking_number: &str,
    ) -> Result<Delivery, NotifyFailure> {
        log::info!(
            "Sending confirmation for tracking #{} to user {}",
            tracking_number,
            user_id
        );
        if self.simulate {
            log::info!("Notification for {} simulated", tracking_number);
            return Ok(Delivery::Simulated);
        }

        let recipient = self.recipient(user_id).await?;
        let package = self.find_user_package(user_id, tracking_number).await;
        let package_id = package.as_ref().map(|package| package.id);
        let carrier = package
            .map(|package| package.carrier)
            .filter(|carrier| !carrier.is_empty())
            .unwrap_or_else(|| DEFAULT_CARRIER.to_string());

        match recipient.channel {
            Channel::Email => {
                let data = json!({
                    "tracking_number": tracking_number,
                    "notification_type": recipient.channel.as_str(),
                    "contact_info": recipient.contact,
                    "carrier": carrier,
                });
                let result = self
                    .email
                    .send_templated(&recipient.contact, WELCOME_TEMPLATE, &data)
                    .await;
                let status = delivery_status(&result);
                self.record(
                    &recipient,
                    Channel::Email,
                    &recipient.contact,
                    package_id,
                    PURPOSE_WELCOME,
                    tracking_number,
                    status,
                )
                .await;

                match result {
                    Ok(()) => Ok(Delivery::Email),
                    Err(error) => {
                        log::error!("Error sending welcome email: {}", error);
                        Err(NotifyFailure::from_channel(Channel::Email, error))
                    }
                }
            }
            Channel::Sms => {
                self.send_welcome_sms(&recipient, package_id, tracking_number, &carrier)
                    .await
            }
        }
    }

    async fn send_welcome_sms(
        &self,
        recipient: &Recipient,
        package_id: Option<i64>,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Delivery, NotifyFailure> {
        let current_status = match self
            .tracking
            .get_tracking_status(tracking_number, carrier)
            .await
        {
            Ok(Some(status)) if !status.status.is_empty() => status.status,
            Ok(_) => STATUS_UNAVAILABLE.to_string(),
            Err(error) => {
                log::error!("Error fetching tracking status for SMS welcome: {}", error);
                STATUS_UNAVAILABLE.to_string()
            }
        };

        let body = welcome_sms_body(&self.site_url, tracking_number, carrier, &current_status);
        let result = self.sms.send_text(&to_e164(&recipient.contact), &body).await;
        self.record(
            recipient,
            Channel::Sms,
            &recipient.contact,
            package_id,
            PURPOSE_WELCOME,
            tracking_number,
            delivery_status(&result),
        )
        .await;

        match result {
            Ok(()) => Ok(Delivery::Sms),
            Err(ChannelError::AccessDenied(reason)) => {
                log::error!("IAM permissions error sending SMS: {}", reason);
                let fallback = self
                    .send_fallback_email(recipient, package_id, tracking_number)
                    .await;
                Err(NotifyFailure::SmsAccessDenied { fallback })
            }
            Err(error) => {
                log::error!("Error sending SMS notification: {}", error);
                Err(NotifyFailure::from_channel(Channel::Sms, error))
            }
        }
    }

    async fn send_fallback_email(
        &self,
        recipient: &Recipient,
        package_id: Option<i64>,
        tracking_number: &str,
    ) -> SmsFallback {
        let Some(email) = recipient.user.contact_for(Channel::Email) else {
            return SmsFallback::NoEmail;
        };

        log::info!("Attempting fallback to email notification");
        let subject = format!("Package Tracking Subscription Confirmed - {}", tracking_number);
        let body = format!(
            "Your package tracking subscription for {} has been set up. Due to a technical issue, \
             SMS notifications could not be enabled. Please contact support for assistance.",
            tracking_number
        );
        let result = self.email.send_text(email, &subject, &body).await;
        self.record(
            recipient,
            Channel::Email,
            email,
            package_id,
            PURPOSE_WELCOME,
            tracking_number,
            delivery_status(&result),
        )
        .await;

        match result {
            Ok(()) => SmsFallback::Sent,
            Err(error) => {
                log::error!("Failed to send fallback email: {}", error);
                SmsFallback::Failed
            }
        }
    }

    /// Status-change alert for an active package.
    pub async fn send_status_update(
        &self,
        package: &Package,
        update: &TrackingUpdate,
    ) -> Result<Delivery, NotifyFailure> {
        if self.simulate {
            log::info!(
                "Status update {} for {} simulated",
                update.status,
                update.tracking_number
            );
            return Ok(Delivery::Simulated);
        }

        let recipient = self.recipient(package.user_id).await?;
        let result = match recipient.channel {
            Channel::Email => {
                let data = json!({
                    "tracking_number": update.tracking_number,
                    "status": update.status,
                    "status_details": update.status_details,
                    "status_date": update.status_date.to_rfc3339(),
                    "carrier": update.carrier,
                    "location": update.location,
                });
                self.email
                    .send_templated(&recipient.contact, STATUS_UPDATE_TEMPLATE, &data)
                    .await
            }
            Channel::Sms => {
                let body = status_update_sms_body(&self.site_url, update);
                self.sms.send_text(&to_e164(&recipient.contact), &body).await
            }
        };

        self.record(
            &recipient,
            recipient.channel,
            &recipient.contact,
            Some(package.id),
            PURPOSE_STATUS_UPDATE,
            &update.tracking_number,
            delivery_status(&result),
        )
        .await;

        match result {
            Ok(()) => Ok(match recipient.channel {
                Channel::Email => Delivery::Email,
                Channel::Sms => Delivery::Sms,
            }),
            Err(error) => {
                log::error!(
                    "Status update for {} failed: {}",
                    update.tracking_number,
                    error
                );
                Err(NotifyFailure::from_channel(recipient.channel, error))
            }
        }
    }
}

fn delivery_status(result: &Result<(), ChannelError>) -> DeliveryStatus {
    match result {
        Ok(()) => DeliveryStatus::Sent,
        Err(_) => DeliveryStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers_get_a_country_code() {
        assert_eq!(to_e164("5551234567"), "+15551234567");
        assert_eq!(to_e164("+445551234567"), "+445551234567");
    }

    #[test]
    fn welcome_sms_links_to_the_tracking_page() {
        let body = welcome_sms_body("https://notifytracking.com", "1Z999", "ups", "TRANSIT");

        assert!(body.starts_with("NotifyTracking: Your package tracking is set up.\nTracking #: 1Z999\n"));
        assert!(body.contains("Current status: TRANSIT\n"));
        assert!(body.contains("Track at: https://notifytracking.com?tracking=1Z999&carrier=ups\n\n"));
        assert!(body.ends_with("HELP for help, STOP to cancel."));
    }

    #[test]
    fn failures_render_caller_facing_messages() {
        assert_eq!(
            NotifyFailure::UserLookup("User not found".into()).to_string(),
            "Failed to fetch user preferences: User not found"
        );
        assert_eq!(
            NotifyFailure::MissingContact(Channel::Sms).to_string(),
            "User has no sms contact information"
        );
        assert_eq!(
            NotifyFailure::Delivery { channel: Channel::Sms, reason: "throttled".into() }.to_string(),
            "SMS notification failed: throttled"
        );
        assert_eq!(
            NotifyFailure::Delivery { channel: Channel::Email, reason: "rejected".into() }.to_string(),
            "Notification failed: rejected"
        );
        assert_eq!(
            NotifyFailure::SmsAccessDenied { fallback: SmsFallback::Sent }.to_string(),
            "SMS notification failed due to permissions. Sent fallback email."
        );
    }
}
