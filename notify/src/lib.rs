use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sesv2::config::Credentials;
use common::env_config::AwsConfig;

pub mod channel;
pub mod dispatcher;
pub mod pinpoint;
pub mod ses;

pub use channel::{ChannelError, EmailChannel, SmsChannel};
pub use dispatcher::{Delivery, NotificationDispatcher, NotifyFailure, SmsFallback};
pub use pinpoint::PinpointSmsChannel;
pub use ses::SesEmailChannel;

/// Loads the shared AWS SDK configuration. Explicit keys win over the
/// default credential chain when both are set.
pub async fn load_aws_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));

    if !aws.access_key_id.is_empty() && !aws.secret_access_key.is_empty() {
        loader = loader.credentials_provider(Credentials::new(
            aws.access_key_id.clone(),
            aws.secret_access_key.clone(),
            None,
            None,
            "environment",
        ));
    }

    loader.load().await
}
