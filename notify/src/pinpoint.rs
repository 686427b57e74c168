use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_pinpointsmsvoicev2::{
    Client, operation::send_text_message::SendTextMessageError, types::MessageType,
};

use crate::channel::{ChannelError, SmsChannel};

/// Transactional SMS through AWS End User Messaging (Pinpoint SMS Voice v2).
pub struct PinpointSmsChannel {
    client: Client,
    origination_number: String,
}

impl PinpointSmsChannel {
    pub fn new(sdk_config: &SdkConfig, origination_number: impl Into<String>) -> Self {
        PinpointSmsChannel {
            client: Client::new(sdk_config),
            origination_number: origination_number.into(),
        }
    }
}

#[async_trait]
impl SmsChannel for PinpointSmsChannel {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let result = self
            .client
            .send_text_message()
            .destination_phone_number(to)
            .message_body(body)
            .message_type(MessageType::Transactional)
            .origination_identity(&self.origination_number)
            .send()
            .await;

        match result {
            Ok(output) => {
                log::info!(
                    "SMS sent, message id {}",
                    output.message_id().unwrap_or("unknown")
                );
                Ok(())
            }
            Err(error) => {
                if let Some(SendTextMessageError::AccessDeniedException(denied)) =
                    error.as_service_error()
                {
                    log::error!(
                        "Missing sms-voice:SendTextMessage permission: {}",
                        denied.message().unwrap_or("access denied")
                    );
                    return Err(ChannelError::AccessDenied(
                        denied.message().unwrap_or("access denied").to_string(),
                    ));
                }
                Err(ChannelError::from_sdk(&error))
            }
        }
    }
}
