use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sesv2::{
    Client,
    types::{Body, Content, Destination, EmailContent, Message, Template},
};
use serde_json::Value;

use crate::channel::{ChannelError, EmailChannel};

/// Email through Amazon SES v2.
pub struct SesEmailChannel {
    client: Client,
    source: String,
}

impl SesEmailChannel {
    pub fn new(sdk_config: &SdkConfig, source: impl Into<String>) -> Self {
        SesEmailChannel {
            client: Client::new(sdk_config),
            source: source.into(),
        }
    }

    async fn send(&self, to: &str, content: EmailContent) -> Result<(), ChannelError> {
        let destination = Destination::builder().to_addresses(to).build();

        self.client
            .send_email()
            .from_email_address(&self.source)
            .destination(destination)
            .content(content)
            .send()
            .await
            .map_err(|e| ChannelError::from_sdk(&e))?;
        Ok(())
    }
}

fn text(data: &str) -> Result<Content, ChannelError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| ChannelError::Provider(e.to_string()))
}

#[async_trait]
impl EmailChannel for SesEmailChannel {
    async fn send_templated(
        &self,
        to: &str,
        template: &str,
        data: &Value,
    ) -> Result<(), ChannelError> {
        let template = Template::builder()
            .template_name(template)
            .template_data(data.to_string())
            .build();
        let content = EmailContent::builder().template(template).build();
        self.send(to, content).await
    }

    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        let message = Message::builder()
            .subject(text(subject)?)
            .body(Body::builder().text(text(body)?).build())
            .build();
        let content = EmailContent::builder().simple(message).build();
        self.send(to, content).await
    }
}
