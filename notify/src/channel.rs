use async_trait::async_trait;
use aws_sdk_sesv2::error::{DisplayErrorContext, ProvideErrorMetadata};
use serde_json::Value;
use thiserror::Error;

/// Why a channel could not deliver a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The caller lacks permission for the send action.
    #[error("{0}")]
    AccessDenied(String),

    /// The provider did not accept our credentials at all.
    #[error("{0}")]
    CredentialsRejected(String),

    #[error("{0}")]
    Provider(String),
}

const ACCESS_DENIED_CODES: &[&str] = &["AccessDeniedException", "AccessDenied"];
const CREDENTIAL_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "InvalidSignatureException",
    "ExpiredTokenException",
];

impl ChannelError {
    /// Classifies a provider error by its service error code.
    pub fn from_code(code: Option<&str>, reason: String) -> Self {
        match code {
            Some(code) if ACCESS_DENIED_CODES.contains(&code) => ChannelError::AccessDenied(reason),
            Some(code) if CREDENTIAL_CODES.contains(&code) => {
                ChannelError::CredentialsRejected(reason)
            }
            _ => ChannelError::Provider(reason),
        }
    }

    pub(crate) fn from_sdk<E>(error: &E) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        let reason = error
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| DisplayErrorContext(error).to_string());
        Self::from_code(error.code(), reason)
    }

    pub fn reason(&self) -> &str {
        match self {
            ChannelError::AccessDenied(reason)
            | ChannelError::CredentialsRejected(reason)
            | ChannelError::Provider(reason) => reason,
        }
    }
}

#[async_trait]
pub trait EmailChannel: Send + Sync {
    /// Sends a stored provider template rendered with `data`.
    async fn send_templated(
        &self,
        to: &str,
        template: &str,
        data: &Value,
    ) -> Result<(), ChannelError>;

    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait SmsChannel: Send + Sync {
    /// `to` must already be in E.164 form.
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError>;
}
