use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::platform::InboundMessage;

/// JSON body POSTed to the webhook, shaped like a Telegram update so
/// receivers written for Telegram webhooks can consume it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub message: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub text: String,
    pub chat: ChatRef,
    pub from: Sender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub username: String,
    pub first_name: String,
}

impl From<&InboundMessage> for OutboundPayload {
    fn from(message: &InboundMessage) -> Self {
        Self {
            message: MessageBody {
                text: message.text.clone(),
                chat: ChatRef {
                    id: message.chat_id,
                },
                from: Sender {
                    username: message.from_username.clone(),
                    first_name: message.from_first_name.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to serialize webhook payload")]
    Serialization(#[source] serde_json::Error),

    #[error("failed to send webhook request")]
    Transport(#[source] reqwest::Error),

    #[error("webhook returned non-success status code: {}", .0.as_u16())]
    Status(StatusCode),
}

/// Delivers payloads to a webhook with a single POST each. No retries.
#[derive(Clone, Default)]
pub struct WebhookForwarder {
    client: reqwest::Client,
}

impl WebhookForwarder {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// POST `payload` as JSON to `url`. Any 2xx status is success.
    pub async fn forward(
        &self,
        url: &str,
        payload: &OutboundPayload,
    ) -> Result<StatusCode, ForwardError> {
        let body = serde_json::to_vec(payload).map_err(ForwardError::Serialization)?;

        debug!("Posting {} bytes to webhook: {}", body.len(), url);

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(ForwardError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status));
        }

        Ok(status)
    }
}
