use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use shared_config::{AppConfig, MessagingChannel};

use crate::models::{DeliveryError, DeliveryReceipt};

/// Outbound message transport. `to` is already in E.164 form.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError>;
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
}

/// Twilio Messages API over plain REST, for WhatsApp or SMS.
pub struct TwilioSender {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    channel: MessagingChannel,
}

impl TwilioSender {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.twilio_base_url.trim_end_matches('/').to_string(),
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_from_number.clone(),
            channel: config.messaging_channel,
        }
    }

    fn address(&self, number: &str) -> String {
        match self.channel {
            MessagingChannel::WhatsApp => format!("whatsapp:{}", number),
            MessagingChannel::Sms => number.to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.base_url, self.account_sid)
    }
}

#[async_trait]
impl NotificationSender for TwilioSender {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        if self.account_sid.is_empty() || self.auth_token.is_empty() || self.from_number.is_empty() {
            return Err(DeliveryError::NotConfigured);
        }

        let from = self.address(&self.from_number);
        let to = self.address(to);
        debug!("Sending message to {}", to);

        let response = self.client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TwilioErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(text);
            error!("Twilio rejected message to {} ({}): {}", to, status, message);
            return Err(DeliveryError::Rejected { status: status.as_u16(), message });
        }

        response
            .json::<DeliveryReceipt>()
            .await
            .map_err(|e| DeliveryError::Transport(format!("unreadable provider response: {}", e)))
    }
}
