//! Telegram Bot API sink (`sendMessage`)

use super::{MessageFormat, NotificationSink, OperatorId};
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramSink {
    client: reqwest::Client,
    endpoint: String,
}

impl TelegramSink {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> MonitorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Config(format!("telegram client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: send_message_url(api_base, token),
        })
    }
}

fn send_message_url(api_base: &str, token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token)
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, operator: OperatorId, text: &str, format: MessageFormat) -> MonitorResult<()> {
        let body = SendMessage {
            chat_id: operator.0,
            text,
            parse_mode: match format {
                MessageFormat::Plain => None,
                MessageFormat::Rich => Some("HTML"),
            },
            disable_web_page_preview: true,
        };

        // the token is part of the URL, so reqwest errors are stripped of it
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MonitorError::NotificationDelivery(e.without_url().to_string()))?;

        let status = response.status();
        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| MonitorError::NotificationDelivery(e.without_url().to_string()))?;

        if !status.is_success() || !api.ok {
            return Err(MonitorError::NotificationDelivery(format!(
                "telegram returned {}: {}",
                status,
                api.description.unwrap_or_default()
            )));
        }

        debug!("Telegram message delivered to {}", operator);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
