//! Telegram Bot API: outbound messages and command long-polling

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;

/// Telegram rejects longer messages
const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        // Long polls hold the request open for up to 30s
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(40))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.bot_token),
            chat_id: config.chat_id.clone(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": truncate(text, MAX_MESSAGE_LEN),
            "disable_web_page_preview": true,
        });

        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Notification(format!("sendMessage failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Notification(format!("sendMessage response: {}", e)))?;

        if !response.ok {
            return Err(Error::Notification(
                response.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response: ApiResponse<Vec<Update>> = self
            .client
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Notification(format!("getUpdates failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Notification(format!("getUpdates response: {}", e)))?;

        if !response.ok {
            return Err(Error::Notification(
                response.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(response.result.unwrap_or_default())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) {
        debug!("Telegram: {}", truncate(message, 60));
        if let Err(e) = self.send_message(message).await {
            error!("Failed to send Telegram message: {}", e);
        }
    }
}

/// Keep at most `max` bytes, cut on a char boundary, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max.saturating_sub(3);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    warn!("Truncating {}-byte message", text.len());
    format!("{}...", &text[..end])
}
