use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::notify::Notifier;
use crate::core::session::UserId;

/// Delivers messages through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    api_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: UserId,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("kurs/1.0")
            .timeout(timeout)
            .build()?;
        Ok(TelegramNotifier {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, user: UserId, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: user,
                text,
            })
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for chat: {}", e.without_url(), user))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for chat: {}",
                response.status(),
                user
            ));
        }
        debug!(user, "Message delivered");
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, user: UserId, text: &str) -> Result<()> {
        info!(user, "{}", text);
        Ok(())
    }
}
