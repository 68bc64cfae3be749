use async_trait::async_trait;
use serde::Serialize;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};

use crate::error::{AppError, AppResult};
use crate::services::ports::ChatTransport;

#[derive(Clone)]
pub struct TelegramService {
    bot: Bot,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelegramMessage {
    pub chat_id: String,
    pub text: String,
    pub parse_mode: Option<String>,
    pub disable_web_page_preview: bool,
    pub disable_notification: bool,
}

impl Default for TelegramMessage {
    fn default() -> Self {
        Self {
            chat_id: String::new(),
            text: String::new(),
            parse_mode: Some("HTML".to_string()),
            disable_web_page_preview: true,
            disable_notification: false,
        }
    }
}

/// Parse a chat id the way the Bot API expects it (signed 64-bit).
pub fn parse_chat_id(raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Telegram("Invalid chat_id".to_string()))
}

impl TelegramService {
    pub async fn new(token: String) -> AppResult<Self> {
        let bot = Bot::new(token);

        // Verify the bot token by getting bot info
        match bot.get_me().await {
            Ok(me) => {
                tracing::info!("Telegram bot initialized: @{}", me.username());
                Ok(Self { bot })
            }
            Err(e) => {
                tracing::error!("Failed to initialize Telegram bot: {}", e);
                Err(AppError::Telegram(format!(
                    "Failed to initialize bot: {}",
                    e
                )))
            }
        }
    }

    pub async fn send_message(&self, message: TelegramMessage) -> AppResult<i32> {
        let chat_id = parse_chat_id(&message.chat_id)?;

        let mut request = self
            .bot
            .send_message(ChatId(chat_id), &message.text)
            .disable_web_page_preview(message.disable_web_page_preview)
            .disable_notification(message.disable_notification);

        if message.parse_mode.as_deref() == Some("HTML") {
            request = request.parse_mode(ParseMode::Html);
        }

        match request.await {
            Ok(sent_message) => {
                tracing::debug!(
                    "Telegram message sent to {}: message_id={}",
                    message.chat_id,
                    sent_message.id
                );
                Ok(sent_message.id.0)
            }
            Err(e) => {
                tracing::warn!("Failed to send Telegram message to {}: {}", message.chat_id, e);
                Err(AppError::Telegram(format!("Failed to send message: {}", e)))
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramService {
    async fn send(&self, recipient_id: &str, message: &str) -> AppResult<()> {
        self.send_message(TelegramMessage {
            chat_id: recipient_id.to_string(),
            text: message.to_string(),
            ..Default::default()
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ids_accept_groups_and_reject_garbage() {
        assert_eq!(parse_chat_id(" 123456 ").unwrap(), 123456);
        assert_eq!(parse_chat_id("-1001234567890").unwrap(), -1001234567890);
        assert!(parse_chat_id("@channel").is_err());
    }

    #[test]
    fn messages_default_to_html() {
        let msg = TelegramMessage::default();
        assert_eq!(msg.parse_mode.as_deref(), Some("HTML"));
    }
}
