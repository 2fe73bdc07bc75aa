//! Telegram Bot API transport: `getUpdates` long polling and
//! `sendMessage`, nothing more. The bot token is part of the URL, so
//! it is formatted once at construction and never logged.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use leadsweep_core::config::TelegramConfig;

use crate::runner::{BotTransport, IncomingMessage, TransportError};

pub struct TelegramTransport {
    http: reqwest::Client,
    base_url: String,
    poll_timeout_secs: u64,
    // Next update id to request; advancing it acknowledges everything
    // before it.
    offset: Mutex<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(serde::Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramTransport {
    pub fn new(http: reqwest::Client, config: &TelegramConfig) -> Self {
        Self {
            http,
            base_url: format!("https://api.telegram.org/bot{}", config.bot_token.expose_secret()),
            poll_timeout_secs: config.poll_timeout_secs,
            offset: Mutex::new(0),
        }
    }

    async fn unwrap_envelope<T>(
        response: reqwest::Response,
    ) -> Result<T, TransportError>
    where
        T: serde::de::DeserializeOwned,
    {
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|err| TransportError::Poll(err.to_string()))?;
        if !envelope.ok {
            return Err(TransportError::Poll(
                envelope.description.unwrap_or_else(|| "bot api returned ok=false".to_owned()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| TransportError::Poll("bot api returned empty result".to_owned()))
    }
}

#[async_trait]
impl BotTransport for TelegramTransport {
    async fn next_batch(&self) -> Result<Option<Vec<IncomingMessage>>, TransportError> {
        let offset = *self.offset.lock().await;
        let response = self
            .http
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[
                ("timeout", self.poll_timeout_secs.to_string()),
                ("offset", offset.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await
            .map_err(|err| TransportError::Poll(err.to_string()))?;

        let updates: Vec<Update> = Self::unwrap_envelope(response).await?;

        let mut messages = Vec::new();
        let mut next_offset = offset;
        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            messages.push(IncomingMessage { chat_id: message.chat.id.to_string(), text });
        }

        if next_offset != offset {
            *self.offset.lock().await = next_offset;
        }

        debug!(count = messages.len(), "telegram updates polled");
        Ok(Some(messages))
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        let response = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;

        let envelope: ApiEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;
        if !envelope.ok {
            return Err(TransportError::Send(
                envelope.description.unwrap_or_else(|| "bot api returned ok=false".to_owned()),
            ));
        }

        Ok(())
    }
}
