use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commands::{parse_command, BotCommand};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport poll failed: {0}")]
    Poll(String),
    #[error("transport send failed: {0}")]
    Send(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandServiceError {
    #[error("merge command failed: {0}")]
    Merge(String),
}

/// A message received from the operator chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: String,
    pub text: String,
}

/// Chat transport seam. `next_batch` blocks until messages arrive or
/// the poll window closes; `Ok(None)` means the stream ended.
#[async_trait]
pub trait BotTransport: Send + Sync {
    async fn next_batch(&self) -> Result<Option<Vec<IncomingMessage>>, TransportError>;
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopBotTransport;

#[async_trait]
impl BotTransport for NoopBotTransport {
    async fn next_batch(&self) -> Result<Option<Vec<IncomingMessage>>, TransportError> {
        Ok(None)
    }

    async fn send_message(&self, _chat_id: &str, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Handles `/merge`. The reply text is sent back to the chat the
/// command came from.
#[async_trait]
pub trait MergeCommandService: Send + Sync {
    async fn run_merge(&self) -> Result<String, CommandServiceError>;
}

#[derive(Default)]
pub struct NoopMergeCommandService;

#[async_trait]
impl MergeCommandService for NoopMergeCommandService {
    async fn run_merge(&self) -> Result<String, CommandServiceError> {
        Ok("merge workflow is not wired up".to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

pub struct BotRunner {
    transport: Arc<dyn BotTransport>,
    service: Arc<dyn MergeCommandService>,
    reconnect_policy: ReconnectPolicy,
}

impl Default for BotRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopBotTransport),
            service: Arc::new(NoopMergeCommandService),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl BotRunner {
    pub fn new(
        transport: Arc<dyn BotTransport>,
        service: Arc<dyn MergeCommandService>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, service, reconnect_policy }
    }

    /// Runs the poll loop. A transport failure retries with backoff;
    /// once retries are exhausted the process keeps running without
    /// the bot rather than crashing the scheduler.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.pump().await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "bot transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "bot retries exhausted; continuing process without the bot"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn pump(&self) -> Result<(), TransportError> {
        info!(event_name = "ingress.bot.poll_started", "bot poll loop started");

        loop {
            let Some(messages) = self.transport.next_batch().await? else {
                info!(event_name = "ingress.bot.stream_closed", "bot update stream closed");
                return Ok(());
            };

            for message in messages {
                self.dispatch(message).await;
            }
        }
    }

    async fn dispatch(&self, message: IncomingMessage) {
        let Some(command) = parse_command(&message.text) else {
            return;
        };

        match command {
            BotCommand::Merge => {
                info!(
                    event_name = "ingress.bot.merge_command",
                    chat_id = %message.chat_id,
                    "merge command received"
                );
                let reply = match self.service.run_merge().await {
                    Ok(summary) => summary,
                    Err(error) => error.to_string(),
                };
                if let Err(error) = self.transport.send_message(&message.chat_id, &reply).await {
                    warn!(
                        chat_id = %message.chat_id,
                        error = %error,
                        "failed to send command reply; continuing poll loop"
                    );
                }
            }
            BotCommand::Unknown { verb } => {
                debug!(
                    chat_id = %message.chat_id,
                    verb = %verb,
                    "ignoring unsupported command"
                );
            }
        }
    }
}
