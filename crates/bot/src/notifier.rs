use std::sync::Arc;

use async_trait::async_trait;

use leadsweep_core::workflow::{Notifier, NotifyError};

use crate::runner::BotTransport;

/// Sends workflow notifications into the configured operator chat.
pub struct ChatNotifier {
    transport: Arc<dyn BotTransport>,
    chat_id: String,
}

impl ChatNotifier {
    pub fn new(transport: Arc<dyn BotTransport>, chat_id: String) -> Self {
        Self { transport, chat_id }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        self.transport
            .send_message(&self.chat_id, text)
            .await
            .map_err(|error| NotifyError::Send(error.to_string()))
    }
}
