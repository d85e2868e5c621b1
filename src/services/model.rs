use log::{debug, error};
use std::time::Duration;

use crate::core::conversation::ChatMessage;
use crate::services::llm::{ChatParams, LlmClient};

/// One chat-completion call per `complete`, with a fixed pre-call delay.
///
/// Backend failures are logged and surface as `None`; retrying is up to the
/// caller.
#[derive(Debug)]
pub struct ModelClient {
    llm: Box<dyn LlmClient>,
    delay: Duration,
}

impl ModelClient {
    pub fn new(llm: Box<dyn LlmClient>, delay: Duration) -> Self {
        Self { llm, delay }
    }

    pub async fn complete(&self, messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Option<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let params = ChatParams { temperature, max_tokens };
        debug!("Sending {} messages (temperature {}, max_tokens {})", messages.len(), temperature, max_tokens);

        match self.llm.chat(messages, &params).await {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Error calling LLM API: {:#}", e);
                None
            }
        }
    }
}
