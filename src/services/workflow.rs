use anyhow::{anyhow, Result};
use inquire::{InquireError, Text};
use log::{debug, warn};
use std::time::Duration;

use crate::core::book::{Book, Character};
use crate::core::config::{Config, PipelineConfig};
use crate::core::conversation::Conversation;
use crate::services::extract::JsonExtractor;
use crate::services::llm::LlmClient;
use crate::services::model::ModelClient;
use crate::services::prompts::PromptSet;
use crate::services::responder::CharacterResponder;
use crate::services::router::IntentRouter;

/// One chat session with one character of one book.
pub struct WorkflowManager {
    book: Book,
    character_index: usize,
    pipeline: PipelineConfig,
    model: ModelClient,
    extractor: JsonExtractor,
    prompts: PromptSet,
    conversation: Conversation,
}

impl WorkflowManager {
    /// Fails without contacting the model when `character_index` is out of range.
    pub fn new(
        config: &Config,
        book: Book,
        character_index: usize,
        llm: Box<dyn LlmClient>,
        prompts: PromptSet,
    ) -> Result<Self> {
        let character = book
            .character(character_index)
            .ok_or_else(|| anyhow!("Character {} not valid", character_index))?;
        let conversation = Conversation::new(prompts.persona_prompt(character, book.title()));

        Ok(Self {
            character_index,
            pipeline: config.pipeline.clone(),
            model: ModelClient::new(llm, Duration::from_millis(config.llm.request_delay_ms)),
            extractor: JsonExtractor::new(&config.pipeline),
            prompts,
            conversation,
            book,
        })
    }

    pub fn character(&self) -> &Character {
        &self.book.characters[self.character_index]
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Runs one full turn: route, retrieve, respond. A produced reply is
    /// recorded in the conversation before it is returned.
    pub async fn answer(&mut self, query: &str) -> Option<String> {
        let character = &self.book.characters[self.character_index];

        let router = IntentRouter::new(&self.model, &self.extractor, &self.prompts, self.pipeline.max_ranked_chapters);
        let retrieval = router.route(query, &self.book, character).await;
        debug!("Context for intent {}: {} bytes", retrieval.intent, retrieval.context.len());

        let responder = CharacterResponder::new(
            &self.model,
            &self.prompts,
            self.pipeline.reply_temperature,
            self.pipeline.reply_max_tokens,
        );
        let reply = responder
            .respond(&mut self.conversation, character, query, &retrieval.context)
            .await;

        if let Some(text) = &reply {
            self.conversation.push_assistant(text.clone());
        }
        reply
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            let query = match Text::new("Query:").prompt() {
                Ok(query) => query,
                Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => break,
                Err(e) => return Err(e.into()),
            };

            if is_quit(&query) {
                break;
            }
            if query.trim().is_empty() {
                continue;
            }

            match self.answer(&query).await {
                Some(reply) => println!("{}", reply),
                None => {
                    warn!("No reply for query: {}", query);
                    println!("({} did not answer. Please try again.)", self.character().name);
                }
            }
            println!();
        }

        println!("Goodbye!");
        Ok(())
    }
}

pub fn is_quit(input: &str) -> bool {
    input.trim().to_lowercase().contains("quit")
}

/// Maps a typed menu choice to a character index. Negative and
/// out-of-range choices yield `None`.
pub fn select_character(book: &Book, choice: i64) -> Option<usize> {
    usize::try_from(choice).ok().filter(|&index| book.character(index).is_some())
}

/// `index name : role` lines for the character menu.
pub fn character_menu(book: &Book) -> Vec<String> {
    book.characters
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} {} : {}", i, c.name, c.primary_role))
        .collect()
}
