use crate::core::book::Character;
use crate::core::conversation::Conversation;
use crate::services::model::ModelClient;
use crate::services::prompts::PromptSet;

pub struct CharacterResponder<'a> {
    model: &'a ModelClient,
    prompts: &'a PromptSet,
    temperature: f32,
    max_tokens: u32,
}

impl<'a> CharacterResponder<'a> {
    pub fn new(model: &'a ModelClient, prompts: &'a PromptSet, temperature: f32, max_tokens: u32) -> Self {
        Self { model, prompts, temperature, max_tokens }
    }

    /// Appends the grounded prompt to `conversation` and returns the model's
    /// reply as-is. The reply itself is not recorded here.
    pub async fn respond(
        &self,
        conversation: &mut Conversation,
        character: &Character,
        query: &str,
        context: &str,
    ) -> Option<String> {
        conversation.push_user(self.prompts.character_prompt(character, query, context));
        self.model
            .complete(conversation.messages(), self.temperature, self.max_tokens)
            .await
    }
}
