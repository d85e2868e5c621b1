use log::{info, warn};
use serde_json::Value;
use std::fmt;

use crate::core::book::{Book, Chapter, Character};
use crate::core::conversation::ChatMessage;
use crate::services::extract::JsonExtractor;
use crate::services::model::ModelClient;
use crate::services::prompts::PromptSet;
use crate::services::ranker::{resolve_chapters, ChapterRanker};

/// Label used when the classifier output carries no `intent` string.
pub const NO_INTENT: &str = "n/a";
/// Context sent when chapter retrieval resolved nothing.
pub const NO_CHAPTERS: &str = "n/a";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    NonStoryRelated,
    StoryGeneral,
    StorySpecificChapter,
    CharacterRelated,
    Ambiguous,
    /// Anything else the model produced, including `n/a`.
    Unrecognized(String),
}

impl Intent {
    pub fn from_label(label: &str) -> Self {
        match label {
            "non_story_related" => Intent::NonStoryRelated,
            "story_general" => Intent::StoryGeneral,
            "story_specific_chapter" => Intent::StorySpecificChapter,
            "character_related" => Intent::CharacterRelated,
            "ambiguous" => Intent::Ambiguous,
            other => Intent::Unrecognized(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Intent::NonStoryRelated => "non_story_related",
            Intent::StoryGeneral => "story_general",
            Intent::StorySpecificChapter => "story_specific_chapter",
            Intent::CharacterRelated => "character_related",
            Intent::Ambiguous => "ambiguous",
            Intent::Unrecognized(label) => label,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the router found for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub intent: Intent,
    pub context: String,
}

pub struct IntentRouter<'a> {
    model: &'a ModelClient,
    extractor: &'a JsonExtractor,
    prompts: &'a PromptSet,
    max_chapters: usize,
}

impl<'a> IntentRouter<'a> {
    pub fn new(model: &'a ModelClient, extractor: &'a JsonExtractor, prompts: &'a PromptSet, max_chapters: usize) -> Self {
        Self { model, extractor, prompts, max_chapters }
    }

    pub async fn classify(&self, query: &str, book: &Book, character: &Character) -> Intent {
        let messages = [
            ChatMessage::system(self.prompts.intent_system.as_str()),
            ChatMessage::user(self.prompts.intent_prompt(query, character, book)),
        ];

        let out = self.extractor.extract(self.model, &messages).await;
        if out.is_exhausted() {
            warn!("Intent classification gave no usable output, answering without context");
        }
        let label = out.field("intent").and_then(Value::as_str).unwrap_or(NO_INTENT);
        Intent::from_label(label)
    }

    /// Classifies `query` and gathers the story material for its intent.
    pub async fn route(&self, query: &str, book: &Book, character: &Character) -> Retrieval {
        let intent = self.classify(query, book, character).await;
        info!("intent: {}", intent);

        let context = match intent {
            Intent::CharacterRelated => {
                info!("Using character_related context");
                character_context(book)
            }
            Intent::StoryGeneral => {
                info!("Using story_general context");
                serde_json::to_string_pretty(&book.summary)
            }
            Intent::StorySpecificChapter => {
                info!("Using story_specific_chapter context");
                let picks = ChapterRanker::new(self.model, self.extractor, self.prompts, self.max_chapters)
                    .rank(query, &book.chapters)
                    .await;
                chapters_context(&resolve_chapters(book, &picks))
            }
            _ => {
                info!("Using no extra context");
                Ok(String::new())
            }
        };

        let context = context.unwrap_or_else(|e| {
            warn!("Failed to serialize story context: {}", e);
            String::new()
        });
        Retrieval { intent, context }
    }
}

/// Expanded overview followed by every character record.
pub fn character_context(book: &Book) -> serde_json::Result<String> {
    let mut context = serde_json::to_string_pretty(&book.summary.expanded_overview)?;
    context.push_str("\n\n");
    context.push_str("Characters:\n");
    for character in &book.characters {
        context.push_str(&serde_json::to_string_pretty(character)?);
        context.push_str("\n\n");
    }
    Ok(context)
}

pub fn chapters_context(chapters: &[&Chapter]) -> serde_json::Result<String> {
    if chapters.is_empty() {
        return Ok(NO_CHAPTERS.to_string());
    }
    serde_json::to_string_pretty(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::book::fixtures;
    use crate::services::model::testing::ScriptedLlm;
    use serde_json::json;

    async fn route_with(replies: Vec<Option<String>>, book: &Book) -> (Retrieval, ScriptedLlm) {
        let llm = ScriptedLlm::new(replies);
        let model = llm.model_client();
        let extractor = JsonExtractor::default();
        let prompts = PromptSet::default();
        let router = IntentRouter::new(&model, &extractor, &prompts, 5);
        let retrieval = router.route("What happened?", book, &book.characters[0]).await;
        (retrieval, llm)
    }

    fn intent_reply(label: &str) -> Option<String> {
        Some(format!("```json\n{{\"intent\": \"{}\"}}\n```", label))
    }

    #[test]
    fn test_labels_round_trip() {
        for label in ["non_story_related", "story_general", "story_specific_chapter", "character_related", "ambiguous"] {
            let intent = Intent::from_label(label);
            assert!(!matches!(intent, Intent::Unrecognized(_)));
            assert_eq!(intent.label(), label);
        }
        assert_eq!(Intent::from_label("n/a"), Intent::Unrecognized("n/a".to_string()));
    }

    #[tokio::test]
    async fn test_every_label_selects_its_branch() {
        let book = fixtures::book(2, 5);
        let ranking = Some(json!({"relevant_chapters": [{"chapter_num": 2}]}).to_string());

        let (r, llm) = route_with(vec![intent_reply("character_related")], &book).await;
        assert_eq!(r.intent, Intent::CharacterRelated);
        assert_eq!(r.context, character_context(&book).unwrap());
        assert_eq!(llm.call_count(), 1);

        let (r, llm) = route_with(vec![intent_reply("story_general")], &book).await;
        assert_eq!(r.intent, Intent::StoryGeneral);
        assert_eq!(r.context, serde_json::to_string_pretty(&book.summary).unwrap());
        assert_eq!(llm.call_count(), 1);

        let (r, llm) = route_with(vec![intent_reply("story_specific_chapter"), ranking], &book).await;
        assert_eq!(r.intent, Intent::StorySpecificChapter);
        assert_eq!(r.context, serde_json::to_string_pretty(&[&book.chapters[1]]).unwrap());
        assert_eq!(llm.call_count(), 2);

        for label in ["non_story_related", "ambiguous"] {
            let (r, llm) = route_with(vec![intent_reply(label)], &book).await;
            assert_eq!(r.intent.label(), label);
            assert_eq!(r.context, "");
            assert_eq!(llm.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_story_general_context_is_full_summary() {
        let mut source = fixtures::book_json(1, 1);
        source["summary"] = json!({
            "themes": ["absurdity", "bureaucracy"],
            "expanded_overview": {"part_one": "Earth is gone.", "part_two": "Magrathea."},
            "tone": "dry",
            "elevator_pitch": "Earth is demolished for a bypass."
        });
        let book: Book = serde_json::from_value(source.clone()).unwrap();
        let (r, _) = route_with(vec![intent_reply("story_general")], &book).await;

        assert_eq!(r.context, serde_json::to_string_pretty(&source["summary"]).unwrap());
    }

    #[tokio::test]
    async fn test_chapter_context_is_verbatim_record() {
        let mut source = fixtures::book_json(1, 3);
        source["chapters"][1] = json!({
            "pivotal_events": ["Vogons arrive"],
            "chapter_summary": "The bypass goes ahead.",
            "chapter_title": "Chapter Title 2",
            "key_characters": null
        });
        let book: Book = serde_json::from_value(source.clone()).unwrap();
        let ranking = Some(json!({"relevant_chapters": [{"chapter_num": 2}]}).to_string());
        let (r, _) = route_with(vec![intent_reply("story_specific_chapter"), ranking], &book).await;

        assert_eq!(r.context, serde_json::to_string_pretty(&[&source["chapters"][1]]).unwrap());
        assert!(!r.context.contains("notable_quotes"));
    }

    #[tokio::test]
    async fn test_missing_intent_defaults_to_no_context() {
        let book = fixtures::book(1, 3);
        let (r, llm) = route_with(vec![Some("{\"label\": \"story_general\"}".to_string())], &book).await;

        assert_eq!(r.intent, Intent::Unrecognized(NO_INTENT.to_string()));
        assert_eq!(r.context, "");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_classifier_exhaustion_degrades_to_no_context() {
        let book = fixtures::book(1, 3);
        let (r, llm) = route_with(vec![None, Some("garbage".to_string()), None], &book).await;

        assert_eq!(r.intent.label(), NO_INTENT);
        assert_eq!(r.context, "");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unresolvable_chapters_give_placeholder() {
        let book = fixtures::book(1, 3);
        let ranking = Some(json!({"relevant_chapters": [{"chapter_num": 9}]}).to_string());
        let (r, _) = route_with(vec![intent_reply("story_specific_chapter"), ranking], &book).await;

        assert_eq!(r.context, NO_CHAPTERS);
    }

    #[tokio::test]
    async fn test_intent_prompt_carries_character_and_book() {
        let book = fixtures::book(2, 1);
        let (_, llm) = route_with(vec![intent_reply("ambiguous")], &book).await;

        let call = llm.call(0);
        assert_eq!(call.messages.len(), 2);
        assert_eq!(call.messages[0].content, PromptSet::default().intent_system);
        let prompt = &call.messages[1].content;
        assert!(prompt.contains("\"What happened?\""));
        assert!(prompt.contains("Arthur Dent summary"));
        assert!(prompt.contains("Hitchhiker's Guide to the Galaxy"));
    }

    #[test]
    fn test_character_context_layout() {
        let book = fixtures::book(2, 1);
        let context = character_context(&book).unwrap();

        assert!(context.starts_with("\"Arthur Dent escapes with Ford Prefect.\"\n\nCharacters:\n{"));
        assert_eq!(context.matches("\"primary_role\"").count(), 2);
        assert!(context.ends_with("}\n\n"));
    }
}
