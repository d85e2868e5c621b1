use log::{info, warn};
use serde_json::Value;

use crate::core::book::{Book, Chapter};
use crate::core::conversation::ChatMessage;
use crate::services::extract::JsonExtractor;
use crate::services::model::ModelClient;
use crate::services::prompts::PromptSet;

/// One entry of the model's `relevant_chapters` list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterPick {
    /// 1-based position in the book.
    pub chapter_num: usize,
    pub chapter_title: Option<String>,
    pub reason_for_selection: Option<String>,
}

impl ChapterPick {
    fn from_value(value: &Value) -> Option<Self> {
        let chapter_num = parse_chapter_num(value.get("chapter_num")?)?;
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            chapter_num,
            chapter_title: text("chapter_title"),
            reason_for_selection: text("reason_for_selection"),
        })
    }
}

/// Accepts `3`, `3.0`, `"3"` and `"Chapter 3"`.
fn parse_chapter_num(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .and_then(|digits| digits.parse().ok()),
        _ => None,
    }
}

pub struct ChapterRanker<'a> {
    model: &'a ModelClient,
    extractor: &'a JsonExtractor,
    prompts: &'a PromptSet,
    max_chapters: usize,
}

impl<'a> ChapterRanker<'a> {
    pub fn new(model: &'a ModelClient, extractor: &'a JsonExtractor, prompts: &'a PromptSet, max_chapters: usize) -> Self {
        Self { model, extractor, prompts, max_chapters }
    }

    /// Asks the model for the chapters most relevant to `query`, best first.
    pub async fn rank(&self, query: &str, chapters: &[Chapter]) -> Vec<ChapterPick> {
        if chapters.is_empty() {
            info!("Book has no chapters, skipping relevance ranking");
            return Vec::new();
        }

        let prompt = match self.prompts.chapter_relevance_prompt(query, chapters, self.max_chapters) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Failed to build chapter relevance prompt: {:#}", e);
                return Vec::new();
            }
        };
        let messages = [
            ChatMessage::system(self.prompts.chapter_relevance_system.as_str()),
            ChatMessage::user(prompt),
        ];

        let out = self.extractor.extract(self.model, &messages).await;
        let Some(entries) = out.field("relevant_chapters").and_then(Value::as_array) else {
            warn!("No relevant_chapters list in ranking output");
            return Vec::new();
        };

        // out-of-range ordinals must not use up the pick budget
        let mut picks = Vec::new();
        for entry in entries {
            match ChapterPick::from_value(entry) {
                Some(pick) if (1..=chapters.len()).contains(&pick.chapter_num) => picks.push(pick),
                Some(pick) => warn!(
                    "Ignoring chapter_num {} (book has {} chapters)",
                    pick.chapter_num,
                    chapters.len()
                ),
                None => warn!("Skipping malformed chapter entry: {}", entry),
            }
        }
        picks.truncate(self.max_chapters);
        picks
    }
}

/// Maps picks onto the book's chapters, dropping ordinals that do not exist.
pub fn resolve_chapters<'b>(book: &'b Book, picks: &[ChapterPick]) -> Vec<&'b Chapter> {
    picks
        .iter()
        .filter_map(|pick| {
            let chapter = book.chapter(pick.chapter_num);
            if chapter.is_none() {
                warn!(
                    "Ignoring chapter_num {} (book has {} chapters)",
                    pick.chapter_num,
                    book.chapters.len()
                );
            }
            chapter
        })
        .collect()
}
