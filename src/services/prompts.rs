use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

use crate::core::book::{Book, Chapter, Character};

const INTENT_SYSTEM: &str = include_str!("../../prompts/intent_system.md");
const INTENT: &str = include_str!("../../prompts/intent.md");
const CHAPTER_RELEVANCE_SYSTEM: &str = include_str!("../../prompts/chapter_relevance_system.md");
const CHAPTER_RELEVANCE: &str = include_str!("../../prompts/chapter_relevance.md");
const CHARACTER_SYSTEM: &str = include_str!("../../prompts/character_system.md");
const CHARACTER: &str = include_str!("../../prompts/character.md");

/// Prompt templates with `{{NAME}}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub intent_system: String,
    pub intent: String,
    pub chapter_relevance_system: String,
    pub chapter_relevance: String,
    pub character_system: String,
    pub character: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            intent_system: INTENT_SYSTEM.trim().to_string(),
            intent: INTENT.to_string(),
            chapter_relevance_system: CHAPTER_RELEVANCE_SYSTEM.trim().to_string(),
            chapter_relevance: CHAPTER_RELEVANCE.to_string(),
            character_system: CHARACTER_SYSTEM.to_string(),
            character: CHARACTER.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in templates, with any same-named `.md` file in `dir` taking precedence.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut prompts = Self::default();
        let Some(dir) = dir else {
            return Ok(prompts);
        };

        let slots: [(&str, &mut String); 6] = [
            ("intent_system", &mut prompts.intent_system),
            ("intent", &mut prompts.intent),
            ("chapter_relevance_system", &mut prompts.chapter_relevance_system),
            ("chapter_relevance", &mut prompts.chapter_relevance),
            ("character_system", &mut prompts.character_system),
            ("character", &mut prompts.character),
        ];
        for (name, slot) in slots {
            let path = dir.join(format!("{}.md", name));
            if path.is_file() {
                info!("Using prompt override {}", path.display());
                *slot = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read prompt {}", path.display()))?;
            }
        }
        Ok(prompts)
    }

    pub fn intent_prompt(&self, query: &str, character: &Character, book: &Book) -> String {
        render(
            &self.intent,
            &[
                ("QUERY", query),
                ("CHARACTER_NAME", &character.name),
                ("CHARACTER_SUMMARY", &character.real_life_summary),
                ("BOOK_TITLE", book.title()),
                ("BOOK_SUMMARY", &book.summary.elevator_pitch),
            ],
        )
    }

    pub fn chapter_relevance_prompt(&self, query: &str, chapters: &[Chapter], max_chapters: usize) -> Result<String> {
        let chapters_json = serde_json::to_string_pretty(chapters)?;
        Ok(render(
            &self.chapter_relevance,
            &[
                ("QUERY", query),
                ("CHAPTERS", &chapters_json),
                ("MAX_CHAPTERS", &max_chapters.to_string()),
            ],
        ))
    }

    pub fn persona_prompt(&self, character: &Character, book_title: &str) -> String {
        let profile = &character.character_profile;
        render(
            &self.character_system,
            &[
                ("NAME", &character.name),
                ("PRIMARY_ROLE", &character.primary_role),
                ("BOOK_TITLE", book_title),
                ("STORY_IMPACT", &character.story_impact),
                ("APPEARANCE", &profile.appearance),
                ("PERSONALITY", &profile.personality),
                ("VOICE_STYLE", &profile.voice_style),
            ],
        )
    }

    pub fn character_prompt(&self, character: &Character, query: &str, context: &str) -> String {
        render(
            &self.character,
            &[("NAME", &character.name), ("QUERY", query), ("CONTEXT", context)],
        )
    }
}

/// Single-pass placeholder substitution. Inserted values are never rescanned,
/// and unknown placeholders are left untouched.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = &after[..end];
                match vars.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(name);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
