use anyhow::{Context, Result};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// A structured book document: metadata, summaries, characters and chapters.
#[derive(Debug, Deserialize, Clone)]
pub struct Book {
    pub basic: Record<BasicFields>,
    pub summary: Summary,
    pub characters: Vec<Character>,
    pub chapters: Vec<Chapter>,
}

pub type Summary = Record<SummaryFields>;
pub type Character = Record<CharacterFields>;
pub type Chapter = Record<ChapterFields>;

/// A typed view over one JSON record that still holds the record as it was
/// read. Serializing a `Record` writes the source value back untouched, so
/// key order and unknown keys reach the prompts exactly as in the file.
#[derive(Debug, Clone)]
pub struct Record<T> {
    fields: T,
    raw: Value,
}

impl<T> Record<T> {
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl<T> Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.fields
    }
}

impl<T> Serialize for Record<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Record<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let fields = T::deserialize(&raw).map_err(D::Error::custom)?;
        Ok(Self { fields, raw })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BasicFields {
    pub title: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryFields {
    pub elevator_pitch: String,
    pub expanded_overview: Value,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CharacterFields {
    pub name: String,
    pub primary_role: String,
    pub real_life_summary: String,
    pub story_impact: String,
    pub character_profile: CharacterProfile,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CharacterProfile {
    pub appearance: String,
    pub personality: String,
    pub voice_style: String,
}

// List fields are free-form; null or absent both read as `None`.
#[derive(Debug, Deserialize, Clone)]
pub struct ChapterFields {
    pub chapter_title: String,
    pub chapter_summary: String,
    #[serde(default)]
    pub key_characters: Option<Value>,
    #[serde(default)]
    pub major_themes: Option<Value>,
    #[serde(default)]
    pub pivotal_events: Option<Value>,
    #[serde(default)]
    pub notable_quotes: Option<Value>,
}

impl Book {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read book file {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid book data in {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        // serde names the missing or mistyped key in its message
        let book: Book = serde_json::from_str(content).context("Book JSON does not match the expected layout")?;
        Ok(book)
    }

    pub fn title(&self) -> &str {
        &self.basic.title
    }

    /// 0-based character lookup.
    pub fn character(&self, index: usize) -> Option<&Character> {
        self.characters.get(index)
    }

    /// 1-based chapter lookup. `0` and anything past the end yield `None`.
    pub fn chapter(&self, chapter_num: usize) -> Option<&Chapter> {
        chapter_num
            .checked_sub(1)
            .and_then(|index| self.chapters.get(index))
    }
}

/// Lists `*.json` files in a directory, sorted by file name.
pub fn list_book_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::json;

    pub fn character_json(name: &str) -> Value {
        json!({
            "name": name,
            "primary_role": format!("{} role", name),
            "real_life_summary": format!("{} summary", name),
            "story_impact": format!("{} impact", name),
            "character_profile": {
                "appearance": "tall",
                "personality": "curious",
                "voice_style": "dry"
            }
        })
    }

    pub fn chapter_json(num: usize) -> Value {
        json!({
            "chapter_title": format!("Chapter Title {}", num),
            "chapter_summary": format!("Events of chapter {}", num),
            "key_characters": [{"name": "Arthur Dent", "role": "Protagonist"}],
            "major_themes": [format!("Theme {}", num)],
            "pivotal_events": [format!("Event {}", num)],
            "notable_quotes": []
        })
    }

    pub fn book_json(characters: usize, chapters: usize) -> Value {
        let names = ["Arthur Dent", "Ford Prefect", "Zaphod Beeblebrox", "Marvin"];
        let characters: Vec<Value> = (0..characters).map(|i| character_json(names[i % names.len()])).collect();
        let chapters: Vec<Value> = (1..=chapters).map(chapter_json).collect();
        json!({
            "basic": {"title": "Hitchhiker's Guide to the Galaxy", "author": "Douglas Adams"},
            "summary": {
                "elevator_pitch": "Earth is demolished for a bypass.",
                "expanded_overview": "Arthur Dent escapes with Ford Prefect.",
                "themes": ["absurdity", "bureaucracy"]
            },
            "characters": characters,
            "chapters": chapters,
        })
    }

    pub fn book(characters: usize, chapters: usize) -> Book {
        serde_json::from_value(book_json(characters, chapters)).unwrap()
    }
}
