use log::warn;
use serde_json::{Map, Value};

use crate::core::config::PipelineConfig;
use crate::core::conversation::ChatMessage;
use crate::services::model::ModelClient;

const THINK_END: &str = "</think>";
const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Outcome of a structured model call.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Parsed(Map<String, Value>),
    /// Every attempt failed; there is no structured signal.
    Exhausted,
}

impl Extraction {
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Extraction::Parsed(map) => map.get(key),
            Extraction::Exhausted => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Extraction::Exhausted)
    }
}

/// Cuts a model reply down to the JSON object it carries.
///
/// Drops any reasoning block ending in `</think>`, unwraps a ```` ```json ````
/// fence when present, then keeps the span from the first `{` to the last `}`.
pub fn sanitize(raw: &str) -> Option<&str> {
    let mut text = match raw.rfind(THINK_END) {
        Some(pos) => &raw[pos + THINK_END.len()..],
        None => raw,
    };

    if let Some(pos) = text.rfind(JSON_FENCE) {
        text = &text[pos + JSON_FENCE.len()..];
        if let Some(end) = text.find(FENCE) {
            text = &text[..end];
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Retries a model call until its reply parses as a JSON object.
#[derive(Debug, Clone)]
pub struct JsonExtractor {
    max_retries: usize,
    temperature: f32,
    max_tokens: u32,
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl JsonExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_json_retries,
            temperature: config.json_temperature,
            max_tokens: config.json_max_tokens,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    pub async fn extract(&self, model: &ModelClient, messages: &[ChatMessage]) -> Extraction {
        for attempt in 1..=self.max_attempts() {
            let Some(raw) = model.complete(messages, self.temperature, self.max_tokens).await else {
                warn!("No completion received. Retry {} / {}", attempt, self.max_retries);
                continue;
            };

            let Some(candidate) = sanitize(&raw) else {
                warn!("Could not find a JSON object in output: {}", raw);
                warn!("Retry {} / {}", attempt, self.max_retries);
                continue;
            };

            match serde_json::from_str::<Value>(candidate) {
                Ok(Value::Object(map)) => return Extraction::Parsed(map),
                Ok(other) => {
                    warn!("Expected a JSON object, got: {}", other);
                    warn!("Retry {} / {}", attempt, self.max_retries);
                }
                Err(e) => {
                    warn!("Parse error: {}", e);
                    warn!("Original output: {}", raw);
                    warn!("Output: {}", candidate);
                    warn!("Retry {} / {}", attempt, self.max_retries);
                }
            }
        }

        Extraction::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model::testing::ScriptedLlm;
    use serde_json::json;

    #[test]
    fn test_sanitize_bare_object() {
        assert_eq!(sanitize(r#"{"intent": "ambiguous"}"#), Some(r#"{"intent": "ambiguous"}"#));
    }

    #[test]
    fn test_wrapped_forms_parse_like_bare_object() {
        let bare = r#"{"intent": "story_general", "nested": {"a": [1, 2]}}"#;
        let expected: Value = serde_json::from_str(bare).unwrap();

        let wrapped = [
            format!("<think>{{\"draft\": true}} hmm</think>{}", bare),
            format!("Sure! Here you go:\n```json\n{}\n```\nAnything else?", bare),
            format!("<think>planning ```json {{}} ```</think>\n```json\n{}\n```", bare),
            format!("The answer is {} as requested.", bare),
            format!("<think>a</think><think>b</think>```json{}```", bare),
        ];

        for text in &wrapped {
            let candidate = sanitize(text).unwrap_or_else(|| panic!("no object in {}", text));
            let parsed: Value = serde_json::from_str(candidate).unwrap();
            assert_eq!(parsed, expected, "input: {}", text);
        }
    }

    #[test]
    fn test_sanitize_without_braces() {
        assert_eq!(sanitize("I cannot help with that."), None);
        assert_eq!(sanitize("} backwards {"), None);
        assert_eq!(sanitize(""), None);
    }

    #[tokio::test]
    async fn test_extract_parses_first_good_reply() {
        let llm = ScriptedLlm::new([Some("```json\n{\"intent\": \"character_related\"}\n```")]);
        let model = llm.model_client();

        let out = JsonExtractor::default().extract(&model, &[ChatMessage::user("q")]).await;

        assert_eq!(out.field("intent"), Some(&json!("character_related")));
        assert_eq!(llm.call_count(), 1);
        let params = llm.call(0).params;
        assert!((params.temperature - 0.6).abs() < f32::EPSILON);
        assert_eq!(params.max_tokens, 2048);
    }

    #[tokio::test]
    async fn test_extract_retries_then_succeeds() {
        let llm = ScriptedLlm::new([
            Some("not json at all"),
            None,
            Some("{\"intent\": \"ambiguous\"}"),
        ]);
        let model = llm.model_client();

        let out = JsonExtractor::default().extract(&model, &[ChatMessage::user("q")]).await;

        assert_eq!(out.field("intent"), Some(&json!("ambiguous")));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_extract_gives_up_after_three_attempts() {
        let llm = ScriptedLlm::new((0..10).map(|_| Some("{ this is not: json }")));
        let model = llm.model_client();

        let out = JsonExtractor::default().extract(&model, &[ChatMessage::user("q")]).await;

        assert_eq!(out, Extraction::Exhausted);
        assert!(out.field("intent").is_none());
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_extract_survives_absent_completions() {
        let llm = ScriptedLlm::new([None::<String>, None, None]);
        let model = llm.model_client();

        let out = JsonExtractor::default().extract(&model, &[ChatMessage::user("q")]).await;

        assert!(out.is_exhausted());
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_object_inside_array_is_extracted() {
        let llm = ScriptedLlm::new([Some("[1, {\"a\": 1}]"), Some("{\"a\": 2}")]);
        let model = llm.model_client();

        let out = JsonExtractor::default().extract(&model, &[ChatMessage::user("q")]).await;

        // the brace span of the array is `{"a": 1}`, which is an object
        assert_eq!(out.field("a"), Some(&json!(1)));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_bound_follows_config() {
        let config = PipelineConfig { max_json_retries: 0, ..PipelineConfig::default() };
        let llm = ScriptedLlm::new([Some("nope"), Some("{}")]);
        let model = llm.model_client();

        let out = JsonExtractor::new(&config).extract(&model, &[ChatMessage::user("q")]).await;

        assert!(out.is_exhausted());
        assert_eq!(llm.call_count(), 1);
    }
}
