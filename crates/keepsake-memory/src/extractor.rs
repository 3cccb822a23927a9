// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based fact extraction from a user message.
//!
//! Returns at most one candidate fact. Committing it (dedup, conflict
//! resolution, insert) is the ingestor's job.

use std::sync::Arc;

use keepsake_core::types::ProviderRequest;
use keepsake_core::{KeepsakeError, ProviderAdapter};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::router::json_object_slice;
use crate::template::fill_placeholders;
use crate::types::{CHAT_SOURCE_TYPE, NewMemory};

/// Marker stored under `extracted_facts.source` for extracted memories.
pub const EXTRACTION_SOURCE: &str = "chat_analysis";

/// Phrases that suggest the user is reporting an event.
const EVENT_MARKERS: &[&str] = &[
    "she said",
    "he said",
    "they said",
    "happened",
    "told me",
    "today",
    "yesterday",
    "just now",
    "她说",
    "他说",
    "发生了",
    "告诉我",
    "今天",
    "昨天",
    "刚才",
];

const EXTRACTION_PROMPT: &str = r#"Analyze the message below and decide whether the user revealed new information about the person they are talking about.

User message: {message}

If it contains a new fact about that person (an event, a behaviour, a change of attitude, other important information), reply with JSON:

{
    "has_new_fact": true,
    "content_summary": "one-sentence summary of the fact",
    "sentiment": "positive, neutral or negative",
    "sentiment_score": integer from -10 to 10,
    "key_event": "key event or null",
    "topics": ["topic", "..."]
}

If there is nothing new, reply with:
{"has_new_fact": false}

Reply with JSON only."#;

/// Cheap check deciding whether extraction is worth an LLM call.
pub fn needs_fact_extraction(message: &str) -> bool {
    let lower = message.to_lowercase();
    EVENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// A fact proposed by the extraction model.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub content_summary: String,
    pub sentiment: Option<String>,
    pub sentiment_score: i32,
    pub key_event: Option<String>,
    pub topics: Vec<String>,
}

impl ExtractedFact {
    /// Build the memory to ingest: chat-sourced, happening now.
    pub fn into_new_memory(self) -> NewMemory {
        let facts = json!({
            "sentiment": self.sentiment,
            "key_event": self.key_event,
            "topics": self.topics,
            "source": EXTRACTION_SOURCE,
        });
        NewMemory::text(self.content_summary)
            .source_type(CHAT_SOURCE_TYPE)
            .sentiment(self.sentiment_score)
            .facts(facts)
    }
}

/// Loosely typed on purpose: only `has_new_fact` must be well formed.
#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    has_new_fact: bool,
    #[serde(default)]
    content_summary: Value,
    #[serde(default)]
    sentiment: Value,
    #[serde(default)]
    sentiment_score: Value,
    #[serde(default)]
    key_event: Value,
    #[serde(default)]
    topics: Value,
}

/// Non-blank text from a string, number or boolean.
fn coerce_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A list of topics, a single topic string, or nothing.
fn coerce_topics(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(coerce_text).collect(),
        other => coerce_text(other).into_iter().collect(),
    }
}

/// Models return scores as integers, floats or numeric strings.
fn coerce_score(value: &Value) -> i32 {
    let score = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    };
    score.unwrap_or(0).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Parse an extraction reply. `Ok(None)` means "nothing new".
///
/// A positive reply without a summary falls back to the original message.
pub fn parse_extraction_response(
    text: &str,
    message: &str,
) -> Result<Option<ExtractedFact>, KeepsakeError> {
    let raw: RawExtraction = serde_json::from_str(json_object_slice(text))
        .map_err(|e| KeepsakeError::MalformedOutput(format!("fact extraction: {e}")))?;
    if !raw.has_new_fact {
        return Ok(None);
    }
    let content_summary =
        coerce_text(&raw.content_summary).unwrap_or_else(|| message.to_string());
    Ok(Some(ExtractedFact {
        content_summary,
        sentiment: coerce_text(&raw.sentiment),
        sentiment_score: coerce_score(&raw.sentiment_score),
        key_event: coerce_text(&raw.key_event),
        topics: coerce_topics(&raw.topics),
    }))
}

pub struct FactExtractor {
    provider: Arc<dyn ProviderAdapter>,
}

impl FactExtractor {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self { provider }
    }

    /// Ask the model for a new fact in `message`. `None` on no fact or any failure.
    pub async fn extract(&self, message: &str) -> Option<ExtractedFact> {
        let request = ProviderRequest::single_turn(fill_placeholders(EXTRACTION_PROMPT, &[("message", message)]))
            .with_max_tokens(500)
            .with_temperature(0.3)
            .json();
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "fact extraction call failed");
                return None;
            }
        };
        match parse_extraction_response(&response.content, message) {
            Ok(Some(fact)) => {
                info!(summary = %fact.content_summary, "extracted new fact");
                Some(fact)
            }
            Ok(None) => {
                debug!("no new fact in message");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to parse extraction response");
                debug!(raw = %response.content, "raw extraction response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubProvider;

    #[test]
    fn heuristic_matches_event_language() {
        assert!(needs_fact_extraction("She said she's moving to Lisbon"));
        assert!(needs_fact_extraction("Something HAPPENED at work"));
        assert!(needs_fact_extraction("她说她要搬家了"));
        assert!(needs_fact_extraction("昨天我们吵架了"));
        assert!(!needs_fact_extraction("What should I do?"));
        assert!(!needs_fact_extraction(""));
    }

    #[test]
    fn parses_full_fact() {
        let fact = parse_extraction_response(
            r#"{"has_new_fact": true, "content_summary": "Alex got a new job",
                "sentiment": "positive", "sentiment_score": 6,
                "key_event": "new job", "topics": ["work"]}"#,
            "msg",
        )
        .unwrap()
        .unwrap();
        assert_eq!(fact.content_summary, "Alex got a new job");
        assert_eq!(fact.sentiment_score, 6);
        assert_eq!(fact.key_event.as_deref(), Some("new job"));
        assert_eq!(fact.topics, vec!["work".to_string()]);
    }

    #[test]
    fn no_new_fact_is_none() {
        assert_eq!(parse_extraction_response(r#"{"has_new_fact": false}"#, "m").unwrap(), None);
        assert_eq!(parse_extraction_response("{}", "m").unwrap(), None);
    }

    #[test]
    fn missing_summary_falls_back_to_message() {
        let fact = parse_extraction_response(r#"{"has_new_fact": true}"#, "she quit smoking")
            .unwrap()
            .unwrap();
        assert_eq!(fact.content_summary, "she quit smoking");
        assert_eq!(fact.sentiment_score, 0);
        assert!(fact.topics.is_empty());
    }

    #[test]
    fn loosely_typed_fields_are_coerced() {
        let fact = parse_extraction_response(
            r#"{"has_new_fact": true, "content_summary": "Alex moved", "topics": null}"#,
            "m",
        )
        .unwrap()
        .unwrap();
        assert_eq!(fact.content_summary, "Alex moved");
        assert!(fact.topics.is_empty());

        let fact = parse_extraction_response(
            r#"{"has_new_fact": true, "content_summary": "Alex moved", "sentiment": 3,
                "key_event": null, "topics": "relocation"}"#,
            "m",
        )
        .unwrap()
        .unwrap();
        assert_eq!(fact.sentiment.as_deref(), Some("3"));
        assert_eq!(fact.key_event, None);
        assert_eq!(fact.topics, vec!["relocation".to_string()]);

        let fact = parse_extraction_response(
            r#"{"has_new_fact": true, "content_summary": "x", "topics": ["work", 7, null, " "]}"#,
            "m",
        )
        .unwrap()
        .unwrap();
        assert_eq!(fact.topics, vec!["work".to_string(), "7".to_string()]);
    }

    #[test]
    fn score_coercion() {
        assert_eq!(coerce_score(&json!(-3)), -3);
        assert_eq!(coerce_score(&json!(4.6)), 5);
        assert_eq!(coerce_score(&json!("7")), 7);
        assert_eq!(coerce_score(&json!(null)), 0);
        assert_eq!(coerce_score(&json!("lots")), 0);
    }

    #[test]
    fn malformed_reply_is_error() {
        assert!(matches!(
            parse_extraction_response("Sure! She got a job.", "m"),
            Err(KeepsakeError::MalformedOutput(_))
        ));
    }

    #[test]
    fn into_new_memory_shapes_facts() {
        let memory = ExtractedFact {
            content_summary: "Alex adopted a cat".into(),
            sentiment: Some("positive".into()),
            sentiment_score: 4,
            key_event: None,
            topics: vec!["pets".into()],
        }
        .into_new_memory();
        assert_eq!(memory.content.as_deref(), Some("Alex adopted a cat"));
        assert_eq!(memory.source_type, CHAT_SOURCE_TYPE);
        assert_eq!(memory.sentiment_score, 4);
        assert_eq!(memory.extracted_facts["source"], EXTRACTION_SOURCE);
        assert_eq!(memory.extracted_facts["topics"], json!(["pets"]));
        assert!(memory.extracted_facts["key_event"].is_null());
    }

    #[tokio::test]
    async fn extract_uses_json_mode_and_fails_open() {
        let provider = Arc::new(
            StubProvider::new()
                .reply(r#"{"has_new_fact": true, "content_summary": "Alex is in Rome"}"#)
                .fail()
                .reply("garbage"),
        );
        let extractor = FactExtractor::new(provider.clone());

        let fact = extractor.extract("she told me she's in Rome").await.unwrap();
        assert_eq!(fact.content_summary, "Alex is in Rome");
        assert!(extractor.extract("x").await.is_none());
        assert!(extractor.extract("y").await.is_none());

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].max_tokens, 500);
        assert_eq!(requests[0].temperature, Some(0.3));
        assert!(requests[0].messages[0].content.contains("she's in Rome"));
    }
}
