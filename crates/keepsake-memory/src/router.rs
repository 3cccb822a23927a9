// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intent router: decides whether a message needs historical context.
//!
//! Retrieval is opt-in. Any failure, unparsable reply or unknown category
//! routes to [`Route::MentorChat`], which skips retrieval.

use std::sync::Arc;

use keepsake_core::types::ProviderRequest;
use keepsake_core::{KeepsakeError, ProviderAdapter};
use serde::Deserialize;
use tracing::{info, warn};

use crate::template::fill_placeholders;

const ROUTER_PROMPT: &str = r#"You are an intent classifier deciding which branch should handle the user's message.

The user is asking for advice about their relationship with "{subject}".

## Branches

1. **mentor_chat** (emotional support, no history needed):
   - The user is venting, looking for comfort or asking for advice
   - No specific past record needs to be looked up
   - e.g. "I feel awful", "what should I do", "does {subject} still like me"

2. **memory_rag** (needs memory retrieval):
   - The user asks about a specific past event or piece of information
   - Earlier conversations or events must be looked up
   - e.g. "what did {subject} say last time", "when did we first meet", "when is {subject}'s birthday"

## User message
{message}

Reply with JSON only:
{"route": "mentor_chat or memory_rag", "reasoning": "why"}"#;

/// Branch chosen for a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Route {
    /// Answer without retrieval.
    #[default]
    MentorChat,
    /// Retrieve relevant memories first.
    MemoryRag,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MentorChat => "mentor_chat",
            Self::MemoryRag => "memory_rag",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "mentor_chat" => Some(Self::MentorChat),
            "memory_rag" => Some(Self::MemoryRag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    /// Free-text rationale from the classifier; logged only.
    pub reasoning: String,
}

impl RouteDecision {
    pub fn needs_retrieval(&self) -> bool {
        self.route == Route::MemoryRag
    }
}

#[derive(Deserialize)]
struct RawDecision {
    route: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Slice from the first `{` to the last `}`, tolerating code fences and chatter.
pub(crate) fn json_object_slice(text: &str) -> &str {
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Parse a classifier reply. A missing `route` field means no retrieval; an
/// unknown category or non-JSON reply is malformed.
pub fn parse_route_response(text: &str) -> Result<RouteDecision, KeepsakeError> {
    let raw: RawDecision = serde_json::from_str(json_object_slice(text))
        .map_err(|e| KeepsakeError::MalformedOutput(format!("route decision: {e}")))?;
    let route = match raw.route.as_deref() {
        None => Route::MentorChat,
        Some(value) => Route::parse(value).ok_or_else(|| {
            KeepsakeError::MalformedOutput(format!("unknown route category: {value}"))
        })?,
    };
    Ok(RouteDecision {
        route,
        reasoning: raw.reasoning.unwrap_or_default(),
    })
}

pub struct IntentRouter {
    provider: Arc<dyn ProviderAdapter>,
}

impl IntentRouter {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self { provider }
    }

    /// Classify `message`. Never fails; errors fall back to [`Route::MentorChat`].
    pub async fn route(&self, message: &str, subject_name: &str) -> RouteDecision {
        match self.classify(message, subject_name).await {
            Ok(decision) => {
                info!(
                    route = decision.route.as_str(),
                    reasoning = %decision.reasoning,
                    "route decided"
                );
                decision
            }
            Err(e) => {
                warn!(error = %e, "routing failed, skipping retrieval");
                RouteDecision::default()
            }
        }
    }

    async fn classify(&self, message: &str, subject_name: &str) -> Result<RouteDecision, KeepsakeError> {
        let prompt = fill_placeholders(
            ROUTER_PROMPT,
            &[("subject", subject_name), ("message", message)],
        );
        let request = ProviderRequest::single_turn(prompt)
            .with_max_tokens(200)
            .with_temperature(0.1)
            .json();
        let response = self.provider.complete(request).await?;
        parse_route_response(&response.content)
    }
}
