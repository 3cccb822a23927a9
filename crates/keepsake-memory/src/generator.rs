// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response generation seam.

use std::sync::Arc;

use async_trait::async_trait;
use keepsake_core::types::{ProviderMessage, ProviderRequest};
use keepsake_core::{KeepsakeError, ProviderAdapter};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::template::fill_placeholders;
use crate::types::RetrievedItem;

/// Reply used when generation fails.
pub const APOLOGY: &str = "Sorry, I can't reply right now. Please try again later.";

/// Context line text when nothing was retrieved.
pub const NO_CONTEXT: &str = "No relevant history.";

/// The person the conversation is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub name: String,
    #[serde(default)]
    pub profile_summary: String,
    #[serde(default)]
    pub preferences: String,
}

impl SubjectProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Everything a generator needs for one reply.
#[derive(Debug, Clone)]
pub struct GenerationContext<'a> {
    pub subject: &'a SubjectProfile,
    pub retrieved: &'a [RetrievedItem],
    pub recent_messages: &'a [ProviderMessage],
    pub user_message: &'a str,
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, context: &GenerationContext<'_>) -> Result<String, KeepsakeError>;
}

/// One line per item: `- [YYYY-MM-DD] content (sentiment: n)`.
pub fn format_memory_context(items: &[RetrievedItem]) -> String {
    if items.is_empty() {
        return NO_CONTEXT.to_string();
    }
    items
        .iter()
        .map(|item| {
            format!(
                "- [{}] {} (sentiment: {})",
                item.happened_at.format("%Y-%m-%d"),
                item.content,
                item.sentiment_score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fill the persona template placeholders.
pub fn render_system_prompt(template: &str, subject: &SubjectProfile, context: &str) -> String {
    fill_placeholders(
        template,
        &[
            ("target_name", subject.name.as_str()),
            ("profile_summary", subject.profile_summary.as_str()),
            ("preferences", subject.preferences.as_str()),
            ("context", context),
        ],
    )
}

/// Renders the persona template and asks the chat model for a reply.
pub struct PersonaGenerator {
    provider: Arc<dyn ProviderAdapter>,
    template: String,
}

impl PersonaGenerator {
    pub fn new(provider: Arc<dyn ProviderAdapter>, template: impl Into<String>) -> Self {
        Self {
            provider,
            template: template.into(),
        }
    }

    pub fn build_request(&self, context: &GenerationContext<'_>) -> ProviderRequest {
        let system = render_system_prompt(
            &self.template,
            context.subject,
            &format_memory_context(context.retrieved),
        );
        let mut messages = Vec::with_capacity(context.recent_messages.len() + 2);
        messages.push(ProviderMessage::system(system));
        messages.extend(context.recent_messages.iter().cloned());
        messages.push(ProviderMessage::user(context.user_message));

        ProviderRequest {
            messages,
            ..ProviderRequest::single_turn(String::new())
        }
        .with_max_tokens(2048)
        .with_temperature(0.7)
    }
}

#[async_trait]
impl ResponseGenerator for PersonaGenerator {
    async fn generate(&self, context: &GenerationContext<'_>) -> Result<String, KeepsakeError> {
        let response = self.provider.complete(self.build_request(context)).await?;
        info!(chars = response.content.chars().count(), "generated reply");
        Ok(response.content)
    }
}
