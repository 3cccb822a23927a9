// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible adapter for the Keepsake memory engine.
//!
//! Implements [`ProviderAdapter`] over `/chat/completions` and
//! [`EmbeddingAdapter`] over `/embeddings`. Any server speaking the same
//! protocol works by pointing `llm.base_url` at it.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use keepsake_config::model::LlmConfig;
use keepsake_core::types::{
    EmbeddingInput, EmbeddingOutput, ProviderRequest, ProviderResponse, ResponseFormat, TokenUsage,
};
use keepsake_core::{
    AdapterType, EmbeddingAdapter, HealthStatus, KeepsakeError, PluginAdapter, ProviderAdapter,
};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest, EmbeddingRequest, ResponseFormatSpec};

/// Chat and embedding provider for OpenAI-compatible APIs.
///
/// API key resolution order: `llm.api_key` -> `KEEPSAKE_API_KEY` ->
/// `OPENAI_API_KEY` -> error.
pub struct OpenAiProvider {
    client: OpenAiClient,
    chat_model: String,
    embedding_model: String,
    dimensions: usize,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, KeepsakeError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(
            &api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(
            base_url = client.base_url(),
            chat_model = config.chat_model,
            embedding_model = config.embedding_model,
            "OpenAI-compatible provider initialized"
        );
        Ok(Self::with_client(client, config))
    }

    /// Build a provider around an existing client.
    pub fn with_client(client: OpenAiClient, config: &LlmConfig) -> Self {
        Self {
            client,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        }
    }

    fn to_chat_request(&self, request: ProviderRequest) -> ChatRequest {
        ChatRequest {
            model: request.model.unwrap_or_else(|| self.chat_model.clone()),
            messages: request
                .messages
                .into_iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: match request.response_format {
                ResponseFormat::JsonObject => Some(ResponseFormatSpec::json_object()),
                ResponseFormat::Text => None,
            },
        }
    }
}

/// Resolve the API key from config or the environment.
fn resolve_api_key(config_key: &Option<String>) -> Result<String, KeepsakeError> {
    if let Some(key) = config_key.as_ref().filter(|k| !k.is_empty()) {
        return Ok(key.clone());
    }
    ["KEEPSAKE_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .ok_or_else(|| {
            KeepsakeError::Config(
                "API key not found. Set llm.api_key in config, KEEPSAKE_API_KEY or OPENAI_API_KEY."
                    .into(),
            )
        })
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        // No network call; a constructed client counts as healthy.
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, KeepsakeError> {
        let chat_request = self.to_chat_request(request);
        debug!(model = %chat_request.model, messages = chat_request.messages.len(), "chat completion");
        let response = self.client.chat(&chat_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| KeepsakeError::provider("chat completion returned no choices"))?;
        let usage = response.usage.unwrap_or_default();

        Ok(ProviderResponse {
            id: response.id,
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            stop_reason: choice.finish_reason,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiProvider {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        let expected = input.texts.len();
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: input.texts,
            dimensions: self.dimensions,
            encoding_format: "float",
        };
        let mut response = self.client.embeddings(&request).await?;
        if response.data.len() != expected {
            return Err(KeepsakeError::provider(format!(
                "embedding count mismatch: sent {expected}, got {}",
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);

        Ok(EmbeddingOutput {
            embeddings: response.data.into_iter().map(|d| d.embedding).collect(),
            dimensions: self.dimensions,
        })
    }
}
