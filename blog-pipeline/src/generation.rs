//! Text-generation boundary: the trait the pipeline consumes, the local
//! HTTP provider, and the ordered fallback chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::PipelineConfig;

/// Which model profile a call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Writer,
    Researcher,
}

impl Role {
    fn temperature(&self) -> f32 {
        match self {
            Role::Writer => 0.7,
            Role::Researcher => 0.3,
        }
    }

    fn max_tokens(&self) -> u32 {
        match self {
            Role::Writer => 4000,
            Role::Researcher => 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generation service returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("generation service returned an unusable payload: {0}")]
    Payload(String),

    #[error("all generation providers failed: {summary}")]
    AllProvidersFailed { summary: String },
}

/// External text-completion interface. Implementations must either
/// return a completion or a typed error the caller can degrade from;
/// silently empty responses are not allowed.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        role: Role,
    ) -> Result<Completion, GenerationError>;
}

/// Client for the local generation service's `/api/generate` endpoint.
pub struct LocalGenerator {
    client: reqwest::Client,
    base_url: String,
    writer_model: String,
    researcher_model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl LocalGenerator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.generation_base_url.trim_end_matches('/').to_string(),
            writer_model: config.writer_model.clone(),
            researcher_model: config.researcher_model.clone(),
        }
    }

    fn model_for(&self, role: Role) -> &str {
        match role {
            Role::Writer => &self.writer_model,
            Role::Researcher => &self.researcher_model,
        }
    }
}

#[async_trait]
impl TextGenerator for LocalGenerator {
    fn name(&self) -> &str {
        "local"
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        role: Role,
    ) -> Result<Completion, GenerationError> {
        let model = self.model_for(role).to_string();
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "system": system,
            "options": {
                "temperature": role.temperature(),
                "num_predict": role.max_tokens(),
            },
            "stream": false,
        });

        debug!(model = %model, role = ?role, "local generation call");
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::Status(response.status()));
        }

        let body: GenerateResponse = response.json().await?;
        if body.response.is_empty() {
            return Err(GenerationError::Payload(
                "empty response field".to_string(),
            ));
        }

        // The service reports evaluated token counts; approximate with
        // whitespace words when a count is missing.
        let prompt_tokens = body
            .prompt_eval_count
            .unwrap_or_else(|| prompt.split_whitespace().count() as u64);
        let completion_tokens = body
            .eval_count
            .unwrap_or_else(|| body.response.split_whitespace().count() as u64);

        Ok(Completion {
            text: body.response,
            model,
            usage: TokenUsage {
                prompt: prompt_tokens,
                completion: completion_tokens,
                total: prompt_tokens + completion_tokens,
            },
        })
    }
}

/// Provider speaking the OpenAI-compatible `/chat/completions` shape,
/// used as the hosted fallback when the local service is unreachable.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl ChatCompletionsGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        role: Role,
    ) -> Result<Completion, GenerationError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": role.temperature(),
            "max_tokens": role.max_tokens(),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::Status(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GenerationError::Payload("no choices returned".to_string()));
        }

        let usage = body.usage.unwrap_or_default();
        Ok(Completion {
            text,
            model: self.model.clone(),
            usage: TokenUsage {
                prompt: usage.prompt_tokens,
                completion: usage.completion_tokens,
                total: usage.total_tokens,
            },
        })
    }
}

/// Ordered provider chain: tries each provider in turn, records every
/// attempt's failure, returns the first success or an aggregate error
/// naming all attempts.
pub struct FallbackGenerator {
    providers: Vec<Arc<dyn TextGenerator>>,
}

impl FallbackGenerator {
    pub fn new(providers: Vec<Arc<dyn TextGenerator>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl TextGenerator for FallbackGenerator {
    fn name(&self) -> &str {
        "fallback-chain"
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        role: Role,
    ) -> Result<Completion, GenerationError> {
        let mut attempts = Vec::new();
        for provider in &self.providers {
            match provider.generate(system, prompt, role).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "generation provider failed");
                    attempts.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(GenerationError::AllProvidersFailed {
            summary: attempts.join("; "),
        })
    }
}
