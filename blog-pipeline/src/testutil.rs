//! Shared mocks for unit tests.

use async_trait::async_trait;

use crate::generation::{Completion, GenerationError, Role, TextGenerator};

/// Generator that answers by matching needles against the combined
/// system + user prompt; the first matching rule wins, otherwise the
/// default reply is returned.
pub struct MockGenerator {
    rules: Vec<(String, String)>,
    default: String,
}

impl MockGenerator {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default: default.into(),
        }
    }

    pub fn with_rule(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        _role: Role,
    ) -> Result<Completion, GenerationError> {
        let haystack = format!("{system}\n{prompt}");
        let text = self
            .rules
            .iter()
            .find(|(needle, _)| haystack.contains(needle))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default.clone());
        Ok(Completion {
            text,
            model: "mock".to_string(),
            usage: crate::generation::TokenUsage {
                prompt: 10,
                completion: 20,
                total: 30,
            },
        })
    }
}

/// Generator whose every call fails.
pub struct DownGenerator;

#[async_trait]
impl TextGenerator for DownGenerator {
    fn name(&self) -> &str {
        "down"
    }

    async fn generate(
        &self,
        _system: &str,
        _prompt: &str,
        _role: Role,
    ) -> Result<Completion, GenerationError> {
        Err(GenerationError::Payload("unavailable".to_string()))
    }
}
