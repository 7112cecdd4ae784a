//! Environment-driven configuration. Invalid values fail fast at
//! startup with a descriptive error; nothing is silently clamped.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: could not parse '{value}': {reason}")]
    Parse {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var}: {reason} (got {value})")]
    OutOfRange {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model used for drafting and rewriting.
    pub writer_model: String,
    /// Model used for query generation, analysis and ranking.
    pub researcher_model: String,
    /// Base URL of the local generation service.
    pub generation_base_url: String,
    /// How many research queries to ask for (1-5).
    pub research_query_count: usize,
    /// Skip research entirely above this cumulative token count.
    pub research_token_ceiling: u64,
    /// Stop an in-flight research batch above this count.
    pub research_token_hard_stop: u64,
    /// Composite plagiarism score that triggers a rewrite (5-50).
    pub plagiarism_threshold: u8,
    /// Credits available for costed plagiarism checks.
    pub free_tier_credits: u32,
    /// Rewrites allowed per section before the draft is force-accepted.
    pub max_section_rewrites: usize,
    /// Per-fetch timeout for research sources.
    pub fetch_timeout: Duration,
    /// Global engine step ceiling.
    pub max_workflow_steps: usize,
    /// Prior-section narrative length (chars) before summarization.
    pub section_context_budget: usize,

    /// Optional secondary generation provider (OpenAI-compatible).
    pub fallback_base_url: String,
    pub fallback_api_key: Option<String>,
    pub fallback_model: String,

    /// Search backend credentials. A missing key degrades the matching
    /// fetcher to empty results; it never fails the run.
    pub perplexity_api_key: Option<String>,
    pub github_token: Option<String>,
    pub substack_api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            writer_model: "llama3.1:8b".to_string(),
            researcher_model: "llama3.1:8b".to_string(),
            generation_base_url: "http://localhost:11434".to_string(),
            research_query_count: 3,
            research_token_ceiling: 900_000,
            research_token_hard_stop: 950_000,
            plagiarism_threshold: 15,
            free_tier_credits: 100,
            max_section_rewrites: 3,
            fetch_timeout: Duration::from_secs(30),
            max_workflow_steps: 100,
            section_context_budget: 4000,
            fallback_base_url: "https://api.groq.com/openai/v1".to_string(),
            fallback_api_key: None,
            fallback_model: "llama3-70b-8192".to_string(),
            perplexity_api_key: None,
            github_token: None,
            substack_api_key: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            writer_model: env_string("WRITER_MODEL", defaults.writer_model),
            researcher_model: env_string("RESEARCHER_MODEL", defaults.researcher_model),
            generation_base_url: env_string("GENERATION_BASE_URL", defaults.generation_base_url),
            research_query_count: env_parse("RESEARCH_QUERY_COUNT", defaults.research_query_count)?,
            research_token_ceiling: env_parse(
                "RESEARCH_TOKEN_CEILING",
                defaults.research_token_ceiling,
            )?,
            research_token_hard_stop: env_parse(
                "RESEARCH_TOKEN_HARD_STOP",
                defaults.research_token_hard_stop,
            )?,
            plagiarism_threshold: env_parse("PLAGIARISM_THRESHOLD", defaults.plagiarism_threshold)?,
            free_tier_credits: env_parse("FREE_TIER_CREDITS", defaults.free_tier_credits)?,
            max_section_rewrites: env_parse("MAX_SECTION_REWRITES", defaults.max_section_rewrites)?,
            fetch_timeout: Duration::from_secs(env_parse("FETCH_TIMEOUT_SECS", 30u64)?),
            max_workflow_steps: env_parse("MAX_WORKFLOW_STEPS", defaults.max_workflow_steps)?,
            section_context_budget: env_parse(
                "SECTION_CONTEXT_BUDGET",
                defaults.section_context_budget,
            )?,
            fallback_base_url: env_string("FALLBACK_BASE_URL", defaults.fallback_base_url),
            fallback_api_key: std::env::var("FALLBACK_API_KEY").ok(),
            fallback_model: env_string("FALLBACK_MODEL", defaults.fallback_model),
            perplexity_api_key: std::env::var("PERPLEXITY_API_KEY").ok(),
            github_token: std::env::var("GITHUB_TOKEN").ok(),
            substack_api_key: std::env::var("SUBSTACK_API_KEY").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(5..=50).contains(&self.plagiarism_threshold) {
            return Err(ConfigError::OutOfRange {
                var: "PLAGIARISM_THRESHOLD",
                value: self.plagiarism_threshold.to_string(),
                reason: "must be between 5 and 50",
            });
        }
        if !(1..=5).contains(&self.research_query_count) {
            return Err(ConfigError::OutOfRange {
                var: "RESEARCH_QUERY_COUNT",
                value: self.research_query_count.to_string(),
                reason: "must be between 1 and 5",
            });
        }
        if self.research_token_hard_stop <= self.research_token_ceiling {
            return Err(ConfigError::OutOfRange {
                var: "RESEARCH_TOKEN_HARD_STOP",
                value: self.research_token_hard_stop.to_string(),
                reason: "must exceed RESEARCH_TOKEN_CEILING",
            });
        }
        if self.max_workflow_steps == 0 {
            return Err(ConfigError::OutOfRange {
                var: "MAX_WORKFLOW_STEPS",
                value: "0".to_string(),
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

fn env_string(var: &'static str, default: String) -> String {
    std::env::var(var).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Parse {
            var,
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
