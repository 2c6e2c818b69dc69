//! Character summaries and Q&A backed by a language model.
//!
//! Two [`LlmClient`] implementations exist:
//!
//! - [`OpenAiClient`]: chat-completion API over HTTPS. Falls back to the stub
//!   when the endpoint rate-limits.
//! - [`StubLlm`]: offline and deterministic, used when no API key is configured.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::Character;

pub mod openai;
pub mod stub;

pub use openai::{parse_chat_response, OpenAiClient};
pub use stub::StubLlm;

/// How many episode names go into a question fact sheet.
pub const FACT_SHEET_EPISODES: usize = 10;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OpenAI HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("OpenAI decoding error: {0}")]
    Decoding(String),

    /// HTTP 429. Callers recover from this one by answering offline.
    #[error("OpenAI rate limit reached")]
    RateLimited,

    #[error("failed to reach OpenAI: {0}")]
    Transport(String),
}

/// Facts used to summarize a character. `episodes` is a comma-joined list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryRequest {
    pub name: String,
    pub status: String,
    pub species: String,
    pub gender: String,
    pub episodes: String,
}

/// A question plus the fact sheet it should be answered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionRequest {
    pub name: String,
    pub status: String,
    pub species: String,
    pub gender: String,
    pub origin: Option<String>,
    pub location: Option<String>,
    pub episodes: Vec<String>,
    pub question: String,
}

impl SummaryRequest {
    pub fn from_character(character: &Character) -> Self {
        Self {
            name: character.display_name().to_string(),
            status: character.status.clone().unwrap_or_default(),
            species: character.species.clone().unwrap_or_default(),
            gender: character.gender.clone().unwrap_or_default(),
            episodes: character.episode_names().join(", "),
        }
    }
}

impl QuestionRequest {
    /// Fact sheet limited to the first [`FACT_SHEET_EPISODES`] episodes.
    pub fn from_character(character: &Character, question: &str) -> Self {
        let mut episodes = character.episode_names();
        episodes.truncate(FACT_SHEET_EPISODES);
        Self {
            name: character.display_name().to_string(),
            status: character.status.clone().unwrap_or_default(),
            species: character.species.clone().unwrap_or_default(),
            gender: character.gender.clone().unwrap_or_default(),
            origin: character.origin_name().map(str::to_string),
            location: character.location_name().map(str::to_string),
            episodes,
            question: question.to_string(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn summarize_character(&self, req: &SummaryRequest) -> Result<String, LlmError>;

    async fn answer_about_character(&self, req: &QuestionRequest) -> Result<String, LlmError>;
}

/// Pick the client variant from credential presence. A missing key is not an
/// error: the offline stub answers instead.
pub fn build_client(cfg: &Config) -> Arc<dyn LlmClient> {
    let Some(api_key) = cfg.api_key() else {
        info!("no LLM API key configured; using offline summarizer");
        return Arc::new(StubLlm);
    };
    match OpenAiClient::from_config(cfg, api_key) {
        Ok(client) => {
            info!(model = %cfg.llm.model, "using OpenAI chat client");
            Arc::new(client)
        }
        Err(err) => {
            warn!(?err, "failed to build OpenAI client; using offline summarizer");
            Arc::new(StubLlm)
        }
    }
}

/// Mock LLM client for tests. Returns scripted responses in FIFO order and
/// counts calls per capability.
#[cfg(test)]
pub struct MockLlmClient {
    pub summaries: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    pub answers: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    pub summarize_calls: std::sync::atomic::AtomicUsize,
    pub answer_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockLlmClient {
    pub fn new(
        summaries: Vec<Result<String, LlmError>>,
        answers: Vec<Result<String, LlmError>>,
    ) -> Self {
        Self {
            summaries: std::sync::Mutex::new(summaries.into()),
            answers: std::sync::Mutex::new(answers.into()),
            summarize_calls: Default::default(),
            answer_calls: Default::default(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn summarize_character(&self, _req: &SummaryRequest) -> Result<String, LlmError> {
        self.summarize_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.summaries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Mock summary".into()))
    }

    async fn answer_about_character(&self, _req: &QuestionRequest) -> Result<String, LlmError> {
        self.answer_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Mock answer".into()))
    }
}
