use async_trait::async_trait;

use super::{LlmClient, LlmError, QuestionRequest, SummaryRequest};

/// Episodes quoted by the offline answers.
const STUB_EPISODES: usize = 3;

/// Offline, deterministic stand-in for the chat API.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubLlm;

impl StubLlm {
    fn facts(status: &str, species: &str, gender: &str) -> String {
        [status, species, gender]
            .into_iter()
            .filter(|fact| !fact.is_empty())
            .collect::<Vec<_>>()
            .join(" • ")
    }

    pub fn summary(req: &SummaryRequest) -> String {
        let facts = Self::facts(&req.status, &req.species, &req.gender);
        let episodes = req
            .episodes
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .take(STUB_EPISODES)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} ({}). Seen in {}.", req.name, facts, episodes)
    }

    pub fn answer(req: &QuestionRequest) -> String {
        let facts = Self::facts(&req.status, &req.species, &req.gender);
        let episodes = if req.episodes.is_empty() {
            "no recorded episodes".to_string()
        } else {
            req.episodes
                .iter()
                .take(STUB_EPISODES)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "(offline) You asked: \"{}\". {} ({}). Origin: {}. Last seen: {}. Appears in {}.",
            req.question,
            req.name,
            facts,
            req.origin.as_deref().unwrap_or("unknown"),
            req.location.as_deref().unwrap_or("unknown"),
            episodes
        )
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn summarize_character(&self, req: &SummaryRequest) -> Result<String, LlmError> {
        Ok(Self::summary(req))
    }

    async fn answer_about_character(&self, req: &QuestionRequest) -> Result<String, LlmError> {
        Ok(Self::answer(req))
    }
}
