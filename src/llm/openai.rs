use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{LlmClient, LlmError, QuestionRequest, StubLlm, SummaryRequest};
use crate::config::Config;

const OPENAI_API_BASE: &str = "https://api.openai.com/";

const SYSTEM_PROMPT: &str = "You are a concise, helpful mobile app assistant.";

/// Chat-completion client. Rate-limited calls are answered by the stub.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
    temperature: f64,
    timeout: Duration,
    fallback: StubLlm,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f64,
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize, Debug)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

// Success envelope with a plain string message.
#[derive(Deserialize)]
struct ChatTextResponse {
    choices: Vec<TextChoice>,
}

#[derive(Deserialize)]
struct TextChoice {
    message: TextMessage,
}

#[derive(Deserialize)]
struct TextMessage {
    content: Option<String>,
}

// Success envelope whose message is a list of typed parts.
#[derive(Deserialize)]
struct ChatPartsResponse {
    choices: Vec<PartsChoice>,
}

#[derive(Deserialize)]
struct PartsChoice {
    message: PartsMessage,
}

#[derive(Deserialize)]
struct PartsMessage {
    content: Option<Vec<ContentPart>>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    _kind: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<Value>,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        model: String,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let base_url = Url::parse(OPENAI_API_BASE).map_err(|e| LlmError::Transport(e.to_string()))?;
        Self::with_base_url(api_key, base_url, model, temperature, timeout)
    }

    pub fn with_base_url(
        api_key: String,
        base_url: Url,
        model: String,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .user_agent("rickmorty-llm/0.1")
            .no_proxy()
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            temperature,
            timeout,
            fallback: StubLlm,
        })
    }

    pub fn from_config(cfg: &Config, api_key: String) -> Result<Self, LlmError> {
        let base_url =
            Url::parse(cfg.llm.base_url.trim()).map_err(|e| LlmError::Transport(e.to_string()))?;
        Self::with_base_url(
            api_key,
            base_url,
            cfg.llm.model.clone(),
            cfg.llm.temperature,
            cfg.llm_timeout(),
        )
    }

    pub fn chat_request(&self, user_prompt: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        }
    }

    pub fn build_request(&self, body: &ChatRequest) -> Result<reqwest::Request, LlmError> {
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .map_err(|e| LlmError::Transport(format!("invalid OpenAI base URL: {e}")))?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(body)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))
    }

    async fn complete(&self, user_prompt: String) -> Result<String, LlmError> {
        let body = self.chat_request(user_prompt);
        let request = self.build_request(&body)?;
        debug!(url = %request.url(), model = %self.model, "sending chat completion");

        let res = self.http.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Transport(format!("request timed out after {:?}", self.timeout))
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        parse_chat_response(status, &bytes)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    #[instrument(skip_all, fields(name = %req.name))]
    async fn summarize_character(&self, req: &SummaryRequest) -> Result<String, LlmError> {
        match self.complete(summary_prompt(req)).await {
            Err(LlmError::RateLimited) => {
                warn!("OpenAI rate limited; answering offline");
                self.fallback.summarize_character(req).await
            }
            other => other,
        }
    }

    #[instrument(skip_all, fields(name = %req.name))]
    async fn answer_about_character(&self, req: &QuestionRequest) -> Result<String, LlmError> {
        match self.complete(question_prompt(req)).await {
            Err(LlmError::RateLimited) => {
                warn!("OpenAI rate limited; answering offline");
                self.fallback.answer_about_character(req).await
            }
            other => other,
        }
    }
}

pub fn summary_prompt(req: &SummaryRequest) -> String {
    format!(
        "Summarize this Rick & Morty character in 2–3 friendly, spoiler-light sentences.\n\n\
         Name: {}\nStatus: {}\nSpecies: {}\nGender: {}\nEpisodes: {}",
        req.name, req.status, req.species, req.gender, req.episodes
    )
}

pub fn question_prompt(req: &QuestionRequest) -> String {
    format!(
        "Answer the question about this Rick & Morty character using only the facts below. \
         If the facts do not cover it, say so briefly.\n\n\
         Name: {}\nStatus: {}\nSpecies: {}\nGender: {}\nOrigin: {}\nLast known location: {}\n\
         Episodes: {}\n\nQuestion: {}",
        req.name,
        req.status,
        req.species,
        req.gender,
        req.origin.as_deref().unwrap_or("unknown"),
        req.location.as_deref().unwrap_or("unknown"),
        req.episodes.join(", "),
        req.question
    )
}

/// Classify an HTTP response from the chat endpoint.
///
/// Non-2xx: 429 is [`LlmError::RateLimited`]; anything else becomes
/// [`LlmError::Http`] carrying the server's JSON error message when present,
/// else the raw body. 2xx: a string `content` is tried first, then a list of
/// parts whose `text` fields are joined with newlines. Blank text is a
/// decoding error.
pub fn parse_chat_response(status: StatusCode, body: &[u8]) -> Result<String, LlmError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }
    if !status.is_success() {
        return Err(LlmError::Http {
            status: status.as_u16(),
            message: error_message(body),
        });
    }

    let mut saw_blank = false;

    if let Ok(v1) = serde_json::from_slice::<ChatTextResponse>(body) {
        if let Some(content) = v1.choices.into_iter().next().and_then(|c| c.message.content) {
            let text = content.trim();
            if !text.is_empty() {
                return Ok(text.to_string());
            }
            saw_blank = true;
        }
    }

    if let Ok(v2) = serde_json::from_slice::<ChatPartsResponse>(body) {
        if let Some(parts) = v2.choices.into_iter().next().and_then(|c| c.message.content) {
            let joined = parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n");
            let text = joined.trim();
            if !text.is_empty() {
                return Ok(text.to_string());
            }
            saw_blank = true;
        }
    }

    debug!(raw = %String::from_utf8_lossy(body), "unrecognized chat completion body");
    if saw_blank {
        Err(LlmError::Decoding("empty message content".into()))
    } else {
        Err(LlmError::Decoding("Unexpected response format".into()))
    }
}

fn error_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ApiErrorResponse>(body) {
        let (kind, code) = parsed
            .error
            .as_ref()
            .map(|e| (e.kind.clone(), e.code.clone()))
            .unwrap_or_default();
        let message = parsed.error.and_then(|e| e.message).or(parsed.message);
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            debug!(?kind, ?code, "OpenAI error body");
            return message;
        }
    }
    String::from_utf8_lossy(body).into_owned()
}
