//! Single-character lifecycle: load, refresh, summarize and ask.
//!
//! Results that arrive after the current id changed are dropped. Summaries are
//! still persisted under the id they were generated for.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, warn};

use crate::llm::{LlmClient, QuestionRequest, SummaryRequest};
use crate::model::{CachePolicy, Character};
use crate::service::{CharacterService, QueryError};
use crate::summary_cache::SummaryCache;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailState {
    pub current_id: Option<String>,
    pub character: Option<Character>,
    pub summary: Option<String>,
    pub answer: Option<String>,
    pub is_loading: bool,
    pub is_summarizing: bool,
    pub is_answering: bool,
    pub error: Option<String>,
}

impl DetailState {
    fn is_current(&self, id: &str) -> bool {
        self.current_id.as_deref() == Some(id)
    }

    fn has_summary(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

pub struct DetailController {
    service: Arc<dyn CharacterService>,
    llm: Arc<dyn LlmClient>,
    summaries: SummaryCache,
    state: Mutex<DetailState>,
}

impl DetailController {
    pub fn new(
        service: Arc<dyn CharacterService>,
        llm: Arc<dyn LlmClient>,
        summaries: SummaryCache,
    ) -> Self {
        Self {
            service,
            llm,
            summaries,
            state: Mutex::new(DetailState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DetailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Show character `id`, surfacing a cached summary before the fetch
    /// completes. Skipped when `id` is already shown.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn load(&self, id: &str) {
        {
            let mut st = self.lock();
            if st.is_current(id) && st.character.is_some() {
                return;
            }
            if !st.is_current(id) {
                let (is_summarizing, is_answering) = (st.is_summarizing, st.is_answering);
                *st = DetailState {
                    current_id: Some(id.to_string()),
                    is_summarizing,
                    is_answering,
                    ..Default::default()
                };
            }
            st.is_loading = true;
        }

        match self.summaries.read(id).await {
            Ok(Some(cached)) => {
                let mut st = self.lock();
                if st.is_current(id) && st.summary.is_none() {
                    debug!("showing cached summary");
                    st.summary = Some(cached);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(?err, "failed to read cached summary"),
        }

        let result = self.service.fetch_character(id, CachePolicy::CacheFirst).await;
        self.apply_fetch(id, result);
    }

    /// Re-fetch the current character from the network. No-op before the
    /// first `load`.
    #[instrument(skip_all)]
    pub async fn refresh(&self) {
        let id = {
            let mut st = self.lock();
            let Some(id) = st.current_id.clone() else {
                return;
            };
            st.is_loading = true;
            id
        };
        let result = self.service.fetch_character(&id, CachePolicy::NetworkOnly).await;
        self.apply_fetch(&id, result);
    }

    fn apply_fetch(&self, id: &str, result: Result<Character, QueryError>) {
        let mut st = self.lock();
        if !st.is_current(id) {
            debug!(id = %id, "dropping character for a superseded id");
            return;
        }
        st.is_loading = false;
        match result {
            Ok(character) => {
                st.character = Some(character);
                st.error = None;
            }
            Err(err) => {
                warn!(id = %id, error = %err, "failed to load character");
                st.error = Some(err.to_string());
            }
        }
    }

    /// Ask the LLM for a summary unless one is already shown. `force_refresh`
    /// replaces an existing summary.
    #[instrument(skip_all, fields(force_refresh = force_refresh))]
    pub async fn summarize(&self, force_refresh: bool) {
        let (id, character) = {
            let mut st = self.lock();
            if st.is_summarizing || (st.has_summary() && !force_refresh) {
                return;
            }
            let (Some(id), Some(character)) = (st.current_id.clone(), st.character.clone()) else {
                return;
            };
            st.is_summarizing = true;
            (id, character)
        };

        let request = SummaryRequest::from_character(&character);
        let result = self.llm.summarize_character(&request).await;

        if let Ok(text) = &result {
            if let Err(err) = self.summaries.write(&id, text).await {
                warn!(id = %id, ?err, "failed to persist summary");
            }
        }

        let mut st = self.lock();
        st.is_summarizing = false;
        if !st.is_current(&id) {
            debug!(id = %id, "dropping summary for a superseded id");
            return;
        }
        match result {
            Ok(text) => {
                st.summary = Some(text);
                st.error = None;
            }
            Err(err) => {
                warn!(id = %id, error = %err, "summarize failed");
                st.error = Some(err.to_string());
            }
        }
    }

    /// Forget the summary for the current id, both in memory and on disk.
    #[instrument(skip_all)]
    pub async fn clear_cached_summary(&self) {
        let id = {
            let mut st = self.lock();
            st.summary = None;
            st.current_id.clone()
        };
        let Some(id) = id else {
            return;
        };
        if let Err(err) = self.summaries.delete(&id).await {
            warn!(id = %id, ?err, "failed to delete cached summary");
            let mut st = self.lock();
            if st.is_current(&id) {
                st.error = Some(format!("Failed to clear cached summary: {err}"));
            }
        }
    }

    /// Answer a free-text question about the shown character. Blank questions
    /// are ignored.
    #[instrument(skip_all)]
    pub async fn ask(&self, question: &str) {
        let question = question.trim();
        if question.is_empty() {
            return;
        }
        let (id, character) = {
            let mut st = self.lock();
            if st.is_answering {
                return;
            }
            let (Some(id), Some(character)) = (st.current_id.clone(), st.character.clone()) else {
                return;
            };
            st.is_answering = true;
            (id, character)
        };

        let request = QuestionRequest::from_character(&character, question);
        let result = self.llm.answer_about_character(&request).await;

        let mut st = self.lock();
        st.is_answering = false;
        if !st.is_current(&id) {
            debug!(id = %id, "dropping answer for a superseded id");
            return;
        }
        match result {
            Ok(text) => {
                st.answer = Some(text);
                st.error = None;
            }
            Err(err) => {
                warn!(id = %id, error = %err, "ask failed");
                st.error = Some(err.to_string());
            }
        }
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn snapshot(&self) -> DetailState {
        self.lock().clone()
    }
}
