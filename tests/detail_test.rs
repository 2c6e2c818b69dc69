mod common;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use common::Responder;
use rickmorty_llm::app::AppContext;
use rickmorty_llm::config::{self, Config};
use rickmorty_llm::db;
use rickmorty_llm::detail::DetailController;
use rickmorty_llm::llm::{LlmClient, LlmError, QuestionRequest, SummaryRequest};
use rickmorty_llm::model::{CachePolicy, Character, CharactersPage};
use rickmorty_llm::service::{CharacterService, QueryError};
use rickmorty_llm::summary_cache::SummaryCache;

/// Serves characters by id. Each fetch waits for a permit when gated.
#[derive(Default)]
struct RecordingService {
    characters: HashMap<String, Character>,
    calls: Mutex<Vec<(String, CachePolicy)>>,
    gate: Option<Semaphore>,
}

impl RecordingService {
    fn new(characters: Vec<Character>, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            characters: characters
                .into_iter()
                .map(|c| (c.id.clone().unwrap(), c))
                .collect(),
            calls: Mutex::new(Vec::new()),
            gate: gated.then(|| Semaphore::new(0)),
        })
    }

    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CharacterService for RecordingService {
    async fn fetch_character(&self, id: &str, policy: CachePolicy) -> Result<Character, QueryError> {
        self.calls.lock().unwrap().push((id.to_string(), policy));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.characters.get(id).cloned().ok_or(QueryError::NoData)
    }

    async fn fetch_characters(
        &self,
        _page: Option<i64>,
        _policy: CachePolicy,
    ) -> Result<CharactersPage, QueryError> {
        Ok(CharactersPage::empty())
    }
}

/// Scripted LLM whose calls block until released.
struct GatedLlm {
    summaries: Mutex<VecDeque<Result<String, LlmError>>>,
    started: AtomicUsize,
    gate: Semaphore,
}

impl GatedLlm {
    fn new(summaries: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            summaries: Mutex::new(summaries.into()),
            started: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }
}

#[async_trait]
impl LlmClient for GatedLlm {
    async fn summarize_character(&self, _req: &SummaryRequest) -> Result<String, LlmError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.unwrap().forget();
        self.summaries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Gated summary".into()))
    }

    async fn answer_about_character(&self, _req: &QuestionRequest) -> Result<String, LlmError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.unwrap().forget();
        Ok("Gated answer".into())
    }
}

fn character(id: &str, name: &str) -> Character {
    Character {
        id: Some(id.into()),
        name: Some(name.into()),
        ..Default::default()
    }
}

async fn summaries() -> SummaryCache {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    SummaryCache::new(pool)
}

#[tokio::test]
async fn superseded_load_is_discarded() {
    let svc = RecordingService::new(vec![character("1", "Rick"), character("2", "Morty")], true);
    let llm = GatedLlm::new(vec![]);
    let detail = DetailController::new(svc.clone(), llm, summaries().await);

    let release = async {
        while svc.calls() < 2 {
            tokio::task::yield_now().await;
        }
        svc.gate.as_ref().unwrap().add_permits(2);
    };
    tokio::join!(detail.load("1"), detail.load("2"), release);

    let state = detail.snapshot();
    assert_eq!(state.current_id.as_deref(), Some("2"));
    assert_eq!(state.character.unwrap().display_name(), "Morty");
    assert!(!state.is_loading);
}

#[tokio::test]
async fn concurrent_summarize_is_dropped() {
    let svc = RecordingService::new(vec![character("1", "Rick")], false);
    let llm = GatedLlm::new(vec![Ok("Only once".into())]);
    let detail = DetailController::new(svc, llm.clone(), summaries().await);
    detail.load("1").await;

    let release = async {
        while llm.started.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        assert!(detail.snapshot().is_summarizing);
        llm.gate.add_permits(2);
    };
    tokio::join!(detail.summarize(true), detail.summarize(true), release);

    assert_eq!(llm.started.load(Ordering::SeqCst), 1);
    let state = detail.snapshot();
    assert_eq!(state.summary.as_deref(), Some("Only once"));
    assert!(!state.is_summarizing);
}

#[tokio::test]
async fn stale_summary_is_persisted_but_not_shown() {
    let svc = RecordingService::new(vec![character("1", "Rick"), character("2", "Morty")], false);
    let llm = GatedLlm::new(vec![Ok("Rick summary".into())]);
    let cache = summaries().await;
    let detail = DetailController::new(svc, llm.clone(), cache.clone());
    detail.load("1").await;

    let switch = async {
        while llm.started.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        detail.load("2").await;
        llm.gate.add_permits(1);
    };
    tokio::join!(detail.summarize(false), switch);

    let state = detail.snapshot();
    assert_eq!(state.current_id.as_deref(), Some("2"));
    assert_eq!(state.summary, None);
    assert_eq!(cache.read("1").await.unwrap().as_deref(), Some("Rick summary"));
    assert_eq!(cache.read("2").await.unwrap(), None);
}

#[tokio::test]
async fn concurrent_ask_is_dropped() {
    let svc = RecordingService::new(vec![character("1", "Rick")], false);
    let llm = GatedLlm::new(vec![]);
    let detail = DetailController::new(svc, llm.clone(), summaries().await);
    detail.load("1").await;

    let release = async {
        while llm.started.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        llm.gate.add_permits(2);
    };
    tokio::join!(detail.ask("Who?"), detail.ask("Why?"), release);

    assert_eq!(llm.started.load(Ordering::SeqCst), 1);
    assert_eq!(detail.snapshot().answer.as_deref(), Some("Gated answer"));
}

fn test_config(data_dir: &str, endpoint: &str) -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.app.data_dir = data_dir.to_string();
    cfg.graphql.endpoint = endpoint.to_string();
    cfg.llm.api_key = String::new();
    cfg
}

#[tokio::test]
async fn state_survives_a_cold_start() -> Result<()> {
    std::env::remove_var(config::API_KEY_ENV);
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    let character_body = serde_json::json!({
        "data": { "character": { "id": "1", "name": "Rick Sanchez", "status": "Alive", "episode": [{ "id": "1", "name": "Pilot" }] } }
    })
    .to_string();
    let responder = Responder::one(200, &character_body).await;

    let cfg = test_config(data_dir.to_str().unwrap(), &format!("{}graphql", responder.base_url));
    cfg.ensure_dirs()?;
    let database_url = cfg.database_url();

    {
        let ctx = AppContext::init(&cfg, &database_url).await?;
        assert!(ctx.favorites.toggle("1").await?);

        let detail = ctx.detail_controller();
        detail.load("1").await;
        detail.summarize(false).await;
        let state = detail.snapshot();
        assert_eq!(state.error, None);
        // No key configured: the offline summarizer answers.
        assert_eq!(state.summary.as_deref(), Some("Rick Sanchez (Alive). Seen in Pilot."));
        ctx.pool.close().await;
    }

    // Second start: character comes from the response cache, summary and
    // favorites from the kv table. The responder only served one request.
    let ctx = AppContext::init(&cfg, &database_url).await?;
    assert!(ctx.favorites.contains("1"));
    let detail = ctx.detail_controller();
    detail.load("1").await;
    let state = detail.snapshot();
    assert_eq!(state.character.unwrap().display_name(), "Rick Sanchez");
    assert_eq!(state.summary.as_deref(), Some("Rick Sanchez (Alive). Seen in Pilot."));
    assert_eq!(ctx.summaries.cached_ids().await?, vec!["1".to_string()]);

    assert_eq!(responder.requests().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn clearing_a_summary_works_offline() -> Result<()> {
    std::env::remove_var(config::API_KEY_ENV);
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    // Nothing listens on this port.
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let cfg = test_config(data_dir.to_str().unwrap(), &format!("http://{addr}/graphql"));
    cfg.ensure_dirs()?;
    let ctx = AppContext::init(&cfg, &cfg.database_url()).await?;
    ctx.summaries.write("1", "Rick summary").await?;

    assert!(ctx.clear_summary("1").await?);
    assert_eq!(ctx.summaries.read("1").await?, None);
    assert!(!ctx.clear_summary("1").await?);
    Ok(())
}
