//! Query service: the two catalog reads the controllers need, translated into
//! typed records.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::graphql::{Operation, RemoteStore, StoreError};
use crate::model::{CachePolicy, Character, CharactersPage};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Failed to fetch character with id {id}: {source}")]
    CharacterFetchFailed { id: String, source: StoreError },
    #[error("Failed to fetch characters for page {page}: {source}")]
    CharactersFetchFailed { page: i64, source: StoreError },
    #[error("No data received from GraphQL query")]
    NoData,
}

#[async_trait]
pub trait CharacterService: Send + Sync {
    async fn fetch_character(&self, id: &str, policy: CachePolicy) -> Result<Character, QueryError>;

    /// `page` defaults to 1.
    async fn fetch_characters(
        &self,
        page: Option<i64>,
        policy: CachePolicy,
    ) -> Result<CharactersPage, QueryError>;
}

#[derive(Deserialize)]
struct CharactersEnvelope {
    info: Option<PageInfo>,
    results: Option<Vec<Option<Character>>>,
}

#[derive(Deserialize)]
struct PageInfo {
    next: Option<i64>,
}

#[derive(Clone)]
pub struct LiveCharacterService {
    store: Arc<dyn RemoteStore>,
}

impl LiveCharacterService {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CharacterService for LiveCharacterService {
    #[instrument(skip_all, fields(id = %id, policy = policy.as_str()))]
    async fn fetch_character(&self, id: &str, policy: CachePolicy) -> Result<Character, QueryError> {
        let failed = |source| QueryError::CharacterFetchFailed {
            id: id.to_string(),
            source,
        };
        let data = self
            .store
            .execute(&Operation::character_details(id), policy)
            .await
            .map_err(failed)?;

        let character = match data.and_then(|mut d| d.get_mut("character").map(Value::take)) {
            Some(Value::Null) | None => return Err(QueryError::NoData),
            Some(raw) => raw,
        };
        serde_json::from_value(character).map_err(|e| failed(StoreError::Decode(e)))
    }

    #[instrument(skip_all, fields(page = ?page, policy = policy.as_str()))]
    async fn fetch_characters(
        &self,
        page: Option<i64>,
        policy: CachePolicy,
    ) -> Result<CharactersPage, QueryError> {
        let page = page.unwrap_or(1);
        let failed = |source| QueryError::CharactersFetchFailed { page, source };
        let data = self
            .store
            .execute(&Operation::characters(page), policy)
            .await
            .map_err(failed)?;

        // No list payload means nothing more to show, not a failure.
        let raw = match data.and_then(|mut d| d.get_mut("characters").map(Value::take)) {
            Some(Value::Null) | None => return Ok(CharactersPage::empty()),
            Some(raw) => raw,
        };
        let envelope: CharactersEnvelope =
            serde_json::from_value(raw).map_err(|e| failed(StoreError::Decode(e)))?;

        let results = envelope
            .results
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect();
        let next_page = envelope.info.and_then(|i| i.next);
        Ok(CharactersPage::new(results, next_page))
    }
}
