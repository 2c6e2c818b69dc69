//! Remote data store: the character catalog's GraphQL endpoint plus a local
//! response cache that honours a per-call [`CachePolicy`].

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::db::{self, Pool};
use crate::model::CachePolicy;

pub mod model;

use model::{GraphQlRequest, GraphQlResponse};

pub const CHARACTER_DETAILS_DOCUMENT: &str = "query CharacterDetails($id: ID!) { character(id: $id) { __typename id name status species type gender image origin { __typename name } location { __typename name } episode { __typename id name air_date episode } } }";

pub const CHARACTERS_DOCUMENT: &str = "query Characters($page: Int) { characters(page: $page) { __typename info { __typename next } results { __typename id name status species type gender image origin { __typename name } location { __typename name } } } }";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to reach GraphQL endpoint: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("GraphQL endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("invalid GraphQL response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A named query plus its variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: &'static str,
    pub document: &'static str,
    pub variables: Value,
}

impl Operation {
    pub fn character_details(id: &str) -> Self {
        Self {
            name: "CharacterDetails",
            document: CHARACTER_DETAILS_DOCUMENT,
            variables: json!({ "id": id }),
        }
    }

    pub fn characters(page: i64) -> Self {
        Self {
            name: "Characters",
            document: CHARACTERS_DOCUMENT,
            variables: json!({ "page": page }),
        }
    }

    /// Operation name + variables. Object keys serialize sorted, so equal
    /// variables always give the same key.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.name, self.variables)
    }
}

/// Executes a named query with variables under a cache policy.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` means the server answered without any `data`.
    async fn execute(&self, op: &Operation, policy: CachePolicy) -> Result<Option<Value>, StoreError>;
}

#[derive(Clone)]
pub struct GraphQlClient {
    http: Client,
    endpoint: Url,
    timeout: Duration,
    pool: Pool,
}

impl fmt::Debug for GraphQlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GraphQlClient {
    pub fn new(endpoint: Url, timeout: Duration, pool: Pool) -> Result<Self, StoreError> {
        let http = Client::builder()
            .user_agent("rickmorty-llm/0.1")
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            endpoint,
            timeout,
            pool,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn build_request(&self, op: &Operation) -> Result<reqwest::Request, StoreError> {
        let body = GraphQlRequest {
            query: op.document,
            operation_name: op.name,
            variables: &op.variables,
        };
        Ok(self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .build()?)
    }

    /// Remove every cached response.
    pub async fn clear_cache(&self) -> Result<u64, sqlx::Error> {
        db::cache_clear(&self.pool).await
    }

    async fn read_cache(&self, cache_key: &str) -> Option<Value> {
        match db::cache_get(&self.pool, cache_key).await {
            Ok(Some(hit)) => match serde_json::from_str(&hit.data) {
                Ok(data) => {
                    debug!(cache_key, fetched_at = %hit.fetched_at, "graphql cache hit");
                    Some(data)
                }
                Err(err) => {
                    warn!(?err, cache_key, "corrupt cached response; refetching");
                    None
                }
            },
            Ok(None) => {
                debug!(cache_key, "graphql cache miss");
                None
            }
            Err(err) => {
                warn!(?err, cache_key, "graphql cache read failed; refetching");
                None
            }
        }
    }

    async fn write_cache(&self, op: &Operation, cache_key: &str, data: &Value) {
        let encoded = data.to_string();
        if let Err(err) = db::cache_put(&self.pool, cache_key, op.name, &encoded).await {
            warn!(?err, cache_key, "graphql cache write failed");
        }
    }

    async fn fetch_network(&self, op: &Operation) -> Result<GraphQlPayload, StoreError> {
        let request = self.build_request(op)?;
        debug!(url = %request.url(), operation = op.name, variables = %op.variables, "sending graphql request");
        let res = self.http.execute(request).await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, operation = op.name, "graphql endpoint error");
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = res.text().await?;
        parse_graphql_response(&body)
    }
}

#[async_trait]
impl RemoteStore for GraphQlClient {
    #[instrument(skip_all, fields(operation = op.name, policy = policy.as_str()))]
    async fn execute(&self, op: &Operation, policy: CachePolicy) -> Result<Option<Value>, StoreError> {
        let cache_key = op.cache_key();
        if policy == CachePolicy::CacheFirst {
            if let Some(data) = self.read_cache(&cache_key).await {
                return Ok(Some(data));
            }
        }

        let payload = self.fetch_network(op).await?;
        match &payload.data {
            Some(data) if payload.errors.is_empty() => {
                self.write_cache(op, &cache_key, data).await;
            }
            Some(_) => debug!(cache_key = %cache_key, "response with errors not cached"),
            None => {}
        }
        Ok(payload.data)
    }
}

/// Decoded response body. `errors` is non-empty only when `data` still
/// carries at least one non-null root field.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQlPayload {
    pub data: Option<Value>,
    pub errors: Vec<String>,
}

/// Decode a GraphQL response body.
///
/// Errors with no data, or with every root field null, are a failure. Errors
/// next to some real data are logged and the data is kept.
pub fn parse_graphql_response(body: &str) -> Result<GraphQlPayload, StoreError> {
    let parsed: GraphQlResponse = serde_json::from_str(body)?;
    let data = parsed.data.filter(|d| !d.is_null());
    let errors: Vec<String> = parsed
        .errors
        .unwrap_or_default()
        .into_iter()
        .map(|e| e.message)
        .collect();

    if errors.is_empty() {
        return Ok(GraphQlPayload { data, errors });
    }
    match data {
        Some(data) if has_non_null_field(&data) => {
            warn!(errors = ?errors, "graphql returned partial data");
            Ok(GraphQlPayload {
                data: Some(data),
                errors,
            })
        }
        _ => Err(StoreError::GraphQl(errors)),
    }
}

fn has_non_null_field(data: &Value) -> bool {
    match data.as_object() {
        Some(fields) => fields.values().any(|v| !v.is_null()),
        None => !data.is_null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn client() -> GraphQlClient {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        GraphQlClient::new(
            Url::parse("https://rickandmortyapi.com/graphql").unwrap(),
            Duration::from_secs(5),
            pool,
        )
        .unwrap()
    }

    #[test]
    fn cache_key_includes_variables() {
        assert_eq!(Operation::characters(2).cache_key(), "Characters:{\"page\":2}");
        assert_eq!(
            Operation::character_details("42").cache_key(),
            "CharacterDetails:{\"id\":\"42\"}"
        );
        assert_ne!(
            Operation::characters(1).cache_key(),
            Operation::characters(2).cache_key()
        );
    }

    #[test]
    fn parse_plain_data() {
        let payload = parse_graphql_response(r#"{"data":{"character":{"id":"1"}}}"#).unwrap();
        assert!(payload.errors.is_empty());
        let data = payload.data.unwrap();
        assert_eq!(data["character"]["id"], "1");
    }

    #[test]
    fn parse_null_data_without_errors_is_none() {
        assert!(parse_graphql_response(r#"{"data":null}"#).unwrap().data.is_none());
        assert!(parse_graphql_response(r#"{}"#).unwrap().data.is_none());
    }

    #[test]
    fn parse_errors_without_data_fails() {
        let err = parse_graphql_response(
            r#"{"data":null,"errors":[{"message":"boom"},{"message":"bang"}]}"#,
        )
        .unwrap_err();
        match err {
            StoreError::GraphQl(messages) => assert_eq!(messages, vec!["boom", "bang"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_errors_with_only_null_fields_fails() {
        let err = parse_graphql_response(
            r#"{"data":{"characters":null},"errors":[{"message":"Internal server error"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::GraphQl(ref m) if m == &vec!["Internal server error".to_string()]));

        assert!(parse_graphql_response(
            r#"{"data":{"character":null},"errors":[{"message":"Character not found"}]}"#,
        )
        .is_err());
    }

    #[test]
    fn parse_partial_data_keeps_errors() {
        let payload = parse_graphql_response(
            r#"{"data":{"character":{"id":"1","origin":null},"location":null},"errors":[{"message":"origin failed"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.data.unwrap()["character"]["id"], "1");
        assert_eq!(payload.errors, vec!["origin failed"]);
    }

    #[test]
    fn parse_garbage_is_decode_error() {
        assert!(matches!(
            parse_graphql_response("<html>"),
            Err(StoreError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn build_request_posts_operation() {
        let client = client().await;
        let request = client.build_request(&Operation::characters(3)).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/graphql");
        assert_eq!(
            request
                .headers()
                .get("Content-Type")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "application/json"
        );
        assert_eq!(request.timeout(), Some(&Duration::from_secs(5)));

        let body: Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["operationName"], "Characters");
        assert_eq!(body["variables"]["page"], 3);
        assert!(body["query"].as_str().unwrap().starts_with("query Characters"));
    }

    #[tokio::test]
    async fn cache_first_serves_cached_data_without_network() {
        let client = client().await;
        let op = Operation::character_details("1");
        db::cache_put(&client.pool, &op.cache_key(), op.name, r#"{"character":{"id":"1"}}"#)
            .await
            .unwrap();

        // The endpoint is never contacted on a cache hit.
        let data = client.execute(&op, CachePolicy::CacheFirst).await.unwrap().unwrap();
        assert_eq!(data["character"]["id"], "1");

        assert_eq!(client.clear_cache().await.unwrap(), 1);
    }
}
