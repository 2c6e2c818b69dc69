//! Persisted character summaries, one `summary:{id}` entry per character.
//! Entries never expire; they live until explicitly removed.

use chrono::{DateTime, Utc};

use crate::db::{self, Pool};

pub const SUMMARY_KEY_PREFIX: &str = "summary:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSummary {
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SummaryCache {
    pool: Pool,
}

fn key_for(id: &str) -> String {
    format!("{SUMMARY_KEY_PREFIX}{id}")
}

impl SummaryCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn read(&self, id: &str) -> sqlx::Result<Option<String>> {
        db::kv_get(&self.pool, &key_for(id)).await
    }

    pub async fn read_entry(&self, id: &str) -> sqlx::Result<Option<CachedSummary>> {
        Ok(db::kv_get_entry(&self.pool, &key_for(id))
            .await?
            .map(|entry| CachedSummary {
                text: entry.value,
                updated_at: entry.updated_at,
            }))
    }

    pub async fn write(&self, id: &str, text: &str) -> sqlx::Result<()> {
        db::kv_set(&self.pool, &key_for(id), text).await
    }

    /// Returns whether an entry existed.
    pub async fn delete(&self, id: &str) -> sqlx::Result<bool> {
        db::kv_delete(&self.pool, &key_for(id)).await
    }

    /// Ids that currently have a stored summary.
    pub async fn cached_ids(&self) -> sqlx::Result<Vec<String>> {
        let keys = db::kv_keys_with_prefix(&self.pool, SUMMARY_KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(SUMMARY_KEY_PREFIX).map(str::to_string))
            .collect())
    }
}
