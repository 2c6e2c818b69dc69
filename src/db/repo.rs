use super::model::{CachedResponse, KvEntry};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key/value store
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(key = %key))]
pub async fn kv_get(pool: &Pool, key: &str) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT value FROM kv WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

#[instrument(skip_all, fields(key = %key))]
pub async fn kv_get_entry(pool: &Pool, key: &str) -> sqlx::Result<Option<KvEntry>> {
    let row = sqlx::query("SELECT value, updated_at FROM kv WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| KvEntry {
        value: row.get("value"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }))
}

/// Upsert; the last write wins.
#[instrument(skip_all, fields(key = %key))]
pub async fn kv_set(pool: &Pool, key: &str, value: &str) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns whether a row was removed.
#[instrument(skip_all, fields(key = %key))]
pub async fn kv_delete(pool: &Pool, key: &str) -> sqlx::Result<bool> {
    let res = sqlx::query("DELETE FROM kv WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all, fields(prefix = %prefix))]
pub async fn kv_keys_with_prefix(pool: &Pool, prefix: &str) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        "SELECT key FROM kv WHERE substr(key, 1, length(?)) = ? ORDER BY key",
    )
    .bind(prefix)
    .bind(prefix)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// GraphQL response cache
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(cache_key = %cache_key))]
pub async fn cache_get(pool: &Pool, cache_key: &str) -> sqlx::Result<Option<CachedResponse>> {
    let row = sqlx::query("SELECT operation, data, fetched_at FROM query_cache WHERE cache_key = ?")
        .bind(cache_key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| CachedResponse {
        operation: row.get("operation"),
        data: row.get("data"),
        fetched_at: row.get::<DateTime<Utc>, _>("fetched_at"),
    }))
}

#[instrument(skip_all, fields(cache_key = %cache_key))]
pub async fn cache_put(pool: &Pool, cache_key: &str, operation: &str, data: &str) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO query_cache (cache_key, operation, data, fetched_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(cache_key) DO UPDATE SET data = excluded.data, fetched_at = excluded.fetched_at",
    )
    .bind(cache_key)
    .bind(operation)
    .bind(data)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Drops every cached response; returns how many were removed.
#[instrument(skip_all)]
pub async fn cache_clear(pool: &Pool) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM query_cache").execute(pool).await?;
    Ok(res.rows_affected())
}
