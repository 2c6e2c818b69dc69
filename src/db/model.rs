//! Rows returned by the storage repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};

/// A stored key/value pair with its last write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// A cached GraphQL `data` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub operation: String,
    pub data: String,
    pub fetched_at: DateTime<Utc>,
}
