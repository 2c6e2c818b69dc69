//! Favorited character ids, persisted as one JSON array under a single key.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::db::{self, Pool};

pub const FAVORITES_KEY: &str = "favorites";

#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error("favorites storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("favorites encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Process-wide favorites set. Construct once and share behind an `Arc`.
///
/// The whole set is loaded at construction and rewritten on every mutation
/// that changes it.
#[derive(Debug)]
pub struct FavoritesStore {
    ids: RwLock<HashSet<String>>,
    pool: Option<Pool>,
}

impl FavoritesStore {
    #[instrument(skip_all)]
    pub async fn load(pool: Pool) -> Result<Self, FavoritesError> {
        let ids = match db::kv_get(&pool, FAVORITES_KEY).await? {
            Some(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) => list.into_iter().collect(),
                Err(err) => {
                    warn!(?err, "stored favorites are unreadable; starting empty");
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };
        Ok(Self {
            ids: RwLock::new(ids),
            pool: Some(pool),
        })
    }

    /// Non-persistent store, for tests and previews.
    pub fn in_memory() -> Self {
        Self {
            ids: RwLock::new(HashSet::new()),
            pool: None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Sorted snapshot of the set.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Returns true when the id was newly added.
    pub async fn add(&self, id: &str) -> Result<bool, FavoritesError> {
        let inserted = self
            .ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        if inserted {
            if let Err(err) = self.persist().await {
                self.ids
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(id);
                return Err(err);
            }
        }
        Ok(inserted)
    }

    /// Returns true when the id was present.
    pub async fn remove(&self, id: &str) -> Result<bool, FavoritesError> {
        let removed = self
            .ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed {
            if let Err(err) = self.persist().await {
                self.ids
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id.to_string());
                return Err(err);
            }
        }
        Ok(removed)
    }

    /// Flip membership; returns whether the id is a favorite afterwards.
    pub async fn toggle(&self, id: &str) -> Result<bool, FavoritesError> {
        if self.contains(id) {
            self.remove(id).await?;
            Ok(false)
        } else {
            self.add(id).await?;
            Ok(true)
        }
    }

    async fn persist(&self) -> Result<(), FavoritesError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };
        let encoded = serde_json::to_string(&self.ids())?;
        db::kv_set(pool, FAVORITES_KEY, &encoded).await?;
        Ok(())
    }
}
