//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed rows returned by repositories.
//! - `repo`: SQL-only functions over the local SQLite file.
//!
//! Callers import from `rickmorty_llm::db`; the repository API is re-exported.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{CachedResponse, KvEntry};
