pub mod app;
pub mod config;
pub mod db;
pub mod detail;
pub mod favorites;
pub mod graphql;
pub mod llm;
pub mod model;
pub mod pagination;
pub mod service;
pub mod summary_cache;
