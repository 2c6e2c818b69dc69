//! Wiring: one pool, one remote store, one LLM client and one favorites set
//! shared by every controller built from the context.

use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::{self, Pool};
use crate::detail::DetailController;
use crate::favorites::FavoritesStore;
use crate::graphql::GraphQlClient;
use crate::llm::{self, LlmClient};
use crate::pagination::PaginationController;
use crate::service::{CharacterService, LiveCharacterService};
use crate::summary_cache::SummaryCache;

pub struct AppContext {
    pub pool: Pool,
    pub graphql: GraphQlClient,
    pub service: Arc<dyn CharacterService>,
    pub llm: Arc<dyn LlmClient>,
    pub summaries: SummaryCache,
    pub favorites: Arc<FavoritesStore>,
}

impl AppContext {
    /// Open the database at `database_url`, apply migrations and build the
    /// collaborators described by `cfg`.
    pub async fn init(cfg: &Config, database_url: &str) -> Result<Self> {
        let pool = db::init_pool(database_url)
            .await
            .with_context(|| format!("failed to open database {database_url}"))?;
        db::run_migrations(&pool).await?;
        Self::with_pool(cfg, pool).await
    }

    /// Build on an already migrated pool.
    pub async fn with_pool(cfg: &Config, pool: Pool) -> Result<Self> {
        let endpoint = Url::parse(cfg.graphql.endpoint.trim())
            .context("graphql.endpoint is not a valid URL")?;
        let graphql = GraphQlClient::new(endpoint, cfg.graphql_timeout(), pool.clone())
            .context("failed to build GraphQL client")?;
        info!(endpoint = %graphql.endpoint(), "remote data store ready");

        let service: Arc<dyn CharacterService> =
            Arc::new(LiveCharacterService::new(Arc::new(graphql.clone())));
        let llm = llm::build_client(cfg);
        let summaries = SummaryCache::new(pool.clone());
        let favorites = Arc::new(
            FavoritesStore::load(pool.clone())
                .await
                .context("failed to load favorites")?,
        );

        Ok(Self {
            pool,
            graphql,
            service,
            llm,
            summaries,
            favorites,
        })
    }

    pub fn list_controller(&self) -> PaginationController {
        PaginationController::new(self.service.clone())
    }

    /// Drop the stored summary for `id` without touching the network.
    /// Returns whether an entry existed.
    pub async fn clear_summary(&self, id: &str) -> Result<bool> {
        let existed = self
            .summaries
            .delete(id)
            .await
            .with_context(|| format!("failed to delete summary for {id}"))?;
        info!(id = %id, existed, "stored summary cleared");
        Ok(existed)
    }

    pub fn detail_controller(&self) -> DetailController {
        DetailController::new(self.service.clone(), self.llm.clone(), self.summaries.clone())
    }
}
