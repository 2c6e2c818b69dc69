//! Paged character list: accumulated items, the next-page cursor and the
//! loading/refreshing flags that gate re-entry.
//!
//! A second call while the same operation is in flight is dropped, not queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, warn};

use crate::model::{CachePolicy, Character};
use crate::service::CharacterService;

/// Observable list state. `next_page == None` means the list is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListState {
    pub items: Vec<Character>,
    pub next_page: Option<i64>,
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub error: Option<String>,
}

impl Default for ListState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_page: Some(1),
            is_loading: false,
            is_refreshing: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPhase {
    Idle,
    LoadingNext,
    Refreshing,
    Error,
}

impl ListState {
    pub fn phase(&self) -> ListPhase {
        if self.is_refreshing {
            ListPhase::Refreshing
        } else if self.is_loading {
            ListPhase::LoadingNext
        } else if self.error.is_some() {
            ListPhase::Error
        } else {
            ListPhase::Idle
        }
    }
}

struct Inner {
    state: ListState,
    /// Bumped by every refresh; page results from an older generation are dropped.
    generation: u64,
}

pub struct PaginationController {
    service: Arc<dyn CharacterService>,
    inner: Mutex<Inner>,
}

impl PaginationController {
    pub fn new(service: Arc<dyn CharacterService>) -> Self {
        Self {
            service,
            inner: Mutex::new(Inner {
                state: ListState::default(),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the cursor page (cache first) and append it.
    ///
    /// No-op when the list is exhausted or a load or refresh is in flight.
    /// A failure records the error and leaves items and cursor untouched.
    #[instrument(skip_all)]
    pub async fn load_next_page(&self) {
        let (page, generation) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(page) = inner.state.next_page else {
                return;
            };
            if inner.state.is_loading || inner.state.is_refreshing {
                return;
            }
            inner.state.is_loading = true;
            (page, inner.generation)
        };

        let result = self
            .service
            .fetch_characters(Some(page), CachePolicy::CacheFirst)
            .await;

        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.state.is_loading = false;
        if inner.generation != generation {
            debug!(page, "dropping page superseded by a refresh");
            return;
        }
        match result {
            Ok(fetched) => {
                debug!(page, count = fetched.results.len(), next = ?fetched.next_page, "page loaded");
                inner.state.items.extend(fetched.results);
                inner.state.next_page = fetched.next_page;
                inner.state.error = None;
            }
            Err(err) => {
                warn!(page, error = %err, "failed to load characters");
                inner.state.error = Some(err.to_string());
            }
        }
    }

    /// Reset to page 1 and fetch it from the network, replacing the list.
    ///
    /// A failed refresh leaves the list empty. No-op while another refresh is
    /// in flight.
    #[instrument(skip_all)]
    pub async fn refresh(&self) {
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.state.is_refreshing {
                return;
            }
            inner.generation += 1;
            inner.state.error = None;
            inner.state.items.clear();
            inner.state.next_page = Some(1);
            inner.state.is_refreshing = true;
        }

        let result = self
            .service
            .fetch_characters(Some(1), CachePolicy::NetworkOnly)
            .await;

        let mut guard = self.lock();
        let state = &mut guard.state;
        state.is_refreshing = false;
        match result {
            Ok(fetched) => {
                debug!(count = fetched.results.len(), next = ?fetched.next_page, "list refreshed");
                state.items = fetched.results;
                state.next_page = fetched.next_page;
                state.error = None;
            }
            Err(err) => {
                warn!(error = %err, "failed to refresh characters");
                state.error = Some(err.to_string());
            }
        }
    }

    /// Load more when something is shown, otherwise start over.
    pub async fn retry_last_operation(&self) {
        if self.has_items() {
            self.load_next_page().await;
        } else {
            self.refresh().await;
        }
    }

    pub async fn load_initial_if_needed(&self) {
        let idle_and_empty = {
            let guard = self.lock();
            let st = &guard.state;
            st.items.is_empty() && !st.is_loading && !st.is_refreshing
        };
        if idle_and_empty {
            self.refresh().await;
        }
    }

    /// Load up to `pages` pages. The first page comes from the network when
    /// `refresh` is set, otherwise from the cache when available. Stops early
    /// at the end of the list or on the first error.
    #[instrument(skip(self))]
    pub async fn load_pages(&self, pages: u32, refresh: bool) {
        if refresh {
            self.refresh().await;
        } else {
            self.load_next_page().await;
        }
        for _ in 1..pages {
            if !self.has_next_page() || self.error_message().is_some() {
                break;
            }
            self.load_next_page().await;
        }
    }

    /// Derived view over the accumulated list. Characters without an id only
    /// show up when not restricted to favorites.
    pub fn filtered_items<F>(&self, favorites_only: bool, is_favorite: F) -> Vec<Character>
    where
        F: Fn(&str) -> bool,
    {
        self.lock()
            .state
            .items
            .iter()
            .filter(|c| match c.id.as_deref() {
                Some(id) => !favorites_only || is_favorite(id),
                None => !favorites_only,
            })
            .cloned()
            .collect()
    }

    pub fn clear_error(&self) {
        self.lock().state.error = None;
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().state.error.clone()
    }

    pub fn has_items(&self) -> bool {
        !self.lock().state.items.is_empty()
    }

    pub fn has_next_page(&self) -> bool {
        self.lock().state.next_page.is_some()
    }

    pub fn snapshot(&self) -> ListState {
        self.lock().state.clone()
    }

    pub fn should_show_loading_state(&self) -> bool {
        let guard = self.lock();
        guard.state.is_loading && guard.state.items.is_empty()
    }

    pub fn should_show_refresh_state(&self) -> bool {
        self.lock().state.is_refreshing
    }

    pub fn should_show_error_state(&self) -> bool {
        let guard = self.lock();
        guard.state.error.is_some() && guard.state.items.is_empty()
    }

    pub fn should_show_pagination_loading(&self) -> bool {
        let guard = self.lock();
        guard.state.is_loading && !guard.state.items.is_empty()
    }
}
