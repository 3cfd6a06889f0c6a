//! Resource Fetcher
//!
//! Loads pages of dashboards, charts or datasets for a list view. Requests
//! are never cancelled; each one is tagged with a generation number and a
//! response is only applied if no newer request was issued meanwhile.

use crate::api::SupersetClient;
use crate::error::validation_error;
use crate::models::{PageRequest, Resource};
use crate::notify::Notifier;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use validator::Validate;

/// What happened to a fetch once it completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response was applied to the state
    Applied,
    /// A newer request was issued before this one completed; dropped
    Superseded,
    /// The request failed or was rejected; reported as a toast
    Failed,
}

/// The page currently shown by a list view
#[derive(Debug, Clone)]
pub struct ResourcePage<R> {
    pub resources: Vec<R>,
    pub count: usize,
    pub loading: bool,
    pub last_request: Option<PageRequest>,
}

impl<R> Default for ResourcePage<R> {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            count: 0,
            loading: false,
            last_request: None,
        }
    }
}

impl<R> ResourcePage<R> {
    /// Number of pages for the current total
    pub fn page_count(&self) -> usize {
        match &self.last_request {
            Some(request) if request.page_size > 0 => {
                self.count.div_ceil(request.page_size as usize)
            }
            _ => 0,
        }
    }
}

pub struct ResourceFetcher<R: Resource> {
    api: Arc<SupersetClient>,
    notifier: Notifier,
    state: RwLock<ResourcePage<R>>,
    generation: AtomicU64,
}

impl<R: Resource> ResourceFetcher<R> {
    pub fn new(api: Arc<SupersetClient>, notifier: Notifier) -> Self {
        Self {
            api,
            notifier,
            state: RwLock::new(ResourcePage::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Fetch one page and replace the current collection with it
    pub async fn fetch_data(&self, request: PageRequest) -> FetchOutcome {
        if let Err(e) = request.validate() {
            let err = validation_error(e.to_string());
            self.notifier.danger(format!(
                "An error occurred while fetching {}s: {}",
                R::KIND,
                err.user_message()
            ));
            return FetchOutcome::Failed;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.last_request = Some(request.clone());
        }

        let query = request.to_list_query();
        let result = self.api.list_resources::<R>(&query).await;

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(
                "Dropping {} page {} response, superseded by a newer request",
                R::KIND,
                request.page_index
            );
            return FetchOutcome::Superseded;
        }
        state.loading = false;

        match result {
            Ok(response) => {
                info!(
                    "Loaded {} {}s (page {}, {} total)",
                    response.result.len(),
                    R::KIND,
                    request.page_index,
                    response.count
                );
                state.resources = response.result;
                state.count = response.count;
                FetchOutcome::Applied
            }
            Err(e) => {
                self.notifier.danger(format!(
                    "An error occurred while fetching {}s: {}",
                    R::KIND,
                    e.user_message()
                ));
                FetchOutcome::Failed
            }
        }
    }

    /// Re-run the last page request, if there was one
    pub async fn refresh(&self) -> Option<FetchOutcome> {
        let request = self.state.read().await.last_request.clone()?;
        Some(self.fetch_data(request).await)
    }

    /// Copy of the current page state
    pub async fn page(&self) -> ResourcePage<R> {
        self.state.read().await.clone()
    }

    pub async fn resources(&self) -> Vec<R> {
        self.state.read().await.resources.clone()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.count
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }
}
