//! Resource List Controller
//!
//! Ties a `ResourceFetcher` and a `FavoriteTracker` together for one kind of
//! resource: whenever a page is applied, the favorite flags of the resources
//! on it are looked up.

use crate::api::SupersetClient;
use crate::config::{FeatureFlag, FeatureFlags, Settings};
use crate::favorites::FavoriteTracker;
use crate::fetcher::{FetchOutcome, ResourceFetcher, ResourcePage};
use crate::models::{PageRequest, Resource, SortColumn};
use crate::notify::Notifier;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// What a card or table row needs to render one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceCard {
    pub id: i64,
    pub name: String,
    /// `None` while unknown or for kinds without favorites
    pub favorite: Option<bool>,
    pub image_url: Option<String>,
}

pub struct ListController<R: Resource> {
    fetcher: ResourceFetcher<R>,
    favorites: FavoriteTracker,
    features: FeatureFlags,
    default_page_size: u32,
}

impl<R: Resource> ListController<R> {
    pub fn new(api: Arc<SupersetClient>, settings: &Settings, notifier: Notifier) -> Self {
        Self {
            fetcher: ResourceFetcher::new(api.clone(), notifier.clone()),
            favorites: FavoriteTracker::new(api, R::KIND, notifier),
            features: settings.features.clone(),
            default_page_size: settings.list.default_page_size,
        }
    }

    pub fn fetcher(&self) -> &ResourceFetcher<R> {
        &self.fetcher
    }

    pub fn favorites(&self) -> &FavoriteTracker {
        &self.favorites
    }

    /// First page, most recently changed first
    pub fn initial_request(&self) -> PageRequest {
        PageRequest::new(
            0,
            self.default_page_size,
            SortColumn::desc("changed_on_delta_humanized"),
        )
    }

    /// Fetch a page, then the favorite status of what it contains
    pub async fn fetch_data(&self, request: PageRequest) -> FetchOutcome {
        let outcome = self.fetcher.fetch_data(request).await;
        if outcome == FetchOutcome::Applied {
            self.load_favorites().await;
        }
        outcome
    }

    pub async fn refresh(&self) -> Option<FetchOutcome> {
        let outcome = self.fetcher.refresh().await?;
        if outcome == FetchOutcome::Applied {
            self.load_favorites().await;
        }
        Some(outcome)
    }

    async fn load_favorites(&self) {
        if !R::KIND.has_favorites() {
            return;
        }
        let ids: Vec<i64> = self.fetcher.resources().await.iter().map(|r| r.id()).collect();
        debug!("Looking up favorite status of {} {}s", ids.len(), R::KIND);
        self.favorites.fetch_favorite_status(&ids).await;
    }

    /// Flip the favorite flag of `id`; unknown counts as not favorited
    pub async fn toggle_favorite(&self, id: i64) -> FetchOutcome {
        let current = self.favorites.is_favorite(id).await.unwrap_or(false);
        self.favorites.save_favorite_status(id, !current).await
    }

    /// The card image, only shown when thumbnails are enabled
    pub fn card_image(&self, resource: &R) -> Option<String> {
        if !self.features.is_enabled(FeatureFlag::Thumbnails) {
            return None;
        }
        resource.thumbnail_url().map(str::to_string)
    }

    /// The current page in render order
    pub async fn cards(&self) -> Vec<ResourceCard> {
        let page: ResourcePage<R> = self.fetcher.page().await;
        let status = self.favorites.status().await;
        page.resources
            .iter()
            .map(|resource| ResourceCard {
                id: resource.id(),
                name: resource.name().to_string(),
                favorite: status.get(&resource.id()).copied(),
                image_url: self.card_image(resource),
            })
            .collect()
    }
}
