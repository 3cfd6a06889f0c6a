//! Favorite-Status Tracker
//!
//! Keeps the `id -> favorited` map for the resources on screen. Toggles are
//! applied optimistically and sent to the server afterwards; a failed toggle
//! is rolled back unless the same id was toggled again in the meantime.

use crate::api::SupersetClient;
use crate::fetcher::FetchOutcome;
use crate::models::ResourceKind;
use crate::notify::Notifier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct FavoriteState {
    status: HashMap<i64, bool>,
    /// Latest local toggle per id. Dropped once it has resolved and no
    /// lookup that started before it is still in flight.
    toggles: HashMap<i64, Toggle>,
    /// Start sequence of every status lookup in flight
    lookups: Vec<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Toggle {
    seq: u64,
    pending: bool,
}

impl FavoriteState {
    fn prune_toggles(&mut self) {
        let oldest_lookup = self.lookups.iter().min().copied().unwrap_or(u64::MAX);
        self.toggles.retain(|_, t| t.pending || t.seq > oldest_lookup);
    }
}

pub struct FavoriteTracker {
    api: Arc<SupersetClient>,
    kind: ResourceKind,
    notifier: Notifier,
    state: RwLock<FavoriteState>,
    sequence: AtomicU64,
}

impl FavoriteTracker {
    pub fn new(api: Arc<SupersetClient>, kind: ResourceKind, notifier: Notifier) -> Self {
        Self {
            api,
            kind,
            notifier,
            state: RwLock::new(FavoriteState::default()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Look up the favorite status of `ids` and merge it into the map.
    ///
    /// Ids toggled locally while the lookup was in flight keep their local
    /// value.
    pub async fn fetch_favorite_status(&self, ids: &[i64]) -> FetchOutcome {
        if ids.is_empty() {
            return FetchOutcome::Applied;
        }

        let started_at = {
            let mut state = self.state.write().await;
            let started_at = self.sequence.load(Ordering::SeqCst);
            state.lookups.push(started_at);
            started_at
        };
        let result = self.api.favorite_status(self.kind, ids).await;

        let mut state = self.state.write().await;
        if let Some(i) = state.lookups.iter().position(|s| *s == started_at) {
            state.lookups.swap_remove(i);
        }

        let outcome = match result {
            Ok(entries) => {
                let mut merged = 0;
                for entry in entries {
                    let toggled_since = state
                        .toggles
                        .get(&entry.id)
                        .is_some_and(|t| t.seq > started_at);
                    if toggled_since {
                        debug!("Keeping local favorite state of {} {}", self.kind, entry.id);
                        continue;
                    }
                    state.status.insert(entry.id, entry.value);
                    merged += 1;
                }
                info!("Merged favorite status of {} {}s", merged, self.kind);
                FetchOutcome::Applied
            }
            Err(e) => {
                self.notifier.danger(format!(
                    "There was an error fetching the favorite status: {}",
                    e.user_message()
                ));
                FetchOutcome::Failed
            }
        };
        state.prune_toggles();
        outcome
    }

    /// Mark or unmark `id` as a favorite.
    ///
    /// The map is updated before the request is sent.
    pub async fn save_favorite_status(&self, id: i64, is_favorite: bool) -> FetchOutcome {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = {
            let mut state = self.state.write().await;
            state.toggles.insert(id, Toggle { seq, pending: true });
            state.status.insert(id, is_favorite)
        };

        let result = self.api.set_favorite(self.kind, id, is_favorite).await;

        let mut state = self.state.write().await;
        let latest = match state.toggles.get_mut(&id) {
            Some(toggle) if toggle.seq == seq => {
                toggle.pending = false;
                true
            }
            _ => false,
        };

        let outcome = match result {
            Ok(()) => {
                info!("{} {} favorite set to {}", self.kind, id, is_favorite);
                FetchOutcome::Applied
            }
            Err(e) => {
                self.notifier.danger(format!(
                    "There was an error saving the favorite status: {}",
                    e.user_message()
                ));

                if latest {
                    match previous {
                        Some(value) => state.status.insert(id, value),
                        None => state.status.remove(&id),
                    };
                } else {
                    warn!("Not reverting {} {}, toggled again since", self.kind, id);
                }
                FetchOutcome::Failed
            }
        };
        state.prune_toggles();
        outcome
    }

    /// `None` while the status of `id` is unknown
    pub async fn is_favorite(&self, id: i64) -> Option<bool> {
        self.state.read().await.status.get(&id).copied()
    }

    pub async fn status(&self) -> HashMap<i64, bool> {
        self.state.read().await.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ToastLevel;
    use crate::testing::{Gate, StubServer};
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    /// Toggling id 13 fails; toggling id 5 waits on the gate
    async fn favorites_server(gate: Gate) -> StubServer {
        StubServer::start(move |recorder| {
            let status_recorder = recorder.clone();
            let toggle = move |Path(id): Path<i64>| {
                let gate = gate.clone();
                async move {
                    if id == 5 {
                        gate.pass().await;
                    }
                    if id == 13 {
                        return (
                            StatusCode::UNPROCESSABLE_ENTITY,
                            Json(json!({"message": "Could not save"})),
                        );
                    }
                    (StatusCode::OK, Json(json!({"result": "OK"})))
                }
            };
            Router::new()
                .route(
                    "/api/v1/dashboard/{id}/favorites/",
                    post(toggle.clone()).delete(toggle),
                )
                .route(
                    "/api/v1/dashboard/favorite_status/",
                    get(move |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| {
                        let recorder = status_recorder.clone();
                        async move {
                            recorder.record("favorite_status", &params, &headers);
                            Json(json!({"result": [
                                {"id": 1, "value": true},
                                {"id": 2, "value": false},
                                {"id": 5, "value": false}
                            ]}))
                        }
                    }),
                )
        })
        .await
    }

    fn tracker(server: &StubServer) -> (FavoriteTracker, tokio::sync::mpsc::UnboundedReceiver<crate::notify::Toast>) {
        let (notifier, toasts) = Notifier::channel();
        (
            FavoriteTracker::new(server.client.clone(), ResourceKind::Dashboard, notifier),
            toasts,
        )
    }

    #[tokio::test]
    async fn test_fetch_merges_status() {
        let server = favorites_server(Gate::default()).await;
        let (tracker, _toasts) = tracker(&server);

        assert_eq!(tracker.fetch_favorite_status(&[1, 2, 5]).await, FetchOutcome::Applied);
        assert_eq!(tracker.is_favorite(1).await, Some(true));
        assert_eq!(tracker.is_favorite(2).await, Some(false));
        assert_eq!(tracker.is_favorite(99).await, None);
        assert_eq!(server.recorder.requests()[0].q, Some(json!([1, 2, 5])));
    }

    #[tokio::test]
    async fn test_empty_ids_send_nothing() {
        let server = favorites_server(Gate::default()).await;
        let (tracker, _toasts) = tracker(&server);

        assert_eq!(tracker.fetch_favorite_status(&[]).await, FetchOutcome::Applied);
        assert_eq!(server.recorder.count("favorite_status"), 0);
    }

    #[tokio::test]
    async fn test_toggle_is_visible_before_server_acknowledges() {
        let gate = Gate::default();
        let server = favorites_server(gate.clone()).await;
        let (tracker, _toasts) = tracker(&server);
        let tracker = Arc::new(tracker);

        let pending = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.save_favorite_status(5, true).await })
        };
        gate.arrived().await;
        assert_eq!(tracker.is_favorite(5).await, Some(true));

        gate.open();
        assert_eq!(pending.await.unwrap(), FetchOutcome::Applied);
        assert_eq!(tracker.is_favorite(5).await, Some(true));
        assert!(tracker.state.read().await.toggles.is_empty());
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts_and_toasts() {
        let server = favorites_server(Gate::default()).await;
        let (tracker, mut toasts) = tracker(&server);

        assert_eq!(tracker.save_favorite_status(13, true).await, FetchOutcome::Failed);
        assert_eq!(tracker.is_favorite(13).await, None);
        assert!(tracker.state.read().await.toggles.is_empty());

        let toast = toasts.recv().await.unwrap();
        assert_eq!(toast.level, ToastLevel::Danger);
        assert_eq!(
            toast.message,
            "There was an error saving the favorite status: Could not save"
        );
    }

    #[tokio::test]
    async fn test_stale_status_does_not_overwrite_toggle() {
        let gate = Gate::default();
        let server = StubServer::start({
            let gate = gate.clone();
            move |_| {
                Router::new()
                    .route(
                        "/api/v1/dashboard/{id}/favorites/",
                        post(|| async { Json(json!({"result": "OK"})) }),
                    )
                    .route(
                        "/api/v1/dashboard/favorite_status/",
                        get(move || {
                            let gate = gate.clone();
                            async move {
                                gate.pass().await;
                                Json(json!({"result": [
                                    {"id": 1, "value": true},
                                    {"id": 5, "value": false}
                                ]}))
                            }
                        }),
                    )
            }
        })
        .await;
        let (tracker, _toasts) = tracker(&server);
        let tracker = Arc::new(tracker);

        let lookup = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.fetch_favorite_status(&[1, 5]).await })
        };
        gate.arrived().await;

        // id 5 is toggled on while the lookup still reports it as not favorited
        assert_eq!(tracker.save_favorite_status(5, true).await, FetchOutcome::Applied);
        // still needed to shield id 5 from the lookup in flight
        assert_eq!(tracker.state.read().await.toggles.len(), 1);
        gate.open();
        assert_eq!(lookup.await.unwrap(), FetchOutcome::Applied);

        assert_eq!(tracker.is_favorite(5).await, Some(true));
        assert_eq!(tracker.is_favorite(1).await, Some(true));
        let state = tracker.state.read().await;
        assert!(state.toggles.is_empty());
        assert!(state.lookups.is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_revert_newer_toggle() {
        let gate = Gate::default();
        let server = StubServer::start({
            let gate = gate.clone();
            move |_| {
                // The first call is held and then fails; later calls succeed
                let calls = Arc::new(AtomicU64::new(0));
                let toggle = move || {
                    let gate = gate.clone();
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            gate.pass().await;
                            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "Boom"})));
                        }
                        (StatusCode::OK, Json(json!({"result": "OK"})))
                    }
                };
                Router::new().route(
                    "/api/v1/dashboard/{id}/favorites/",
                    post(toggle.clone()).delete(toggle),
                )
            }
        })
        .await;
        let (tracker, mut toasts) = tracker(&server);
        let tracker = Arc::new(tracker);

        let first = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.save_favorite_status(8, true).await })
        };
        gate.arrived().await;

        assert_eq!(tracker.save_favorite_status(8, false).await, FetchOutcome::Applied);
        gate.open();
        assert_eq!(first.await.unwrap(), FetchOutcome::Failed);

        assert_eq!(tracker.is_favorite(8).await, Some(false));
        assert_eq!(toasts.recv().await.unwrap().level, ToastLevel::Danger);
        assert!(tracker.state.read().await.toggles.is_empty());
    }

    #[tokio::test]
    async fn test_toggles_do_not_accumulate() {
        let server = favorites_server(Gate::default()).await;
        let (tracker, _toasts) = tracker(&server);

        for id in [1, 2, 3, 13] {
            tracker.save_favorite_status(id, true).await;
        }
        tracker.fetch_favorite_status(&[1, 2]).await;

        let state = tracker.state.read().await;
        assert!(state.toggles.is_empty());
        assert!(state.lookups.is_empty());
        assert_eq!(state.status.len(), 4);
    }
}
