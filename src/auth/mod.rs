//! Authentication module
//!
//! Logs in against the security API, keeps the access token fresh and
//! fetches the CSRF token mutating requests need.

pub mod jwt;

use crate::api::SupersetClient;
use crate::error::{ApiResult, AppError};
use crate::models::ResultResponse;
use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    provider: &'a str,
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl SupersetClient {
    /// Log in and fetch a CSRF token for later mutating calls
    pub async fn login(&self, username: &str, password: &str, provider: &str) -> ApiResult<()> {
        let path = "api/v1/security/login";
        let builder = self.bare_request(Method::POST, path)?.json(&LoginRequest {
            username,
            password,
            provider,
            refresh: true,
        });
        let tokens: TokenResponse = self.execute_json(builder, path).await?;

        {
            let mut session = self.session.write().await;
            session.access_expires_at = jwt::expires_at(&tokens.access_token);
            session.access_token = Some(tokens.access_token);
            session.refresh_token = tokens.refresh_token;
            session.csrf_token = None;
        }
        info!("Logged in as '{}'", username);

        self.fetch_csrf_token().await?;
        Ok(())
    }

    /// Exchange the refresh token for a new access token
    pub async fn refresh(&self) -> ApiResult<()> {
        let refresh_token = self
            .session
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::Unauthorized("No refresh token, log in again".to_string()))?;

        let path = "api/v1/security/refresh";
        let builder = self
            .bare_request(Method::POST, path)?
            .bearer_auth(refresh_token);
        let tokens: TokenResponse = self.execute_json(builder, path).await?;

        let mut session = self.session.write().await;
        session.access_expires_at = jwt::expires_at(&tokens.access_token);
        session.access_token = Some(tokens.access_token);
        debug!("Access token refreshed, expires at {:?}", session.access_expires_at);
        Ok(())
    }

    /// Fetch and remember the CSRF token
    pub async fn fetch_csrf_token(&self) -> ApiResult<String> {
        let path = "api/v1/security/csrf_token/";
        let builder = self.raw_request(Method::GET, path).await?;
        let response: ResultResponse<String> = self.execute_json(builder, path).await?;

        self.session.write().await.csrf_token = Some(response.result.clone());
        Ok(response.result)
    }

    /// Forget all credentials
    pub async fn logout(&self) {
        let mut session = self.session.write().await;
        *session = Default::default();
        info!("Session cleared");
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.access_token.is_some()
    }

    /// Refresh the access token when it expires within the margin
    pub(crate) async fn ensure_fresh_token(&self) -> ApiResult<()> {
        let needs_refresh = {
            let session = self.session.read().await;
            session.refresh_token.is_some()
                && jwt::needs_refresh(session.access_expires_at, Utc::now())
        };
        if needs_refresh {
            self.refresh().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::jwt::tests::make_token;
    use crate::models::ResourceKind;
    use crate::testing::StubServer;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn security_routes(
        router: Router,
        recorder: crate::testing::Recorder,
        access_token: String,
        refreshed_token: String,
    ) -> Router {
        let login_recorder = recorder.clone();
        let refresh_recorder = recorder.clone();
        router
            .route(
                "/api/v1/security/login",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let recorder = login_recorder.clone();
                    let access_token = access_token.clone();
                    async move {
                        recorder.record("login", &HashMap::new(), &headers);
                        assert_eq!(body["username"], json!("admin"));
                        assert_eq!(body["refresh"], json!(true));
                        assert_eq!(body["provider"], json!("db"));
                        Json(json!({
                            "access_token": access_token,
                            "refresh_token": "refresh-me"
                        }))
                    }
                }),
            )
            .route(
                "/api/v1/security/refresh",
                post(move |headers: HeaderMap| {
                    let recorder = refresh_recorder.clone();
                    let refreshed_token = refreshed_token.clone();
                    async move {
                        recorder.record("refresh", &HashMap::new(), &headers);
                        Json(json!({"access_token": refreshed_token}))
                    }
                }),
            )
            .route(
                "/api/v1/security/csrf_token/",
                get(|| async { Json(json!({"result": "csrf-123"})) }),
            )
    }

    #[tokio::test]
    async fn test_login_attaches_bearer_and_csrf() {
        let access = make_token("access", Duration::minutes(15));
        let access_for_stub = access.clone();
        let server = StubServer::start(move |recorder| {
            let fav_recorder = recorder.clone();
            let router = Router::new().route(
                "/api/v1/dashboard/{id}/favorites/",
                post(move |headers: HeaderMap| {
                    let recorder = fav_recorder.clone();
                    async move {
                        recorder.record("favorite", &HashMap::new(), &headers);
                        Json(json!({"result": "OK"}))
                    }
                }),
            );
            security_routes(router, recorder, access_for_stub, "unused".to_string())
        })
        .await;

        assert_ok!(server.client.login("admin", "general", "db").await);
        assert!(server.client.is_authenticated().await);

        server
            .client
            .set_favorite(ResourceKind::Dashboard, 4, true)
            .await
            .unwrap();

        let favorite = server
            .recorder
            .requests()
            .into_iter()
            .find(|r| r.label == "favorite")
            .unwrap();
        assert_eq!(favorite.authorization, Some(format!("Bearer {}", access)));
        assert_eq!(favorite.csrf.as_deref(), Some("csrf-123"));
        assert_eq!(server.recorder.count("refresh"), 0);
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed_first() {
        let expiring = make_token("access", Duration::seconds(5));
        let fresh = make_token("access", Duration::minutes(15));
        let fresh_for_stub = fresh.clone();
        let server = StubServer::start(move |recorder| {
            let list_recorder = recorder.clone();
            let router = Router::new().route(
                "/api/v1/database/{id}/schemas/",
                get(move |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| {
                    let recorder = list_recorder.clone();
                    async move {
                        recorder.record("schemas", &params, &headers);
                        Json(json!({"result": ["public"]}))
                    }
                }),
            );
            security_routes(router, recorder, expiring, fresh_for_stub)
        })
        .await;

        server.client.login("admin", "general", "db").await.unwrap();
        server.client.database_schemas(1, false).await.unwrap();

        let requests = server.recorder.requests();
        let refresh = requests.iter().find(|r| r.label == "refresh").unwrap();
        assert_eq!(refresh.authorization.as_deref(), Some("Bearer refresh-me"));

        let schemas = requests.iter().find(|r| r.label == "schemas").unwrap();
        assert_eq!(schemas.authorization, Some(format!("Bearer {}", fresh)));
    }

    #[tokio::test]
    async fn test_refresh_without_login_is_unauthorized() {
        let server = StubServer::start(|_| Router::new()).await;
        let err = assert_err!(server.client.refresh().await);
        assert!(matches!(err, crate::error::AppError::Unauthorized(_)));

        server.client.logout().await;
        assert!(!server.client.is_authenticated().await);
    }
}
