//! REST client
//!
//! `SupersetClient` talks to the `/api/v1/` endpoints. List and lookup
//! calls carry their arguments as a single rison encoded `q` parameter.

use crate::config::ApiConfig;
use crate::error::{api_error, ApiResult, AppError};
use crate::models::{
    Database, DatabaseQuery, FavoriteStatusEntry, ListQuery, ListResponse, Resource, ResourceKind,
    ResultResponse, SchemaQuery, TableOption, TableQuery,
};
use crate::rison;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

/// Header every request is tagged with
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Header carrying the CSRF token on mutating requests
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Tokens held for the logged in user
#[derive(Debug, Default, Clone)]
pub(crate) struct Session {
    pub access_token: Option<String>,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub csrf_token: Option<String>,
}

/// Client for the BI server's REST API
pub struct SupersetClient {
    http: reqwest::Client,
    base_url: Url,
    pub(crate) session: RwLock<Session>,
}

impl SupersetClient {
    /// Create a client for the configured server
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            session: RwLock::new(Session::default()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path such as `api/v1/database/` against the server root
    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AppError::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    /// Build a request that carries only its request id
    pub(crate) fn bare_request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let url = self.endpoint(path)?;
        let request_id = Uuid::new_v4();
        info!("api: {} {} ({})", method, path, request_id);

        Ok(self
            .http
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id.to_string()))
    }

    /// Build a request with the session's credentials, without touching the
    /// token lifecycle
    pub(crate) async fn raw_request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let mut builder = self.bare_request(method.clone(), path)?;

        let session = self.session.read().await;
        if let Some(token) = &session.access_token {
            builder = builder.bearer_auth(token);
        }
        if method != Method::GET {
            if let Some(csrf) = &session.csrf_token {
                builder = builder.header(CSRF_HEADER, csrf);
            }
        }
        Ok(builder)
    }

    /// Build a request, refreshing the access token first when it is about
    /// to expire
    async fn request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        self.ensure_fresh_token().await?;
        self.raw_request(method, path).await
    }

    /// Build a request with a rison `q` parameter
    async fn request_with_query<Q: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &Q,
    ) -> ApiResult<RequestBuilder> {
        let q = rison::to_string(query)?;
        debug!("api: {} q={}", path, q);
        Ok(self.request(method, path).await?.query(&[("q", q)]))
    }

    /// Send a request and return the body of a successful response
    pub(crate) async fn execute(&self, builder: RequestBuilder, label: &str) -> ApiResult<String> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("api: {} failed with status {}: {}", label, status, body);
            return Err(api_error(status, &body));
        }

        debug!("api: {} -> {} ({} bytes)", label, status, body.len());
        Ok(body)
    }

    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        label: &str,
    ) -> ApiResult<T> {
        let body = self.execute(builder, label).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch one page of dashboards, charts or datasets
    pub async fn list_resources<R: Resource>(&self, query: &ListQuery) -> ApiResult<ListResponse<R>> {
        let path = format!("api/v1/{}/", R::KIND);
        let builder = self.request_with_query(Method::GET, &path, query).await?;
        self.execute_json(builder, &path).await
    }

    /// Fetch the databases visible to the current user
    pub async fn list_databases(&self, query: &DatabaseQuery) -> ApiResult<ListResponse<Database>> {
        let path = "api/v1/database/";
        let builder = self.request_with_query(Method::GET, path, query).await?;
        self.execute_json(builder, path).await
    }

    /// Fetch the schema names of a database. `force` bypasses the server's
    /// schema cache.
    pub async fn database_schemas(&self, database_id: i64, force: bool) -> ApiResult<Vec<String>> {
        let path = format!("api/v1/database/{}/schemas/", database_id);
        let builder = self
            .request_with_query(Method::GET, &path, &SchemaQuery { force })
            .await?;
        let response: ResultResponse<Vec<String>> = self.execute_json(builder, &path).await?;
        Ok(response.result)
    }

    /// Fetch the tables of one schema
    pub async fn database_tables(
        &self,
        database_id: i64,
        schema: &str,
        force: bool,
    ) -> ApiResult<ListResponse<TableOption>> {
        let path = format!("api/v1/database/{}/tables/", database_id);
        let query = TableQuery {
            force,
            schema_name: schema.to_string(),
        };
        let builder = self.request_with_query(Method::GET, &path, &query).await?;
        self.execute_json(builder, &path).await
    }

    /// Look up which of `ids` the current user has favorited
    pub async fn favorite_status(
        &self,
        kind: ResourceKind,
        ids: &[i64],
    ) -> ApiResult<Vec<FavoriteStatusEntry>> {
        let path = format!("api/v1/{}/favorite_status/", kind);
        let builder = self.request_with_query(Method::GET, &path, ids).await?;
        let response: ResultResponse<Vec<FavoriteStatusEntry>> =
            self.execute_json(builder, &path).await?;
        Ok(response.result)
    }

    /// Add or remove a resource from the user's favorites
    pub async fn set_favorite(&self, kind: ResourceKind, id: i64, favorite: bool) -> ApiResult<()> {
        let path = format!("api/v1/{}/{}/favorites/", kind, id);
        let method = if favorite { Method::POST } else { Method::DELETE };
        let builder = self.request(method, &path).await?;
        self.execute(builder, &path).await?;
        Ok(())
    }

    /// Upload an export bundle to a resource's import endpoint
    pub async fn import_bundle(
        &self,
        kind: ResourceKind,
        file_name: &str,
        contents: Vec<u8>,
        overwrite: bool,
    ) -> ApiResult<()> {
        if !kind.is_importable() {
            return Err(AppError::Validation(format!("{}s cannot be imported", kind)));
        }

        let path = format!("api/v1/{}/import/", kind);
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))?;
        let mut form = Form::new().part("formData", part);
        if overwrite {
            form = form.text("overwrite", "true");
        }

        let builder = self.request(Method::POST, &path).await?.multipart(form);
        self.execute(builder, &path).await?;
        Ok(())
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".zip") {
        "application/zip"
    } else if lower.ends_with(".json") {
        "application/json"
    } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        "application/x-yaml"
    } else {
        "application/octet-stream"
    }
}
