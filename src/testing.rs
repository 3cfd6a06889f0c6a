//! In-process stub of the REST API for tests

use crate::api::SupersetClient;
use crate::config::ApiConfig;
use crate::rison;
use axum::extract::Multipart;
use axum::http::HeaderMap;
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub label: String,
    pub q: Option<Value>,
    pub request_id: Option<String>,
    pub authorization: Option<String>,
    pub csrf: Option<String>,
    pub fields: HashMap<String, String>,
}

/// Shared log of the requests a stub handled
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Recorder {
    pub fn record(&self, label: &str, params: &HashMap<String, String>, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let request = RecordedRequest {
            label: label.to_string(),
            q: params
                .get("q")
                .map(|q| rison::from_str(q).expect("stub received invalid rison")),
            request_id: header("x-request-id"),
            authorization: header("authorization"),
            csrf: header("x-csrftoken"),
            fields: HashMap::new(),
        };
        self.requests.lock().unwrap().push(request);
    }

    pub fn record_fields(&self, label: &str, fields: HashMap<String, String>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            label: label.to_string(),
            fields,
            ..RecordedRequest::default()
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.label == label)
            .count()
    }
}

/// A stub server bound to an ephemeral port plus a client pointed at it
pub struct StubServer {
    pub client: Arc<SupersetClient>,
    pub recorder: Recorder,
}

impl StubServer {
    pub async fn start<F>(build: F) -> Self
    where
        F: FnOnce(Recorder) -> Router,
    {
        let recorder = Recorder::default();
        let router = build(recorder.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let config = ApiConfig {
            base_url: Url::parse(&format!("http://{}/", addr)).unwrap(),
            ..ApiConfig::default()
        };
        let client = Arc::new(SupersetClient::new(&config).unwrap());

        Self { client, recorder }
    }
}

/// Multipart fields as `name -> value`; file parts become `file_name:len`
pub async fn read_multipart(mut multipart: Multipart) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.unwrap();
        let value = match file_name {
            Some(file_name) => format!("{}:{}", file_name, bytes.len()),
            None => String::from_utf8_lossy(&bytes).to_string(),
        };
        fields.insert(name, value);
    }
    fields
}

/// Holds a stub handler until the test lets it respond
#[derive(Debug, Clone, Default)]
pub struct Gate {
    arrived: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Called by the handler
    pub async fn pass(&self) {
        self.arrived.notify_one();
        self.release.notified().await;
    }

    /// Wait until the handler is parked in `pass`
    pub async fn arrived(&self) {
        self.arrived.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}
