#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use opmon_query::{
    backend::{Backend, HealthProbe},
    batch::BackendRequest,
    config::AppConfig,
    datasource::DataSource,
    error::{Result, ServiceError},
    model::{defaults, ObjectType, Query, QueryMode},
    options::Resource,
    server::Server,
    variables::{Scope, Variable, VariableKind},
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tower::ServiceExt;

pub const API_KEY: &str = "test-api-key";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub path: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
enum Reply {
    Rows(Value),
    Fail(String),
}

/// In-memory backend that records every call and answers from canned replies.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<String, Reply>>,
    health: Mutex<Option<HealthProbe>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, body: Value) {
        self.replies
            .lock()
            .insert(path.to_string(), Reply::Rows(body));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.replies
            .lock()
            .insert(path.to_string(), Reply::Fail(message.to_string()));
    }

    pub fn set_health(&self, probe: HealthProbe) {
        *self.health.lock() = Some(probe);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn answer(&self, path: &str, payload: &Value) -> Result<Value> {
        self.calls.lock().push(Call {
            path: path.to_string(),
            payload: payload.clone(),
        });
        match self.replies.lock().get(path).cloned() {
            Some(Reply::Rows(body)) => Ok(body),
            Some(Reply::Fail(message)) => Err(ServiceError::backend(None, message)),
            None => Ok(json!([])),
        }
    }

    fn rows(&self, path: &str, payload: &Value) -> Result<Vec<Value>> {
        match self.answer(path, payload)? {
            Value::Array(rows) => Ok(rows),
            other => Err(ServiceError::InvalidResponse(other.to_string())),
        }
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn execute(&self, request: &BackendRequest) -> Result<Vec<Value>> {
        let payload = serde_json::to_value(request).expect("request serializes");
        self.rows("query", &payload)
    }

    async fn fetch_options(&self, resource: Resource, payload: &Value) -> Result<Vec<Value>> {
        self.rows(resource.name(), payload)
    }

    async fn call(&self, path: &str, payload: &Value) -> Result<Value> {
        self.answer(path, payload)
    }

    async fn health(&self) -> Result<HealthProbe> {
        self.calls.lock().push(Call {
            path: String::new(),
            payload: Value::Null,
        });
        match self.health.lock().clone() {
            Some(probe) => Ok(probe),
            None => Err(ServiceError::backend(None, "connection refused")),
        }
    }
}

pub fn datasource(backend: &Arc<RecordingBackend>) -> DataSource {
    DataSource::new(backend.clone(), "opmon")
}

pub fn scope() -> Scope {
    Scope::new(
        vec![
            Variable::multi("hosts", VariableKind::Custom, ["web01", "web02"]),
            Variable::single("svc", VariableKind::Textbox, "http"),
        ],
        Vec::new(),
    )
}

/// A target with every filter field populated.
pub fn complete_query(ref_id: &str) -> Query {
    Query {
        ref_id: Some(ref_id.into()),
        mode: Some(QueryMode::Availability),
        object_type: Some(ObjectType::Service),
        host: Some("$hosts".into()),
        service: Some("$svc".into()),
        hostgroup: Some(defaults::HOSTGROUP.into()),
        servicegroup: Some(defaults::SERVICEGROUP.into()),
        service_catalog: Some(defaults::SERVICE_CATALOG.into()),
        metric: Some(defaults::METRIC.into()),
        ..Default::default()
    }
}

/// Drives the axum router in-process.
pub struct TestServer {
    router: Router,
}

impl TestServer {
    pub fn new(backend: &Arc<RecordingBackend>) -> Self {
        let mut config = AppConfig::embedded("http://opmon.test");
        config.api_key = Some(API_KEY.to_string());
        let server = Server::with_datasource(config, datasource(backend));
        Self {
            router: server.router(),
        }
    }

    pub async fn post<T: Serialize>(&self, uri: &str, body: &T) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(http::Method::POST)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header("x-api-key", API_KEY)
            .body(Body::from(serde_json::to_vec(body).expect("body serializes")))
            .expect("request builds");
        self.send(request).await
    }

    pub async fn post_raw(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(http::Method::POST)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header("x-api-key", API_KEY)
            .body(Body::from(body.to_string()))
            .expect("request builds");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, api_key: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(http::Method::GET).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        self.send(builder.body(Body::empty()).expect("request builds"))
            .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle request");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}
