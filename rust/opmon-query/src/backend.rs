//! Transport to the OpMon connector.
//!
//! Every call is a single HTTP exchange against `<base>/<resource>`. The trait is the
//! seam tests replace with an in-memory recorder.

use crate::{
    batch::BackendRequest,
    error::{Result, ServiceError},
    options::Resource,
};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of the connectivity probe. Non-200 answers are data, not errors.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthProbe {
    pub status: u16,
    pub status_text: Option<String>,
    pub body: Option<Value>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// POST `<base>/query`. Returns the raw rows.
    async fn execute(&self, request: &BackendRequest) -> Result<Vec<Value>>;

    /// POST `<base>/<resource>` with a query-shaped payload.
    async fn fetch_options(&self, resource: Resource, payload: &Value) -> Result<Vec<Value>>;

    /// POST `<base>/<path>` for endpoints outside the option table (`variable`, `tag-keys`, ...).
    async fn call(&self, path: &str, payload: &Value) -> Result<Value>;

    /// GET `<base>`.
    async fn health(&self) -> Result<HealthProbe>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    authorization: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            authorization: None,
        })
    }

    /// Sends `value` as the `Authorization` header on every request.
    pub fn with_authorization(mut self, value: Option<String>) -> Self {
        self.authorization = value;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        let url = self.url(path);
        debug!(%url, "posting to backend");

        let mut request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(authorization) = &self.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(|err| {
            warn!(%url, error = %err, "backend request failed");
            ServiceError::from(err)
        })?;

        let status = response.status();
        if let Err(err) = check_status(status) {
            warn!(%url, status = status.as_u16(), "backend returned an error status");
            return Err(err);
        }

        let body = response.bytes().await.map_err(|err| {
            warn!(%url, error = %err, "failed to read backend response");
            ServiceError::from(err)
        })?;
        decode_body(&url, &body)
    }
}

fn check_status(status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("backend returned status {}", status.as_u16()));
    Err(ServiceError::backend(Some(status.as_u16()), message))
}

/// An empty body carries no rows.
fn decode_body(url: &str, body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|err| {
        ServiceError::InvalidResponse(format!("response from {url} is not JSON: {err}"))
    })
}

/// Rows arrive either bare or wrapped in `{data: [...]}`.
pub(crate) fn into_rows(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ServiceError::InvalidResponse(format!(
                "expected an array of rows, got {other}"
            ))),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ServiceError::InvalidResponse(format!(
            "expected an array of rows, got {other}"
        ))),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn execute(&self, request: &BackendRequest) -> Result<Vec<Value>> {
        let payload = serde_json::to_value(request)
            .map_err(|err| ServiceError::Internal(anyhow::Error::new(err)))?;
        into_rows(self.post("query", &payload).await?)
    }

    async fn fetch_options(&self, resource: Resource, payload: &Value) -> Result<Vec<Value>> {
        into_rows(self.post(resource.name(), payload).await?)
    }

    async fn call(&self, path: &str, payload: &Value) -> Result<Value> {
        self.post(path, payload).await
    }

    async fn health(&self) -> Result<HealthProbe> {
        let url = self.base_url.clone();
        let mut request = self.client.get(&url);
        if let Some(authorization) = &self.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(|err| {
            warn!(%url, error = %err, "backend health probe failed");
            ServiceError::from(err)
        })?;

        let status = response.status();
        let body = response.json::<Value>().await.ok();

        Ok(HealthProbe {
            status: status.as_u16(),
            status_text: status.canonical_reason().map(str::to_string),
            body,
        })
    }
}
