use crate::{
    backend::HttpBackend,
    batch::BackendRequest,
    config::AppConfig,
    datasource::{DataSource, DataSourceStatus, QueryResponse, VariableQuery, VariableQueryOptions},
    editor::{self, Choice, EditorUpdate, FieldChange},
    error::{Result, ServiceError},
    frames::{MetricFindValue, SelectableOption, TagKey, TagValue},
    model::{EditorMode, NormalizedQuery, ObjectType, Query, QueryMode, QueryRequest},
    options::Field,
    state::AppState,
    variables::VariableSnapshot,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

#[derive(Debug, Deserialize)]
pub struct QueryEnvelope {
    #[serde(default)]
    pub query: Query,
    #[serde(flatten)]
    pub snapshot: VariableSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct RequestEnvelope {
    #[serde(flatten)]
    pub request: QueryRequest,
    #[serde(flatten)]
    pub snapshot: VariableSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct VariableEnvelope {
    #[serde(flatten)]
    pub variable: VariableQuery,
    #[serde(flatten)]
    pub options: VariableQueryOptions,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub snapshot: VariableSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ChangeEnvelope {
    #[serde(default)]
    pub query: Query,
    pub change: FieldChange,
}

#[derive(Debug, Serialize)]
pub struct EditorPlan {
    #[serde(rename = "editorMode")]
    pub editor_mode: EditorMode,
    #[serde(rename = "queryModes")]
    pub query_modes: Vec<Choice<QueryMode>>,
    #[serde(rename = "objectTypes")]
    pub object_types: Vec<ObjectType>,
    #[serde(rename = "groupBy")]
    pub group_by: Vec<SelectableOption>,
    #[serde(rename = "resultFormats")]
    pub result_formats: Vec<SelectableOption>,
    #[serde(rename = "visibleFields")]
    pub visible_fields: Vec<Field>,
    #[serde(rename = "initialFetches")]
    pub initial_fetches: Vec<Field>,
}

impl Server {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let backend = HttpBackend::new(config.datasource_url(), config.request_timeout)?
            .with_authorization(config.basic_auth.clone());
        let datasource = DataSource::new(Arc::new(backend), config.datasource_name.clone());
        Ok(Self::with_datasource(config, datasource))
    }

    pub fn with_datasource(config: AppConfig, datasource: DataSource) -> Self {
        let config = Arc::new(config);
        let state = AppState::new(Arc::clone(&config), datasource);
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(Self::health))
            .route("/api/normalize", post(Self::normalize))
            .route("/api/request", post(Self::build_request))
            .route("/api/query", post(Self::query))
            .route("/api/options/:field", post(Self::options))
            .route("/api/variable", post(Self::variable))
            .route("/api/tag-keys", post(Self::tag_keys))
            .route("/api/tag-values", post(Self::tag_values))
            .route("/api/test", get(Self::test))
            .route("/api/editor/plan", post(Self::editor_plan))
            .route("/api/editor/change", post(Self::editor_change))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, upstream = %self.config.opmon_url, "OpMon query service listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn normalize(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<QueryEnvelope>, JsonRejection>,
    ) -> Result<Json<NormalizedQuery>> {
        enforce_api_key(&headers, &state.config)?;
        let envelope = body(payload)?;
        let scope = state.datasource.scope(&envelope.snapshot);
        Ok(Json(state.datasource.normalize_query(&envelope.query, &scope)))
    }

    async fn build_request(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<RequestEnvelope>, JsonRejection>,
    ) -> Result<Json<BackendRequest>> {
        enforce_api_key(&headers, &state.config)?;
        let envelope = body(payload)?;
        let scope = state.datasource.scope(&envelope.snapshot);
        Ok(Json(state.datasource.build_request(&envelope.request, &scope)))
    }

    async fn query(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<RequestEnvelope>, JsonRejection>,
    ) -> Result<Json<QueryResponse>> {
        enforce_api_key(&headers, &state.config)?;
        let envelope = body(payload)?;
        let scope = state.datasource.scope(&envelope.snapshot);
        Ok(Json(state.datasource.query(&envelope.request, &scope).await))
    }

    async fn options(
        State(state): State<AppState>,
        Path(field): Path<String>,
        headers: HeaderMap,
        payload: std::result::Result<Json<QueryEnvelope>, JsonRejection>,
    ) -> Result<Json<Vec<SelectableOption>>> {
        enforce_api_key(&headers, &state.config)?;
        let envelope = body(payload)?;
        let scope = state.datasource.scope(&envelope.snapshot);
        let options = state
            .datasource
            .fetch_field_options_by_name(&field, &envelope.query, &scope)
            .await?;
        Ok(Json(options))
    }

    async fn variable(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<VariableEnvelope>, JsonRejection>,
    ) -> Result<Json<Vec<MetricFindValue>>> {
        enforce_api_key(&headers, &state.config)?;
        let envelope = body(payload)?;
        let scope = state.datasource.scope(&envelope.snapshot);
        let values = state
            .datasource
            .metric_find_query(
                &envelope.variable,
                &envelope.options,
                envelope.kind.as_deref(),
                &scope,
            )
            .await?;
        Ok(Json(values))
    }

    async fn tag_keys(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<Value>, JsonRejection>,
    ) -> Result<Json<Vec<TagKey>>> {
        enforce_api_key(&headers, &state.config)?;
        let options = body(payload)?;
        Ok(Json(state.datasource.tag_keys(&options).await?))
    }

    async fn tag_values(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<Value>, JsonRejection>,
    ) -> Result<Json<Vec<TagValue>>> {
        enforce_api_key(&headers, &state.config)?;
        let options = body(payload)?;
        Ok(Json(state.datasource.tag_values(&options).await?))
    }

    async fn test(
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Result<Json<DataSourceStatus>> {
        enforce_api_key(&headers, &state.config)?;
        Ok(Json(state.datasource.test_datasource().await))
    }

    async fn editor_plan(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<QueryEnvelope>, JsonRejection>,
    ) -> Result<Json<EditorPlan>> {
        enforce_api_key(&headers, &state.config)?;
        let query = body(payload)?.query;
        let mode = query.mode_or_default();

        Ok(Json(EditorPlan {
            editor_mode: query
                .editor_mode
                .unwrap_or(state.config.default_editor_mode),
            query_modes: editor::query_mode_options(),
            object_types: editor::object_type_options(mode),
            group_by: editor::group_by_options(),
            result_formats: editor::result_format_options(),
            visible_fields: editor::visible_fields(&query),
            initial_fetches: editor::initial_fetches(&query),
        }))
    }

    async fn editor_change(
        State(state): State<AppState>,
        headers: HeaderMap,
        payload: std::result::Result<Json<ChangeEnvelope>, JsonRejection>,
    ) -> Result<Json<EditorUpdate>> {
        enforce_api_key(&headers, &state.config)?;
        let envelope = body(payload)?;
        Ok(Json(editor::apply_change(&envelope.query, envelope.change)))
    }
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::InvalidRequest(rejection.body_text()))
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Auth);
        }
    }

    Ok(())
}
