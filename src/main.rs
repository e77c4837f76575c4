mod bulk;
mod config;
mod error;
mod fanout;
mod http;
mod llm;
mod metrics;
mod models;
mod orchestrator;
mod store;
#[cfg(test)]
mod testing;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use bulk::{BatchReport, BulkError, BulkPipeline, BulkTaskItem, ImportRow, PageView};
use config::{HttpConfig, ProviderConfig, ServerConfig, StorageConfig};
use error::{GenerationError, GenerationErrorKind};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, CredentialStatus, Credentials, GenerationResult, ImageUpload, ProductInput};
use once_cell::sync::Lazy;
use orchestrator::{ContentGenerator, Orchestrator};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::{net::SocketAddr, sync::Arc};
use store::{CredentialStore, KvStore, LibraryItem, LibraryStore, StoreError};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

static OPENAPI: Lazy<Value> = Lazy::new(|| {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
});

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "vibe.api", "workbench crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let server = ServerConfig::from_env();
    let kv = store::open(&StorageConfig::from_env())?;
    let generator: Arc<dyn ContentGenerator> = Arc::new(Orchestrator::new(
        http::build_client(&HttpConfig::from_env())?,
        ProviderConfig::from_env(),
    ));
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    let app = build_router(
        AppState::new(generator, kv, prometheus_handle),
        server.body_limit,
    );

    let addr = SocketAddr::new(server.bind_addr, server.port);
    info!(target = "vibe.api", "listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    generator: Arc<dyn ContentGenerator>,
    credentials: CredentialStore,
    library: LibraryStore,
    bulk: BulkPipeline,
    prometheus_handle: PrometheusHandle,
}

impl AppState {
    fn new(
        generator: Arc<dyn ContentGenerator>,
        kv: Arc<dyn KvStore>,
        prometheus_handle: PrometheusHandle,
    ) -> Self {
        Self {
            bulk: BulkPipeline::new(generator.clone()),
            credentials: CredentialStore::new(kv.clone()),
            library: LibraryStore::new(kv),
            generator,
            prometheus_handle,
        }
    }
}

fn build_router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let bulk = Router::new()
        .route("/", get(bulk_view))
        .route("/import", post(bulk_import))
        .route("/page", post(bulk_change_page))
        .route("/generate-page", post(bulk_generate_page))
        .route("/tasks/{id}", get(bulk_task))
        .route(
            "/tasks/{id}/image",
            put(bulk_attach_image).delete(bulk_remove_image),
        )
        .route("/tasks/{id}/mock-image", post(bulk_attach_mock_image))
        .route("/tasks/{id}/generate", post(bulk_generate_one));

    let library = Router::new()
        .route("/", get(library_list).post(library_save))
        .route("/{id}", get(library_get).delete(library_delete))
        .route("/{id}/reuse", get(library_reuse));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route(
            "/settings/credentials",
            get(credentials_status)
                .put(credentials_save)
                .delete(credentials_clear),
        )
        .route("/generate", post(generate))
        .nest("/bulk", bulk)
        .nest("/library", library)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

/// Liveness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "vibe-workbench",
    }))
}

async fn openapi_json() -> Json<Value> {
    Json(OPENAPI.clone())
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Which provider keys are configured. Never returns the keys themselves.
async fn credentials_status(
    State(state): State<AppState>,
) -> Result<Json<CredentialStatus>, AppError> {
    crate::metrics::inc_requests("/settings/credentials");
    Ok(Json(state.credentials.load().await?.status()))
}

async fn credentials_save(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<CredentialStatus>, AppError> {
    crate::metrics::inc_requests("/settings/credentials");
    state.credentials.save(&credentials).await?;
    Ok(Json(credentials.status()))
}

async fn credentials_clear(
    State(state): State<AppState>,
) -> Result<Json<CredentialStatus>, AppError> {
    crate::metrics::inc_requests("/settings/credentials");
    state.credentials.clear().await?;
    Ok(Json(Credentials::default().status()))
}

/// Generate copy and images for one product.
///
/// - Method: `POST`
/// - Path: `/generate`
/// - Body: `ProductInput`
/// - Response: `GenerationResult`; keys come from the credential store
async fn generate(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<Json<GenerationResult>, AppError> {
    crate::metrics::inc_requests("/generate");
    input.validate()?;
    let credentials = state.credentials.load().await?;
    let result = state.generator.generate_with(input, &credentials).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    rows: Vec<Map<String, Value>>,
}

/// Replace the bulk task set with parsed spreadsheet rows.
///
/// - Method: `POST`
/// - Path: `/bulk/import`
/// - Body: `{ "rows": [ { "<header>": <cell>, ... } ] }`
/// - Response: first page
async fn bulk_import(
    State(state): State<AppState>,
    Json(payload): Json<ImportRequest>,
) -> Json<PageView> {
    crate::metrics::inc_requests("/bulk/import");
    let rows = payload.rows.iter().map(ImportRow::from_record).collect();
    Json(state.bulk.import(rows))
}

async fn bulk_view(State(state): State<AppState>) -> Json<PageView> {
    crate::metrics::inc_requests("/bulk");
    Json(state.bulk.page_view())
}

#[derive(Debug, Deserialize)]
struct PageRequest {
    page: usize,
}

async fn bulk_change_page(
    State(state): State<AppState>,
    Json(payload): Json<PageRequest>,
) -> Json<PageView> {
    crate::metrics::inc_requests("/bulk/page");
    Json(state.bulk.change_page(payload.page))
}

async fn bulk_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BulkTaskItem>, AppError> {
    crate::metrics::inc_requests("/bulk/tasks");
    state
        .bulk
        .task(&id)
        .map(Json)
        .ok_or(AppError::Bulk(BulkError::UnknownTask(id)))
}

async fn bulk_attach_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upload): Json<ImageUpload>,
) -> Result<Json<BulkTaskItem>, AppError> {
    crate::metrics::inc_requests("/bulk/tasks/image");
    Ok(Json(state.bulk.attach_image(&id, Some(upload))?))
}

async fn bulk_remove_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BulkTaskItem>, AppError> {
    crate::metrics::inc_requests("/bulk/tasks/image");
    Ok(Json(state.bulk.attach_image(&id, None)?))
}

async fn bulk_attach_mock_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BulkTaskItem>, AppError> {
    crate::metrics::inc_requests("/bulk/tasks/mock-image");
    Ok(Json(state.bulk.attach_mock_image(&id)?))
}

async fn bulk_generate_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BulkTaskItem>, AppError> {
    crate::metrics::inc_requests("/bulk/tasks/generate");
    let credentials = state.credentials.load().await?;
    Ok(Json(state.bulk.generate_one(&id, &credentials).await?))
}

/// Generate every ready task on the current page, one after another.
///
/// - Method: `POST`
/// - Path: `/bulk/generate-page`
/// - Response: `BatchReport`; per-task failures are listed, not raised
async fn bulk_generate_page(
    State(state): State<AppState>,
) -> Result<Json<BatchReport>, AppError> {
    crate::metrics::inc_requests("/bulk/generate-page");
    let credentials = state.credentials.load().await?;
    Ok(Json(state.bulk.generate_all_on_page(&credentials).await?))
}

async fn library_list(State(state): State<AppState>) -> Result<Json<Vec<LibraryItem>>, AppError> {
    crate::metrics::inc_requests("/library");
    Ok(Json(state.library.list().await?))
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    input: ProductInput,
    result: GenerationResult,
}

async fn library_save(
    State(state): State<AppState>,
    Json(payload): Json<SaveRequest>,
) -> Result<(StatusCode, Json<LibraryItem>), AppError> {
    crate::metrics::inc_requests("/library");
    let item = state.library.save(&payload.input, &payload.result).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn library_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LibraryItem>, AppError> {
    crate::metrics::inc_requests("/library/item");
    state
        .library
        .get(&id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound(id))
}

async fn library_reuse(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductInput>, AppError> {
    crate::metrics::inc_requests("/library/reuse");
    state
        .library
        .get(&id)
        .await?
        .map(|item| Json(item.reuse_input()))
        .ok_or(AppError::NotFound(id))
}

async fn library_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/library/item");
    if state.library.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(id))
    }
}

#[derive(Debug)]
enum AppError {
    Generation(GenerationError),
    Bulk(BulkError),
    Store(StoreError),
    NotFound(String),
}

impl From<GenerationError> for AppError {
    fn from(value: GenerationError) -> Self {
        Self::Generation(value)
    }
}

impl From<BulkError> for AppError {
    fn from(value: BulkError) -> Self {
        Self::Bulk(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

fn generation_status(kind: GenerationErrorKind) -> StatusCode {
    match kind {
        GenerationErrorKind::Validation => StatusCode::BAD_REQUEST,
        GenerationErrorKind::Remote | GenerationErrorKind::MalformedResponse => {
            StatusCode::BAD_GATEWAY
        }
        GenerationErrorKind::Transport => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            AppError::Generation(err) => {
                warn!(
                    target = "vibe.api",
                    stage = err.stage(),
                    upstream_status = ?err.status(),
                    detail = err.detail(),
                    "generation request failed"
                );
                (
                    generation_status(err.kind()),
                    err.kind().to_string(),
                    err.to_string(),
                )
            }
            AppError::Bulk(err) => {
                let (status, error) = match (&err, err.generation_kind()) {
                    (_, Some(kind)) => (generation_status(kind), kind.to_string()),
                    (BulkError::UnknownTask(_), None) => {
                        (StatusCode::NOT_FOUND, "not_found".to_string())
                    }
                    (_, None) => (StatusCode::CONFLICT, "task_not_ready".to_string()),
                };
                if let Some(task_status) = err.task_status() {
                    info!(target = "vibe.api", task_status = %task_status, error = %err, "bulk request rejected");
                }
                (status, error, err.to_string())
            }
            AppError::Store(err) => {
                warn!(target = "vibe.api", error = %err, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error".to_string(),
                    err.to_string(),
                )
            }
            AppError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found".to_string(),
                format!("no entry with id `{id}`"),
            ),
        };
        let payload = ApiError {
            error,
            detail: Some(detail),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
