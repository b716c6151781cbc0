//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness greeting |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/uploadfile/` | Store a file and ingest it in the background |
//! | `POST` | `/settings/openai_key` | Persist and apply an OpenAI API key |
//! | `POST` | `/ask` | Answer a question from stored project memory |
//! | `GET`  | `/documents` | List every stored document |
//! | `GET`  | `/auth/google` | Redirect to Google's consent screen |
//! | `GET`  | `/auth/google/callback` | Complete the Google OAuth flow |
//!
//! # Error Contract
//!
//! Every non-2xx response carries:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `auth_error` (500), `internal` (500).
//!
//! # CORS
//!
//! Only the origins in `[server].cors_origins` are allowed. Credentials are
//! permitted, and any method or header the browser asks for is mirrored back.

use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::ask::{ask, AskResponse};
use crate::config::Config;
use crate::google_auth::{AuthError, GoogleAuth};
use crate::ingest::{save_upload, spawn_ingestion, stored_name};
use crate::providers::Providers;
use crate::settings::ApiKeyStore;
use crate::store::DocumentStore;
use crate::sync::SyncLoop;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub keys: ApiKeyStore,
    pub providers: Providers,
    pub auth: Arc<GoogleAuth>,
}

impl AppState {
    /// State backed by the OpenAI adapters and a fresh Google session.
    pub fn from_config(config: &Config) -> Result<Self> {
        let keys = ApiKeyStore::from_config(&config.openai);
        let providers = Providers::openai(config, keys.clone())?;
        Ok(Self {
            config: Arc::new(config.clone()),
            keys,
            providers,
            auth: Arc::new(GoogleAuth::new(config.google.clone())),
        })
    }
}

/// Starts the HTTP server and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> Result<()> {
    serve_until(config, shutdown_signal()).await
}

/// Starts the HTTP server and runs until `shutdown` resolves.
///
/// Before binding, the store is migrated and reconciled and any saved
/// Google credential is loaded. The sync loop, if enabled, is stopped after
/// the server has drained.
pub async fn serve_until<F>(config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = DocumentStore::open(config).await?;
    let report = store.reconcile().await?;
    let documents = store.count().await?;
    let vector_search = store.vector_search();
    store.close().await;
    tracing::info!(
        documents,
        vector_search,
        restored = report.restored,
        pruned = report.pruned,
        "document store ready"
    );

    let state = AppState::from_config(config)?;
    match state.auth.load_from_disk().await {
        Ok(Some(_)) => tracing::info!("loaded saved Google credential"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "could not load saved Google credential"),
    }

    let sync = config
        .sync
        .enabled
        .then(|| SyncLoop::start(state.auth.clone(), &config.sync));

    let app = router(state)?;

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("listening on http://{}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Some(sync) = sync {
        sync.stop().await;
    }

    served?;
    Ok(())
}

/// Build the application router.
///
/// Fails when a configured CORS origin is not a valid header value.
pub fn router(state: AppState) -> Result<Router> {
    let cors = cors_layer(&state.config.server.cors_origins)?;
    let upload_limit = state.config.server.max_upload_bytes;

    Ok(Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/uploadfile/", post(handle_upload))
        .route("/settings/openai_key", post(handle_save_key))
        .route("/ask", post(handle_ask))
        .route("/documents", get(handle_documents))
        .route("/auth/google", get(handle_auth_start))
        .route("/auth/google/callback", get(handle_auth_callback))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin: {}", o))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        if err.is_client_error() {
            return bad_request(err.to_string());
        }
        tracing::error!(error = %err, "Google authentication failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "auth_error".to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET / and /health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "Hello": "World" }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /uploadfile/ ============

#[derive(Serialize)]
struct UploadResponse {
    filename: String,
    message: String,
}

/// Handler for `POST /uploadfile/`.
///
/// The bytes are on disk before this returns; analysis, embedding and the
/// database write happen on a detached task.
async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let uploaded = field.file_name().unwrap_or_default().to_string();
        let filename = stored_name(&uploaded)
            .ok_or_else(|| bad_request(format!("invalid filename: {:?}", uploaded)))?;
        let bytes = field.bytes().await.map_err(|e| bad_request(e.body_text()))?;

        save_upload(&state.config, &filename, &bytes)
            .await
            .map_err(internal)?;
        spawn_ingestion(state.config.clone(), state.providers.clone(), filename.clone());

        return Ok(Json(UploadResponse {
            filename,
            message: "File uploaded successfully, processing in background.".to_string(),
        }));
    }

    Err(bad_request("multipart field \"file\" is required"))
}

// ============ POST /settings/openai_key ============

#[derive(Deserialize)]
struct SaveKeyRequest {
    api_key: String,
}

async fn handle_save_key(
    State(state): State<AppState>,
    payload: Result<Json<SaveKeyRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    if req.api_key.trim().is_empty() {
        return Err(bad_request("api_key must not be empty"));
    }

    state.keys.save(&req.api_key).await.map_err(internal)?;
    Ok(Json(serde_json::json!({
        "message": "OpenAI API key saved successfully."
    })))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let response = ask(&state.config, &state.providers, &req.query)
        .await
        .map_err(internal)?;
    Ok(Json(response))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentView {
    id: i64,
    filename: String,
    content: serde_json::Value,
}

async fn handle_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentView>>, AppError> {
    let store = DocumentStore::open(&state.config).await.map_err(internal)?;
    let docs = store.list().await;
    store.close().await;

    let views = docs
        .map_err(internal)?
        .into_iter()
        .map(|d| DocumentView {
            content: d.content_json(),
            id: d.id,
            filename: d.filename,
        })
        .collect();
    Ok(Json(views))
}

// ============ Google OAuth ============

async fn handle_auth_start(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let url = state.auth.authorization_url().await?;
    Ok(Redirect::temporary(&url))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

async fn handle_auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| bad_request("missing authorization code"))?;
    let flow = params.state.unwrap_or_default();

    state.auth.exchange(&code, &flow).await?;
    Ok(Json(serde_json::json!({
        "message": "Google authentication successful! Credentials stored."
    })))
}
