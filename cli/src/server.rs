use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use catlog_core::aggregate::DEFAULT_TREND_POINTS;
use catlog_core::backup::{BackupError, ImportSummary, backup_file_name};
use catlog_core::chat::{ChatBridge, ChatMessage};
use catlog_core::models::{
    Dashboard, DailyIntake, LogEntry, NewLogEntry, ReadingPoint, Settings, SettingsPatch,
    StatusLevel, parse_category,
};
use catlog_core::service::CareService;

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

type SharedChat = Arc<tokio::sync::Mutex<ChatBridge>>;

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<CareService>>,
    /// `None` when no chat API key is configured.
    chat: Option<SharedChat>,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, CareService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn chat(&self) -> Result<&SharedChat, ApiError> {
        self.chat.as_ref().ok_or_else(|| {
            ApiError::Unavailable("Chat is not configured. Set GEMINI_API_KEY".to_string())
        })
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ListEntriesQuery {
    category: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    alerts: bool,
}

#[derive(Deserialize)]
struct CreateEntryRequest {
    category: String,
    value: f64,
    note: Option<String>,
    timestamp: Option<i64>,
}

#[derive(Deserialize)]
struct TrendQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ChatPostRequest {
    message: String,
}

#[derive(Serialize)]
struct EntryView {
    #[serde(flatten)]
    entry: LogEntry,
    status: StatusLevel,
}

impl EntryView {
    fn new(svc: &CareService, entry: LogEntry) -> Self {
        let status = svc.status_of(entry.category, entry.value);
        Self { entry, status }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::Storage(source) => Self::Internal(source),
            other => Self::BadRequest(format!("Import failed: {other}")),
        }
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Entry handlers ---

async fn list_entries(
    State(state): State<AppState>,
    Query(params): Query<ListEntriesQuery>,
) -> Result<Json<Vec<EntryView>>, ApiError> {
    let category = params
        .category
        .as_deref()
        .map(parse_category)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let svc = state.service();
    let source: Vec<&LogEntry> = if params.alerts {
        svc.alerts()
    } else {
        svc.entries().iter().collect()
    };
    let views = source
        .into_iter()
        .filter(|e| category.is_none_or(|c| e.category == c))
        .take(params.limit.unwrap_or(usize::MAX))
        .map(|e| EntryView::new(&svc, e.clone()))
        .collect();
    Ok(Json(views))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<EntryView>), ApiError> {
    let category =
        parse_category(&req.category).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    if !req.value.is_finite() {
        return Err(ApiError::BadRequest("value must be a number".to_string()));
    }

    let mut svc = state.service();
    let entry = svc.add_entry(NewLogEntry {
        category,
        value: req.value,
        timestamp: req.timestamp,
        note: req.note,
    })?;
    Ok((StatusCode::CREATED, Json(EntryView::new(&svc, entry))))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut svc = state.service();
    if svc.remove_entry(&id)? {
        tracing::info!(id = %id, "entry deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Entry {id} not found")))
    }
}

// --- Settings handlers ---

async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(*state.service().settings())
}

async fn patch_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    patch
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let settings = state.service().patch_settings(&patch)?;
    Ok(Json(settings))
}

// --- Derived views ---

async fn get_dashboard(State(state): State<AppState>) -> Json<Dashboard> {
    Json(state.service().dashboard())
}

async fn get_intake(State(state): State<AppState>) -> Json<Vec<DailyIntake>> {
    Json(state.service().intake_series())
}

async fn get_trend(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<TrendQuery>,
) -> Result<Json<Vec<ReadingPoint>>, ApiError> {
    let category = parse_category(&category).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let limit = params.limit.unwrap_or(DEFAULT_TREND_POINTS);
    if limit == 0 {
        return Err(ApiError::BadRequest(
            "limit must be greater than 0".to_string(),
        ));
    }
    Ok(Json(state.service().trend(category, limit)))
}

// --- Backup handlers ---

async fn export_backup(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.service().export_backup()?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        backup_file_name(Local::now().date_naive())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn import_backup(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ImportSummary>, ApiError> {
    let summary = state.service().import_backup(&body)?;
    Ok(Json(summary))
}

// --- Chat handlers ---

const CHAT_BUSY: &str = "A chat reply is still pending";

async fn get_chat(State(state): State<AppState>) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let mut bridge = state
        .chat()?
        .try_lock()
        .map_err(|_| ApiError::Conflict(CHAT_BUSY.to_string()))?;
    bridge.open();
    Ok(Json(bridge.transcript().to_vec()))
}

async fn post_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatPostRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    // Held for the whole remote call; a second submission gets 409.
    let mut bridge = Arc::clone(state.chat()?)
        .try_lock_owned()
        .map_err(|_| ApiError::Conflict(CHAT_BUSY.to_string()))?;

    let reply = tokio::task::spawn_blocking(move || bridge.send(&message))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("chat task failed: {e}")))?;
    Ok(Json(reply))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/entries", get(list_entries).post(create_entry))
        .route("/api/entries/{id}", delete(delete_entry))
        .route("/api/settings", get(get_settings).patch(patch_settings))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/intake", get(get_intake))
        .route("/api/trend/{category}", get(get_trend))
        .route("/api/export", get(export_backup))
        .route("/api/import", post(import_backup))
        .route("/api/chat", get(get_chat).post(post_chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// First and last four characters of a key, for startup output.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

// --- Server startup ---

pub async fn start_server(
    service: CareService,
    chat: Option<ChatBridge>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let chat_enabled = chat.is_some();
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        chat: chat.map(|bridge| Arc::new(tokio::sync::Mutex::new(bridge))),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        if new_api_key {
            eprintln!("Generated new API key: {key}");
            eprintln!("Include in requests: Authorization: Bearer {key}");
        } else {
            eprintln!(
                "API key: {} (see api_key file in data directory)",
                mask_key(key)
            );
        }
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    if !chat_enabled {
        tracing::info!("chat disabled; set GEMINI_API_KEY to enable /api/chat");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!(%bind, port, "server started");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use catlog_core::chat::{ChatProvider, ChatRequest, ChatRole, ERROR_REPLY, GREETING};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct EchoProvider;

    impl ChatProvider for EchoProvider {
        fn generate(&self, request: &ChatRequest<'_>) -> anyhow::Result<Option<String>> {
            Ok(Some(format!("echo: {}", request.message)))
        }
    }

    struct FailingProvider;

    impl ChatProvider for FailingProvider {
        fn generate(&self, _request: &ChatRequest<'_>) -> anyhow::Result<Option<String>> {
            anyhow::bail!("connection refused")
        }
    }

    fn test_state(api_key: Option<String>, chat: Option<ChatBridge>) -> AppState {
        AppState {
            service: Arc::new(Mutex::new(CareService::new_in_memory().unwrap())),
            chat: chat.map(|bridge| Arc::new(tokio::sync::Mutex::new(bridge))),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key, None))
    }

    fn chat_state(provider: impl ChatProvider + 'static) -> AppState {
        test_state(None, Some(ChatBridge::new(Box::new(provider))))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    // --- Auth and middleware ---

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app.oneshot(get("/api/settings")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/settings")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/settings")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_auth_mode_allows_requests() {
        let response = test_app(None).oneshot(get("/api/settings")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let response = test_app(None).oneshot(get("/api/dashboard")).await.unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let response = test_app(Some("secret".to_string()))
            .oneshot(get("/api/entries"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let big_body = vec![b' '; BODY_LIMIT + 1];
        let response = test_app(None)
            .oneshot(
                axum::http::Request::post("/api/import")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/catlog.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn mask_key_hides_middle() {
        assert_eq!(mask_key("0123456789abcdef"), "0123...cdef");
        assert_eq!(mask_key("short"), "****");
    }

    // --- Entries ---

    #[tokio::test]
    async fn create_then_list_entries() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/entries",
                &serde_json::json!({ "category": "glucose", "value": 65, "timestamp": 1_000 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["unit"], "mg/dL");
        assert_eq!(created["status"], "low");

        app.clone()
            .oneshot(post_json(
                "/api/entries",
                &serde_json::json!({ "category": "feeding", "value": 30, "timestamp": 2_000, "note": "罐罐" }),
            ))
            .await
            .unwrap();

        let json = body_json(app.clone().oneshot(get("/api/entries")).await.unwrap()).await;
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["category"], "feeding");
        assert_eq!(list[1]["category"], "glucose");

        let json = body_json(
            app.clone()
                .oneshot(get("/api/entries?alerts=true"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let json = body_json(
            app.oneshot(get("/api/entries?category=feeding&limit=5"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json[0]["note"], "罐罐");
    }

    #[tokio::test]
    async fn create_entry_rejects_unknown_category() {
        let response = test_app(None)
            .oneshot(post_json(
                "/api/entries",
                &serde_json::json!({ "category": "weight", "value": 4.2 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_entry_missing_value_is_client_error() {
        let response = test_app(None)
            .oneshot(post_json(
                "/api/entries",
                &serde_json::json!({ "category": "glucose" }),
            ))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn delete_entry_then_404() {
        let state = test_state(None, None);
        let id = {
            let mut svc = state.service();
            svc.add_entry(NewLogEntry {
                category: catlog_core::models::Category::Saline,
                value: 100.0,
                timestamp: None,
                note: None,
            })
            .unwrap()
            .id
        };
        let app = build_router(state);
        let uri = format!("/api/entries/{id}");

        let response = app
            .clone()
            .oneshot(axum::http::Request::delete(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(axum::http::Request::delete(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // --- Settings and views ---

    #[tokio::test]
    async fn patch_settings_is_partial() {
        let app = test_app(None);
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::patch("/api/settings")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"glucoseHigh": 300}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(app.oneshot(get("/api/settings")).await.unwrap()).await;
        assert_eq!(json["glucoseHigh"], 300.0);
        assert_eq!(json["glucoseLow"], 70.0);
    }

    #[tokio::test]
    async fn patch_settings_rejects_empty_and_negative() {
        let app = test_app(None);
        for body in ["{}", r#"{"ketoneDanger": -1}"#] {
            let response = app
                .clone()
                .oneshot(
                    axum::http::Request::patch("/api/settings")
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn dashboard_has_card_per_category() {
        let json = body_json(test_app(None).oneshot(get("/api/dashboard")).await.unwrap()).await;
        assert_eq!(json["cards"].as_array().unwrap().len(), 5);
        assert_eq!(json["alerts"], 0);
        assert!(json["generatedAt"].is_string());
        assert_eq!(json["cards"][0]["todayTotal"], 0.0);
        assert!(json["cards"][0].get("today_total").is_none());
    }

    #[tokio::test]
    async fn trend_returns_oldest_first() {
        let state = test_state(None, None);
        {
            let mut svc = state.service();
            for (ts, value) in [(1_000, 0.4), (2_000, 0.9), (3_000, 1.7)] {
                svc.add_entry_at(
                    NewLogEntry {
                        category: catlog_core::models::Category::Ketone,
                        value,
                        timestamp: Some(ts),
                        note: None,
                    },
                    ts,
                )
                .unwrap();
            }
        }
        let app = build_router(state);

        let json = body_json(
            app.clone()
                .oneshot(get("/api/trend/ketone?limit=2"))
                .await
                .unwrap(),
        )
        .await;
        let points = json.as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0]["timestamp"], 2_000);
        assert_eq!(points[1]["timestamp"], 3_000);

        let response = app.oneshot(get("/api/trend/weight")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn intake_is_empty_without_entries() {
        let json = body_json(test_app(None).oneshot(get("/api/intake")).await.unwrap()).await;
        assert!(json.as_array().unwrap().is_empty());
    }

    // --- Backup ---

    #[tokio::test]
    async fn export_sets_attachment_header() {
        let response = test_app(None).oneshot(get("/api/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"cat-health-backup-"));
        assert!(disposition.ends_with(".json\""));

        let json = body_json(response).await;
        assert!(json["logs"].is_array());
        assert_eq!(json["settings"]["ketoneDanger"], 1.5);
    }

    #[tokio::test]
    async fn import_replaces_state() {
        let app = test_app(None);
        let backup = serde_json::json!({
            "logs": [
                { "id": "1", "timestamp": 1_000, "category": "glucose", "value": 120, "unit": "mg/dL", "note": "" },
                { "id": "2", "timestamp": 2_000, "category": "ketone", "value": 0.3, "unit": "mmol/L", "note": "" }
            ],
            "settings": { "glucoseLow": 80 }
        });

        let response = app
            .clone()
            .oneshot(post_json("/api/import", &backup))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = body_json(response).await;
        assert_eq!(summary["entriesImported"], 2);
        assert_eq!(summary["settingsImported"], true);

        let json = body_json(app.oneshot(get("/api/entries")).await.unwrap()).await;
        assert_eq!(json[0]["id"], "2");
    }

    #[tokio::test]
    async fn import_invalid_json_returns_400_and_keeps_state() {
        let state = test_state(None, None);
        {
            let mut svc = state.service();
            svc.add_entry(NewLogEntry {
                category: catlog_core::models::Category::Meds,
                value: 0.5,
                timestamp: None,
                note: None,
            })
            .unwrap();
        }
        let app = build_router(state.clone());

        let response = app
            .oneshot(
                axum::http::Request::post("/api/import")
                    .body(Body::from("{\"logs\": [oops"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("Import failed"));

        assert_eq!(state.service().entries().len(), 1);
    }

    // --- Chat ---

    #[tokio::test]
    async fn chat_unconfigured_returns_503() {
        let app = test_app(None);
        let response = app.clone().oneshot(get("/api/chat")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .oneshot(post_json("/api/chat", &serde_json::json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn chat_get_opens_session_with_greeting() {
        let app = build_router(chat_state(EchoProvider));
        let json = body_json(app.oneshot(get("/api/chat")).await.unwrap()).await;
        let transcript = json.as_array().unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0]["role"], "model");
        assert_eq!(transcript[0]["text"], GREETING);
    }

    #[tokio::test]
    async fn chat_post_returns_reply_and_records_transcript() {
        let app = build_router(chat_state(EchoProvider));
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/chat",
                &serde_json::json!({ "message": "今天血酮 0.8" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = body_json(response).await;
        assert_eq!(reply["role"], "model");
        assert_eq!(reply["text"], "echo: 今天血酮 0.8");

        let json = body_json(app.oneshot(get("/api/chat")).await.unwrap()).await;
        let roles: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["model", "user", "model"]);
    }

    #[tokio::test]
    async fn chat_failure_returns_fixed_reply() {
        let app = build_router(chat_state(FailingProvider));
        let response = app
            .oneshot(post_json("/api/chat", &serde_json::json!({ "message": "hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply: ChatMessage = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(reply.role, ChatRole::Model);
        assert_eq!(reply.text, ERROR_REPLY);
    }

    #[tokio::test]
    async fn chat_busy_returns_409() {
        let state = chat_state(EchoProvider);
        let _in_flight = Arc::clone(state.chat.as_ref().unwrap())
            .try_lock_owned()
            .unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(post_json("/api/chat", &serde_json::json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn chat_rejects_blank_message() {
        let app = build_router(chat_state(EchoProvider));
        let response = app
            .oneshot(post_json("/api/chat", &serde_json::json!({ "message": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
