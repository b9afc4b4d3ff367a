//! HTTP surface of the gateway.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parley_core::Settings;
use parley_engine::{ConversationError, ErrorKind, TurnOutcome};
use parley_voice::AudioClip;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

/// Header carrying the sequence number of the clip returned by the speech endpoint.
pub const CLIP_SEQ_HEADER: &str = "x-parley-clip-seq";
/// Header carrying how many clips are queued behind the one returned.
pub const CLIPS_PENDING_HEADER: &str = "x-parley-clips-pending";

pub fn router(state: AppState) -> Router {
    let audio_limit = state.config.conversation.max_audio_bytes;
    let static_dir = state.config.gateway.static_dir.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/rules", get(get_rules).post(add_rule).put(replace_rules))
        .route("/api/conversation", get(snapshot))
        .route("/api/conversation/start", post(start))
        .route("/api/conversation/reset", post(reset))
        .route("/api/conversation/stop", post(stop_recording))
        .route("/api/conversation/pause", post(pause))
        .route("/api/conversation/resume", post(resume))
        .route(
            "/api/conversation/audio",
            post(submit_audio).layer(DefaultBodyLimit::max(audio_limit)),
        )
        .route("/api/conversation/speech", get(speech))
        .with_state(state);

    if let Some(dir) = static_dir {
        info!(target: "parley::gateway", dir = %dir.display(), "serving static UI");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(cors)
}

/// Error body `{ "error": ... }` with a status derived from the failure kind.
struct ApiError(StatusCode, String);

impl From<ConversationError> for ApiError {
    fn from(e: ConversationError) -> Self {
        let status = match (&e, e.kind()) {
            (ConversationError::ServiceClosed, _) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorKind::Configuration) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = e.status_message().unwrap_or_else(|| e.to_string());
        ApiError(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(target: "parley::gateway", status = %self.0, error = %self.1, "request failed");
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.conversation.settings())
}

async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> ApiResult<Json<Settings>> {
    state.conversation.update_settings(settings).await?;
    Ok(Json(state.conversation.settings()))
}

#[derive(Deserialize)]
struct NewRule {
    rule: String,
}

#[derive(Deserialize)]
struct RuleSet {
    /// One rule per line.
    rules: String,
}

async fn get_rules(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "rules": state.conversation.rules() }))
}

async fn add_rule(
    State(state): State<AppState>,
    Json(body): Json<NewRule>,
) -> ApiResult<Json<serde_json::Value>> {
    let rules = state.conversation.add_rule(body.rule).await?;
    Ok(Json(json!({ "rules": rules })))
}

async fn replace_rules(
    State(state): State<AppState>,
    Json(body): Json<RuleSet>,
) -> ApiResult<Json<serde_json::Value>> {
    let rules = state.conversation.replace_rules(body.rules).await?;
    Ok(Json(json!({ "rules": rules })))
}

async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.conversation.snapshot())
}

async fn start(State(state): State<AppState>) -> ApiResult<Json<TurnOutcome>> {
    Ok(Json(state.conversation.start().await?))
}

async fn reset(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.conversation.reset().await?;
    Ok(Json(state.conversation.snapshot()))
}

async fn stop_recording(State(state): State<AppState>) -> ApiResult<Json<TurnOutcome>> {
    Ok(Json(state.conversation.stop_recording().await?))
}

async fn pause(State(state): State<AppState>) -> ApiResult<Json<TurnOutcome>> {
    Ok(Json(state.conversation.pause().await?))
}

async fn resume(State(state): State<AppState>) -> ApiResult<Json<TurnOutcome>> {
    Ok(Json(state.conversation.resume().await?))
}

async fn submit_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<TurnOutcome>> {
    if body.is_empty() {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "audio body is empty".to_string(),
        ));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("audio/webm");
    debug!(target: "parley::gateway", bytes = body.len(), %content_type, "utterance uploaded");
    let clip = AudioClip::new(body.to_vec(), content_type);
    Ok(Json(state.conversation.submit_audio(clip).await?))
}

#[derive(Deserialize)]
struct SpeechQuery {
    /// Sequence number of the last clip the client played.
    #[serde(default)]
    after: u64,
}

/// Next synthesized clip after `?after=<seq>`. Clients drain the queue by repeating the
/// call with the returned sequence number until it answers `204`.
async fn speech(State(state): State<AppState>, Query(query): Query<SpeechQuery>) -> Response {
    let Some((seq, clip, pending)) = state
        .speech
        .as_ref()
        .and_then(|p| p.clip_after(query.after))
    else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let content_type = HeaderValue::from_str(&clip.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    (
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::HeaderName::from_static(CLIP_SEQ_HEADER),
                HeaderValue::from(seq),
            ),
            (
                header::HeaderName::from_static(CLIPS_PENDING_HEADER),
                HeaderValue::from(pending),
            ),
        ],
        clip.bytes,
    )
        .into_response()
}
