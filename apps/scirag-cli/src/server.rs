use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use scirag_answer::{encode, encode_comment, OllamaGenerator, CONTENT_TYPE};
use scirag_core::error::Error;
use scirag_core::types::{Query, QueryMode, ScoredChunk, StreamEvent};

use crate::app::{AppState, ChunkPayload};

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Error body is `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::EmbeddingFailure(_) | Error::GenerationFailure(_) => StatusCode::BAD_GATEWAY,
            Error::DuplicateChunk { .. } => StatusCode::CONFLICT,
            Error::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::DimensionMismatch { .. } | Error::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self { status, detail: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response { (self.status, Json(json!({ "detail": self.detail }))).into_response() }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/query/stream", post(query_stream))
        .route("/chunks/auto", post(insert_auto))
        .route("/chunks/raw", post(insert_raw))
        .with_state(state)
}

async fn health() -> Json<Value> { Json(json!({ "ok": true })) }

/// Validated query for either endpoint; `top_k` falls back to `retrieval.default_top_k`.
fn parse_query(state: &AppState, text: String, mode: QueryMode, top_k: Option<usize>) -> scirag_core::Result<Query> {
    Query::new(text, mode).with_top_k(top_k.unwrap_or(state.settings.retrieval.default_top_k))
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Result<Json<Vec<ScoredChunk>>, ApiError> {
    let query = parse_query(&state, req.query, QueryMode::Search, req.top_k)?;
    Ok(Json(state.retriever.search(&query.text, query.top_k).await?))
}

async fn query_stream(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Result<Response, ApiError> {
    let query = parse_query(&state, req.question, QueryMode::Ask, req.top_k)?;
    tracing::debug!(mode = ?query.mode, top_k = query.top_k, "answering");
    let session = state.answerer.ask(&query.text, query.top_k).await?;
    let heartbeat = Duration::from_secs(state.settings.stream.heartbeat_secs);
    let body = Body::from_stream(event_frames(session.into_stream(), heartbeat));
    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response())
}

async fn insert_auto(State(state): State<Arc<AppState>>, Json(payload): Json<ChunkPayload>) -> Result<Json<Value>, ApiError> {
    let chunk = state.ingestor.insert_auto(payload).await?;
    Ok(Json(json!({ "status": "inserted", "id": chunk.id })))
}

async fn insert_raw(State(state): State<Arc<AppState>>, Json(payload): Json<ChunkPayload>) -> Result<Json<Value>, ApiError> {
    match state.ingestor.insert_raw(payload).await {
        Ok(chunk) => Ok(Json(json!({ "status": "inserted", "id": chunk.id }))),
        // A caller-supplied vector of the wrong width is a bad request, not a server fault.
        Err(err @ Error::DimensionMismatch { .. }) => Err(ApiError { status: StatusCode::BAD_REQUEST, detail: err.to_string() }),
        Err(err) => Err(err.into()),
    }
}

/// Encode answer events as frames, with a comment frame whenever the answer
/// is idle for `heartbeat`. A failed answer ends the body without `Final`.
fn event_frames(
    events: BoxStream<'static, scirag_core::Result<StreamEvent>>,
    heartbeat: Duration,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    stream::unfold(events, move |mut events| async move {
        tokio::select! {
            next = events.next() => match next {
                Some(Ok(event)) => Some((Ok(encode(&event)), events)),
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "answer stream failed; closing without final");
                    None
                }
                None => None,
            },
            () = tokio::time::sleep(heartbeat) => Some((Ok(encode_comment("ping")), events)),
        }
    })
}

/// Best-effort request that makes the model server load the model.
pub async fn warmup(generator: &OllamaGenerator) {
    match generator.generate("Hello").await {
        Ok(_) => tracing::info!(model = generator.model(), "generation model warmed up"),
        Err(e) => tracing::warn!(model = generator.model(), error = %e, "warmup failed; continuing"),
    }
}

/// Serve on an already-bound listener until the process is stopped.
pub async fn serve_on(listener: tokio::net::TcpListener, state: Arc<AppState>) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "serving");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn serve(state: AppState) -> Result<()> {
    if state.settings.server.warmup {
        let generator = OllamaGenerator::new(&state.settings.generation)?;
        tokio::spawn(async move { warmup(&generator).await });
    }
    let listener = tokio::net::TcpListener::bind(&state.settings.server.bind).await?;
    serve_on(listener, Arc::new(state)).await
}
