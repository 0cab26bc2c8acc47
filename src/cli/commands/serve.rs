//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for ingesting transcripts, retrieval and
//! question answering.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::{ErrorKind, HearsayError};
use crate::orchestrator::{AskRequest, Orchestrator};
use crate::retrieval::SearchOptions;
use crate::store::DocumentMetadata;
use crate::transcript::{Transcript, TranscriptSegment};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info_span, Instrument};

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let app = router(Arc::new(AppState { orchestrator }));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Hearsay API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Ask", "POST   /ask");
    Output::kv("Search", "POST   /search");
    Output::kv("List Documents", "GET    /documents");
    Output::kv("Ingest", "POST   /documents");
    Output::kv("Delete", "DELETE /documents/{document_id}");
    Output::kv("Quality", "GET    /documents/{document_id}/quality");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .route("/search", post(search))
        .route("/documents", get(list_documents).post(ingest))
        .route("/documents/{document_id}", delete(delete_document))
        .route("/documents/{document_id}/quality", get(quality))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    document_id: String,
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    min_rank: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest {
    document_id: String,
    /// Plain transcript text; ignored when `segments` is present.
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    segments: Option<Vec<TranscriptSegment>>,
    #[serde(flatten)]
    metadata: DocumentMetadata,
    /// Force re-processing even if already indexed
    #[serde(default)]
    force: bool,
}

impl IngestRequest {
    fn transcript(&self) -> Result<Transcript, HearsayError> {
        match (&self.segments, &self.text) {
            (Some(segments), _) => Ok(Transcript::new(&self.document_id, segments.clone())),
            (None, Some(text)) => Ok(Transcript::from_text(&self.document_id, text)),
            (None, None) => Err(HearsayError::Validation(
                "either text or segments is required".to_string(),
            )),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    document_id: String,
    chunks_removed: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    kind: ErrorKind,
    error: String,
}

/// HTTP status for an error class.
fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientContext => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: HearsayError) -> Response {
    let kind = e.kind();
    (
        status_for(kind),
        Json(ErrorResponse {
            kind,
            error: e.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "cache": state.orchestrator.cache_stats(),
    }))
}

async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Response {
    let span = info_span!("ask", request_id = %uuid::Uuid::new_v4());
    match state.orchestrator.ask(&req).instrument(span).await {
        Ok(response) => Json(response).into_response(),
        Err(failure) => (status_for(failure.kind), Json(failure)).into_response(),
    }
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Response {
    let defaults = &state.orchestrator.settings().retrieval;
    let options = SearchOptions {
        limit: req.limit.unwrap_or(defaults.limit),
        min_rank: req.min_rank.unwrap_or(defaults.min_rank),
    };

    match state
        .orchestrator
        .search(&req.document_id, &req.query, Some(options))
        .await
    {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_documents(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.list_documents().await {
        Ok(documents) => Json(serde_json::json!({
            "total": documents.len(),
            "documents": documents,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn ingest(State(state): State<Arc<AppState>>, Json(req): Json<IngestRequest>) -> Response {
    let transcript = match req.transcript() {
        Ok(transcript) => transcript,
        Err(e) => return error_response(e),
    };

    match state
        .orchestrator
        .process_document(&req.document_id, &transcript, req.metadata.clone(), req.force)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Response {
    match state.orchestrator.delete_document(&document_id).await {
        Ok(chunks_removed) => Json(DeleteResponse {
            document_id,
            chunks_removed,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn quality(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Response {
    match state.orchestrator.quality(&document_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorKind::InsufficientContext),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_ingest_request_prefers_segments() {
        let req: IngestRequest = serde_json::from_str(
            r#"{
                "documentId": "ep-1",
                "title": "Pilot",
                "channelOrShowTitle": "The Show",
                "text": "ignored",
                "segments": [{"text": "Hello there.", "start": 0.0, "duration": 2.0}]
            }"#,
        )
        .unwrap();

        assert_eq!(req.metadata.title.as_deref(), Some("Pilot"));
        assert_eq!(req.metadata.channel_or_show_title.as_deref(), Some("The Show"));
        let transcript = req.transcript().unwrap();
        assert_eq!(transcript.full_text, "Hello there.");
        assert!(!req.force);
    }

    #[test]
    fn test_ingest_request_without_content_is_rejected() {
        let req: IngestRequest = serde_json::from_str(r#"{"documentId": "ep-1"}"#).unwrap();
        assert!(matches!(req.transcript(), Err(HearsayError::Validation(_))));
    }
}
