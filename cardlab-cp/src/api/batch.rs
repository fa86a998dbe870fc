//! Batch lifecycle endpoints: start, status, results, stop.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{BatchOutcome, CardPair, ProcessingOptions};
use crate::session::SessionSnapshot;
use crate::AppState;

/// One uploaded card pair; images are base64-encoded.
#[derive(Debug, Deserialize)]
pub struct PairUpload {
    #[serde(default)]
    pub front_image: Option<String>,
    #[serde(default)]
    pub back_image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartBatchRequest {
    pub pairs: Vec<PairUpload>,
    #[serde(default)]
    pub options: ProcessingOptions,
}

#[derive(Debug, Serialize)]
pub struct StartBatchResponse {
    pub session_id: Uuid,
    pub total_pairs: usize,
    pub status: String,
}

/// POST /batch/start
///
/// Accepts the batch, spawns the pipeline in the background and returns 202
/// with the session id immediately. A missing side is not a request error;
/// it becomes a per-pair failure so the rest of the batch still runs.
/// Undecodable base64 is a request error, since nothing useful can be done
/// with it downstream.
pub async fn start_batch(
    State(state): State<AppState>,
    Json(request): Json<StartBatchRequest>,
) -> ApiResult<(StatusCode, Json<StartBatchResponse>)> {
    if request.pairs.is_empty() {
        return Err(ApiError::BadRequest("No card pairs provided".to_string()));
    }

    let mut pairs = Vec::with_capacity(request.pairs.len());
    for (index, upload) in request.pairs.iter().enumerate() {
        let front = decode_upload(upload.front_image.as_deref(), index, "front")?;
        let back = decode_upload(upload.back_image.as_deref(), index, "back")?;
        pairs.push(CardPair::new(front, back));
    }

    let session_id = state.sessions.create().await;
    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(session_id, cancel.clone());

    let total_pairs = pairs.len();
    let orchestrator = state.orchestrator();
    let tokens = state.cancellation_tokens.clone();
    let options = request.options;
    tokio::spawn(async move {
        orchestrator.run_batch(session_id, pairs, options, cancel).await;
        tokens.write().await.remove(&session_id);
    });

    tracing::info!(session_id = %session_id, pairs = total_pairs, "Batch accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(StartBatchResponse {
            session_id,
            total_pairs,
            status: "accepted".to_string(),
        }),
    ))
}

fn decode_upload(
    encoded: Option<&str>,
    index: usize,
    side: &str,
) -> ApiResult<Option<Vec<u8>>> {
    match encoded {
        None => Ok(None),
        Some("") => Ok(None),
        Some(data) => BASE64.decode(data).map(Some).map_err(|_| {
            ApiError::BadRequest(format!(
                "Pair {}: {} image is not valid base64",
                index + 1,
                side
            ))
        }),
    }
}

/// GET /batch/status/:session_id
///
/// Non-destructive progress snapshot.
pub async fn batch_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    state
        .sessions
        .snapshot(session_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No session {}", session_id)))
}

/// GET /batch/results/:session_id
///
/// Returns the final outcome and destroys the session. A second fetch is a
/// 404; fetching before the batch finished is a 409.
pub async fn batch_results(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<BatchOutcome>> {
    let status = state
        .sessions
        .status(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No session {}", session_id)))?;

    if !status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Session {} is still processing",
            session_id
        )));
    }

    state
        .sessions
        .take_outcome(session_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError::Internal(format!("Session {} ended without results", session_id))
        })
}

/// POST /batch/stop/:session_id
///
/// Requests a graceful stop. The pipeline observes the request at its next
/// checkpoint; results for already-processed pairs remain fetchable.
pub async fn stop_batch(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let tokens = state.cancellation_tokens.read().await;
    match tokens.get(&session_id) {
        Some(token) => {
            token.cancel();
            tracing::info!(session_id = %session_id, "Stop requested");
            Ok(Json(json!({ "session_id": session_id, "status": "stopping" })))
        }
        None => Err(ApiError::NotFound(format!(
            "No active batch for session {}",
            session_id
        ))),
    }
}

/// Build batch lifecycle routes
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batch/start", post(start_batch))
        .route("/batch/status/:session_id", get(batch_status))
        .route("/batch/results/:session_id", get(batch_results))
        .route("/batch/stop/:session_id", post(stop_batch))
}
