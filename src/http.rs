// src/http.rs
// Thin submission boundary over the dispatcher

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::{AnswerPayload, recommend_visualization};
use crate::connector::QueryResult;
use crate::dispatch::ResultRecord;
use crate::error::{CoreError, ErrorKind};
use crate::metrics;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/query", post(submit_query))
        .route("/api/result/{job_id}", get(poll_result))
        .route("/api/cancel/{job_id}", post(cancel_job))
        .route("/api/visualization", post(visualization))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    job_id: String,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct PollResponse {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<AnswerPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

fn error_response(err: CoreError) -> Response {
    let status = match err.kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Overloaded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::UnknownJob => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = ErrorBody {
        kind: err.kind,
        message: err.kind.user_message(),
        detail: Some(err.message),
    };

    (status, Json(body)).into_response()
}

/// POST /api/query - enqueue a question, reply immediately with the job id
async fn submit_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    match state
        .dispatcher
        .submit(&request.question, request.session_id)
        .await
    {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(QueryResponse { job_id })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/result/{job_id} - current record, readable while running
async fn poll_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let record = match state.dispatcher.poll(&job_id).await {
        Ok(record) => record,
        Err(e) => return error_response(e),
    };

    let response = match record {
        ResultRecord::Queued { .. } => PollResponse {
            state: "queued",
            payload: None,
            error: None,
        },
        ResultRecord::Running { .. } => PollResponse {
            state: "running",
            payload: None,
            error: None,
        },
        ResultRecord::Succeeded { payload, .. } => PollResponse {
            state: "succeeded",
            payload: Some(payload),
            error: None,
        },
        ResultRecord::Failed { kind, message, .. } => PollResponse {
            state: "failed",
            payload: None,
            error: Some(ErrorBody {
                kind,
                message: kind.user_message(),
                detail: Some(message),
            }),
        },
        ResultRecord::Cancelled { .. } => PollResponse {
            state: "cancelled",
            payload: None,
            error: None,
        },
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// POST /api/cancel/{job_id} - flag cooperative cancellation
async fn cancel_job(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    match state.dispatcher.cancel(&job_id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct VizRequest {
    question: String,
    sql: String,
    #[serde(default)]
    sample: Option<QueryResult>,
}

/// POST /api/visualization - chart recommendation for a result sample
async fn visualization(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VizRequest>,
) -> Response {
    let sample = request.sample.unwrap_or_else(QueryResult::empty);
    let recommendation = recommend_visualization(
        state.lm.as_ref(),
        &request.question,
        &request.sql,
        &sample.sample(20),
    )
    .await;

    (StatusCode::OK, Json(recommendation)).into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    cache: &'static str,
}

/// GET /health - readiness for load balancers
async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let db_ok = state.connector.healthy().await;
    let cache_ok = state.cache.healthy().await;

    let response = HealthResponse {
        status: if db_ok { "healthy" } else { "unhealthy" },
        database: if db_ok { "ok" } else { "error" },
        // Cache degradation is not fatal: the core runs in all-miss mode
        cache: if cache_ok { "ok" } else { "degraded" },
    };

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response)).into_response()
}
