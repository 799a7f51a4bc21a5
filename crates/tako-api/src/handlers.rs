//! API Handlers
use crate::{AppState, RunEntry};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tako_head::{HeadError, Plan, Workflow, WorkflowFile};

#[derive(Debug, Default, Deserialize)]
pub struct SubmitQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// Relative paths in submitted documents resolve against the work dir
fn resolve(state: &AppState, file: WorkflowFile) -> Result<Workflow, HeadError> {
    file.into_workflow(&state.head.settings().work_dir)
}

fn status_for(err: &HeadError) -> StatusCode {
    match err {
        HeadError::Plan(_) | HeadError::Run(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HeadError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        HeadError::Workflow(_) | HeadError::Arm { .. } | HeadError::Yaml(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

fn error_body(err: &HeadError) -> (StatusCode, Json<Value>) {
    (status_for(err), Json(json!({ "error": err.to_string() })))
}

fn to_body<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

/// Runs to completion before answering
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubmitQuery>,
    Json(file): Json<WorkflowFile>,
) -> (StatusCode, Json<Value>) {
    let workflow = match resolve(&state, file) {
        Ok(workflow) => workflow,
        Err(err) => return error_body(&err),
    };

    let submission = if query.dry_run {
        state.head.dry_run(workflow).await
    } else {
        state.head.submit(workflow).await
    };
    state.metrics.observe(&submission);

    let status = match &submission.outcome {
        Ok(_) => StatusCode::OK,
        Err(err) => status_for(err),
    };
    let entry = RunEntry::from(submission);
    let body = to_body(&entry);
    state.runs.write().await.insert(entry);

    (status, Json(body))
}

pub async fn plan(
    State(state): State<Arc<AppState>>,
    Json(file): Json<WorkflowFile>,
) -> (StatusCode, Json<Value>) {
    match resolve(&state, file).and_then(Plan::build) {
        Ok(plan) => (
            StatusCode::OK,
            Json(json!({ "plan": to_body(&plan.view()), "dot": plan.to_dot() })),
        ),
        Err(err) => error_body(&err),
    }
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.runs.read().await.get(&id) {
        Some(entry) => (
            StatusCode::OK,
            Json(to_body(entry)),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown run '{}'", id) })),
        ),
    }
}

pub async fn list_arms() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "arms": tako_arms::catalog() })))
}

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": tako_core::TAKO_VERSION })),
    )
}

pub async fn metrics(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            err.to_string(),
        ),
    }
}
