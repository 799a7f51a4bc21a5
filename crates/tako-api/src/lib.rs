//! TAKO API /v1: HTTP front-end for the head
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tako_core::{LogRecord, RunReport};
use tako_head::{Head, Submission};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Finished runs kept for `GET /v1/runs/{id}`
pub const MAX_STORED_RUNS: usize = 1000;

pub struct AppState {
    pub head: Head,
    pub runs: RwLock<RunStore>,
    pub metrics: metrics::Metrics,
}

impl AppState {
    pub fn new(head: Head) -> Result<Self, prometheus::Error> {
        Ok(Self {
            head,
            runs: RwLock::new(RunStore::default()),
            metrics: metrics::Metrics::new()?,
        })
    }
}

/// Stored outcome of one submission
#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub run_id: String,
    pub workflow: String,
    pub submitted_at: DateTime<Utc>,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub log: Vec<LogRecord>,
}

impl From<Submission> for RunEntry {
    fn from(submission: Submission) -> Self {
        let (report, error) = match submission.outcome {
            Ok(report) => (Some(report), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self {
            run_id: submission.run_id,
            workflow: submission.workflow,
            submitted_at: Utc::now(),
            succeeded: error.is_none(),
            report,
            error,
            log: submission.log.records().to_vec(),
        }
    }
}

/// Oldest runs are evicted past `MAX_STORED_RUNS`
#[derive(Default)]
pub struct RunStore {
    order: VecDeque<String>,
    runs: HashMap<String, RunEntry>,
}

impl RunStore {
    pub fn insert(&mut self, entry: RunEntry) {
        if self.order.len() >= MAX_STORED_RUNS {
            if let Some(oldest) = self.order.pop_front() {
                self.runs.remove(&oldest);
            }
        }
        self.order.push_back(entry.run_id.clone());
        self.runs.insert(entry.run_id.clone(), entry);
    }

    pub fn get(&self, run_id: &str) -> Option<&RunEntry> {
        self.runs.get(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/workflows", post(handlers::submit))
        .route("/v1/workflows/plan", post(handlers::plan))
        .route("/v1/runs/{id}", get(handlers::get_run))
        .route("/v1/arms", get(handlers::list_arms))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn(middleware::version_header))
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("TAKO API listening on {}", addr);
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(run_id: &str) -> RunEntry {
        RunEntry {
            run_id: run_id.to_string(),
            workflow: "w".to_string(),
            submitted_at: Utc::now(),
            succeeded: true,
            report: None,
            error: None,
            log: Vec::new(),
        }
    }

    #[test]
    fn test_store_evicts_oldest() {
        let mut store = RunStore::default();
        for i in 0..=MAX_STORED_RUNS {
            store.insert(entry(&format!("run-{}", i)));
        }
        assert_eq!(store.len(), MAX_STORED_RUNS);
        assert!(store.get("run-0").is_none());
        assert!(store.get(&format!("run-{}", MAX_STORED_RUNS)).is_some());
    }
}
