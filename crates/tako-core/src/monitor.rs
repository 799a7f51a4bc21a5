//! Execution monitoring log
//!
//! Records every state change of every stage so a run can be inspected
//! after the fact. Records are mirrored as `tracing` events.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A monitoring log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unique record ID
    pub id: String,

    /// Timestamp (Unix ms)
    pub timestamp: u64,

    pub level: Level,

    /// What was happening (ex: "stage", "workflow")
    pub activity: String,

    /// Stage the record refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    pub state: TaskState,

    pub message: String,

    /// Additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogRecord {
    pub fn new(
        level: Level,
        activity: impl Into<String>,
        state: TaskState,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_record_id(),
            timestamp: current_timestamp(),
            level,
            activity: activity.into(),
            stage: None,
            state,
            message: message.into(),
            context: None,
        }
    }

    /// Set the stage
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Add context
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Start,
    Done,
    Failed,
    Skipped,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TaskState::Start => write!(f, "start"),
            TaskState::Done => write!(f, "done"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Skipped => write!(f, "skipped"),
        }
    }
}

/// Bounded collector of monitoring records
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLog {
    records: Vec<LogRecord>,
    #[serde(skip)]
    max_records: usize,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            max_records: 10000,
        }
    }

    /// Create with a custom max size
    pub fn with_max_records(max: usize) -> Self {
        Self {
            records: Vec::new(),
            max_records: max,
        }
    }

    /// Log a record
    pub fn log(&mut self, record: LogRecord) {
        emit(&record);
        self.records.push(record);

        if self.records.len() > self.max_records {
            let drain_count = self.records.len() - self.max_records;
            self.records.drain(0..drain_count);
        }
    }

    /// Log a stage state change
    pub fn stage(
        &mut self,
        level: Level,
        stage: &str,
        state: TaskState,
        message: impl Into<String>,
    ) {
        self.log(LogRecord::new(level, "stage", state, message).with_stage(stage));
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Records of one activity
    pub fn find(&self, activity: &str) -> Vec<&LogRecord> {
        self.records
            .iter()
            .filter(|r| r.activity == activity)
            .collect()
    }

    pub fn for_stage(&self, stage: &str) -> Vec<&LogRecord> {
        self.records
            .iter()
            .filter(|r| r.stage.as_deref() == Some(stage))
            .collect()
    }

    /// Latest state of a stage
    pub fn check(&self, stage: &str) -> Option<TaskState> {
        self.records
            .iter()
            .rev()
            .find(|r| r.stage.as_deref() == Some(stage))
            .map(|r| r.state)
    }

    pub fn failed(&self) -> Vec<&LogRecord> {
        self.records
            .iter()
            .filter(|r| r.state == TaskState::Failed)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.records)
    }

    /// Export to JSON Lines
    pub fn to_jsonl(&self) -> String {
        self.records
            .iter()
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self) -> LogStats {
        let count = |state: TaskState| {
            self.records
                .iter()
                .filter(|r| r.stage.is_some() && r.state == state)
                .count()
        };
        let started = count(TaskState::Start);
        let done = count(TaskState::Done);
        let failed = count(TaskState::Failed);
        let skipped = count(TaskState::Skipped);

        LogStats {
            total: self.records.len(),
            started,
            done,
            failed,
            skipped,
            failure_rate: if started > 0 {
                failed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about stage records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub total: usize,
    pub started: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failure_rate: f64,
}

fn emit(record: &LogRecord) {
    let stage = record.stage.as_deref().unwrap_or("-");
    match record.level {
        Level::Error => tracing::error!(
            activity = %record.activity,
            stage,
            state = %record.state,
            "{}",
            record.message
        ),
        Level::Warn => tracing::warn!(
            activity = %record.activity,
            stage,
            state = %record.state,
            "{}",
            record.message
        ),
        Level::Info => tracing::info!(
            activity = %record.activity,
            stage,
            state = %record.state,
            "{}",
            record.message
        ),
        Level::Debug => tracing::debug!(
            activity = %record.activity,
            stage,
            state = %record.state,
            "{}",
            record.message
        ),
        Level::Trace => tracing::trace!(
            activity = %record.activity,
            stage,
            state = %record.state,
            "{}",
            record.message
        ),
    }
}

fn generate_record_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = current_timestamp();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("rec_{:x}_{:04x}", timestamp, counter % 0xFFFF)
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
