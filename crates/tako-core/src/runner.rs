//! Pipeline Runner: chains stages, fans out parallel groups, records outcomes
use crate::context::ExecutionContext;
use crate::data_model::{RunReport, RunStatus, StageRecord, StageStatus};
use crate::error::TakoError;
use crate::monitor::{ExecutionLog, Level, LogRecord, TaskState};
use crate::stage::{CommandSpec, Stage, StageError, StageIo, Task};
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Stderr kept in failure messages
const STDERR_TAIL_CHARS: usize = 2000;

/// One step of a pipeline
#[derive(Clone)]
pub enum Step {
    Single(Arc<dyn Stage>),
    /// Stages run concurrently; none may consume a sibling's output
    Parallel(Vec<Arc<dyn Stage>>),
}

impl Step {
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        match self {
            Step::Single(stage) => std::slice::from_ref(stage),
            Step::Parallel(stages) => stages,
        }
    }
}

pub struct PipelineRunner {
    steps: Vec<Step>,
    pipeline_id: String,
}

impl PipelineRunner {
    pub fn new(steps: Vec<Step>) -> Self {
        let pipeline_id = steps
            .iter()
            .map(|step| match step {
                Step::Single(stage) => stage.id().to_string(),
                Step::Parallel(stages) => format!(
                    "{{{}}}",
                    stages.iter().map(|s| s.id()).collect::<Vec<_>>().join("|")
                ),
            })
            .collect::<Vec<_>>()
            .join("→");

        Self { steps, pipeline_id }
    }

    /// Plain sequence of stages
    pub fn sequence(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self::new(stages.into_iter().map(Step::Single).collect())
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of stages over all steps
    pub fn len(&self) -> usize {
        self.steps.iter().map(|s| s.stages().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        log: &mut ExecutionLog,
    ) -> Result<RunReport, TakoError> {
        let started_at = Utc::now();
        log.log(
            LogRecord::new(
                Level::Info,
                "workflow",
                TaskState::Start,
                format!("running {} ({})", ctx.workflow, self.pipeline_id),
            )
            .with_context(json!({ "run_id": ctx.run_id, "dry_run": ctx.dry_run })),
        );

        let semaphore = Arc::new(Semaphore::new(ctx.settings.runner.max_parallel));
        let mut records = Vec::with_capacity(self.len());

        for step in &self.steps {
            let result = match step {
                Step::Single(stage) => {
                    run_single(stage.clone(), ctx, log).await.map(|r| vec![r])
                }
                Step::Parallel(stages) => run_group(stages, ctx, &semaphore, log).await,
            };

            match result {
                Ok(step_records) => records.extend(step_records),
                Err(err) => {
                    log.log(
                        LogRecord::new(
                            Level::Error,
                            "workflow",
                            TaskState::Failed,
                            err.to_string(),
                        )
                        .with_context(json!({ "run_id": ctx.run_id })),
                    );
                    return Err(err);
                }
            }
        }

        log.log(
            LogRecord::new(
                Level::Info,
                "workflow",
                if ctx.dry_run { TaskState::Skipped } else { TaskState::Done },
                format!("{} stages finished", records.len()),
            )
            .with_context(json!({ "run_id": ctx.run_id })),
        );

        Ok(RunReport {
            run_id: ctx.run_id.clone(),
            workflow: ctx.workflow.clone(),
            pipeline_id: self.pipeline_id.clone(),
            status: if ctx.dry_run { RunStatus::DryRun } else { RunStatus::Succeeded },
            started_at,
            finished_at: Utc::now(),
            stages: records,
        })
    }
}

async fn run_single(
    stage: Arc<dyn Stage>,
    ctx: &ExecutionContext,
    log: &mut ExecutionLog,
) -> Result<StageRecord, TakoError> {
    log_start(log, stage.as_ref());
    let span = tracing::info_span!("stage", id = %stage.id());
    let outcome = execute_stage(stage.clone(), ctx.clone()).instrument(span).await;
    log_outcome(log, stage.id(), &outcome);
    outcome
}

async fn run_group(
    stages: &[Arc<dyn Stage>],
    ctx: &ExecutionContext,
    semaphore: &Arc<Semaphore>,
    log: &mut ExecutionLog,
) -> Result<Vec<StageRecord>, TakoError> {
    let mut set = JoinSet::new();
    let mut pending = BTreeSet::new();
    let mut task_ids = HashMap::with_capacity(stages.len());

    for (index, stage) in stages.iter().enumerate() {
        log_start(log, stage.as_ref());
        pending.insert(index);

        let stage = stage.clone();
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let span = tracing::info_span!("stage", id = %stage.id());
        let handle = set.spawn(
            async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => execute_stage(stage, ctx).await,
                    Err(_) => Err(failed(stage.id(), StageError::Cancelled)),
                };
                (index, outcome)
            }
            .instrument(span),
        );
        task_ids.insert(handle.id(), index);
    }

    let mut finished: Vec<(usize, StageRecord)> = Vec::with_capacity(stages.len());
    let mut first_error = None;

    while let Some(joined) = set.join_next().await {
        let (index, outcome) = match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => continue,
            Err(join_err) => match task_ids.get(&join_err.id()) {
                Some(&index) => {
                    let message = format!("stage task panicked: {}", join_err);
                    (index, Err(failed(stages[index].id(), StageError::ExecutionFailed(message))))
                }
                None => continue,
            },
        };
        pending.remove(&index);
        log_outcome(log, stages[index].id(), &outcome);

        match outcome {
            Ok(record) => finished.push((index, record)),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                    set.abort_all();
                }
            }
        }
    }

    if let Some(err) = first_error {
        for index in pending {
            log.stage(
                Level::Warn,
                stages[index].id(),
                TaskState::Skipped,
                "cancelled after sibling failure",
            );
        }
        return Err(err);
    }

    finished.sort_by_key(|(index, _)| *index);
    Ok(finished.into_iter().map(|(_, record)| record).collect())
}

fn log_start(log: &mut ExecutionLog, stage: &dyn Stage) {
    log.log(
        LogRecord::new(
            Level::Info,
            "stage",
            TaskState::Start,
            format!("{} [{}]", stage.arm(), stage.algorithm()),
        )
        .with_stage(stage.id())
        .with_context(json!({
            "input": stage.input().path().display().to_string(),
            "output": stage.output().path.display().to_string(),
        })),
    );
}

fn log_outcome(log: &mut ExecutionLog, id: &str, outcome: &Result<StageRecord, TakoError>) {
    match outcome {
        Ok(record) if record.status == StageStatus::Skipped => {
            log.stage(Level::Info, id, TaskState::Skipped, "dry run")
        }
        Ok(record) => log.stage(
            Level::Info,
            id,
            TaskState::Done,
            format!("wrote {} in {}ms", record.output.display(), record.latency_ms),
        ),
        Err(err) => log.stage(Level::Error, id, TaskState::Failed, err.to_string()),
    }
}

fn failed(stage: &str, source: StageError) -> TakoError {
    TakoError::StageFailed {
        stage: stage.to_string(),
        source,
    }
}

async fn execute_stage(
    stage: Arc<dyn Stage>,
    ctx: ExecutionContext,
) -> Result<StageRecord, TakoError> {
    let id = stage.id().to_string();
    let runner = &ctx.settings.runner;
    let io = StageIo {
        input: stage.input().path().to_path_buf(),
        output: stage.output().path,
    };
    let started_at = Utc::now();
    let start = Instant::now();

    // Upstream outputs do not exist yet during a dry run.
    let produced_upstream = stage.input().upstream().is_some();
    if !(ctx.dry_run && produced_upstream) && !path_exists(&io.input).await {
        return Err(failed(&id, StageError::InputMissing(io.input.clone())));
    }

    let task = stage.prepare(&io, &ctx).map_err(|e| failed(&id, e))?;
    let command = task.command_line();

    if ctx.dry_run {
        return Ok(StageRecord {
            id,
            arm: stage.arm().to_string(),
            algorithm: stage.algorithm().to_string(),
            input: io.input,
            output: io.output,
            status: StageStatus::Skipped,
            command,
            exit_code: None,
            output_hash: None,
            deterministic: stage.deterministic(),
            latency_ms: 0,
            started_at,
        });
    }

    if let Some(parent) = io.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            failed(
                &id,
                StageError::ExecutionFailed(format!("cannot create {}: {}", parent.display(), e)),
            )
        })?;
    }

    let exit_code = match task {
        Task::Executable(spec) => {
            let spec = CommandSpec {
                env: ctx.task_env(&id).into_iter().chain(spec.env).collect(),
                ..spec
            };
            run_command(&id, &spec, runner.stage_timeout_secs).await?
        }
        Task::Function(function) => {
            let task_io = io.clone();
            // A blocking thread cannot be cancelled; on timeout it is left to finish.
            let work = tokio::task::spawn_blocking(move || function(&task_io));
            within(&id, runner.stage_timeout_secs, work)
                .await?
                .map_err(|e| failed(&id, StageError::ExecutionFailed(e.to_string())))?
                .map_err(|e| failed(&id, e))?;
            None
        }
    };

    let produced = path_exists(&io.output).await;
    if runner.require_output && !produced {
        return Err(failed(&id, StageError::OutputMissing(io.output.clone())));
    }

    let output_hash = if runner.hash_outputs && produced {
        Some(hash_file(&io.output).await?)
    } else {
        None
    };

    Ok(StageRecord {
        id,
        arm: stage.arm().to_string(),
        algorithm: stage.algorithm().to_string(),
        input: io.input,
        output: io.output,
        status: StageStatus::Succeeded,
        command,
        exit_code,
        output_hash,
        deterministic: stage.deterministic(),
        latency_ms: start.elapsed().as_millis() as u64,
        started_at,
    })
}

async fn run_command(
    stage: &str,
    spec: &CommandSpec,
    timeout_secs: Option<u64>,
) -> Result<Option<i32>, TakoError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(argv = ?spec.argv(), "spawning");
    let output = within(stage, timeout_secs, command.output())
        .await?
        .map_err(|e| {
            let message = format!("cannot spawn {}: {}", spec.program.display(), e);
            failed(stage, StageError::ExecutionFailed(message))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        tracing::debug!(stdout = %stdout.trim(), "tool output");
    }

    if !output.status.success() {
        return Err(failed(
            stage,
            StageError::ExitStatus {
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_CHARS),
            },
        ));
    }

    Ok(output.status.code())
}

/// Await `work`, failing the stage once the timeout elapses.
/// Dropping a subprocess future kills the child.
async fn within<F: Future>(
    stage: &str,
    timeout_secs: Option<u64>,
    work: F,
) -> Result<F::Output, TakoError> {
    match timeout_secs {
        Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), work)
            .await
            .map_err(|_| failed(stage, StageError::TimedOut(seconds))),
        None => Ok(work.await),
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn hash_file(path: &Path) -> Result<String, TakoError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let file = std::fs::File::open(&path)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(file)?;
        Ok(format!("blake3:{}", hasher.finalize()))
    })
    .await
    .map_err(|e| TakoError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    .map_err(TakoError::from)
}
