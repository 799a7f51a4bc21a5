//! Head: validates a workflow into a plan and runs it.
use crate::error::HeadError;
use crate::plan::Plan;
use crate::workflow::Workflow;
use serde_json::json;
use tako_core::{ExecutionContext, ExecutionLog, Level, LogRecord, RunReport, Settings, TaskState};
use tracing::Instrument;

pub struct Head {
    settings: Settings,
}

/// A finished submission: the run id is assigned before planning, so even
/// rejected workflows can be looked up.
#[derive(Debug)]
pub struct Submission {
    pub run_id: String,
    pub workflow: String,
    pub log: ExecutionLog,
    pub outcome: Result<RunReport, HeadError>,
}

impl Submission {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl Head {
    pub fn new(settings: Settings) -> Result<Self, HeadError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn plan(&self, workflow: impl Into<Workflow>) -> Result<Plan, HeadError> {
        Plan::build(workflow.into())
    }

    /// Run a workflow, each arm's output feeding the next
    pub async fn do_workflow(&self, workflow: impl Into<Workflow>) -> Result<RunReport, HeadError> {
        self.submit(workflow).await.outcome
    }

    /// Run a workflow and keep its monitoring log
    pub async fn submit(&self, workflow: impl Into<Workflow>) -> Submission {
        self.execute(workflow.into(), false).await
    }

    /// Resolve every task without running anything
    pub async fn dry_run(&self, workflow: impl Into<Workflow>) -> Submission {
        self.execute(workflow.into(), true).await
    }

    async fn execute(&self, workflow: Workflow, dry_run: bool) -> Submission {
        let ctx = ExecutionContext::new(workflow.name(), self.settings.clone()).dry_run(dry_run);
        let mut log = ExecutionLog::new();
        let span = tracing::info_span!("workflow", name = %ctx.workflow, run_id = %ctx.run_id);

        let outcome = async {
            let plan = match Plan::build(workflow) {
                Ok(plan) => plan,
                Err(err) => {
                    log.log(
                        LogRecord::new(Level::Error, "plan", TaskState::Failed, err.to_string())
                            .with_context(json!({ "run_id": ctx.run_id })),
                    );
                    return Err(err);
                }
            };

            let runner = plan.runner();
            tracing::info!(
                pipeline = %runner.pipeline_id(),
                stages = runner.len(),
                dry_run,
                "plan accepted"
            );

            let report = runner.run(&ctx, &mut log).await.map_err(HeadError::Run)?;
            tracing::info!(
                stages = report.stages.len(),
                duration_ms = report.duration_ms(),
                "workflow finished"
            );
            Ok::<_, HeadError>(report)
        }
        .instrument(span.clone())
        .await;

        if let Err(err) = &outcome {
            tracing::error!(parent: &span, error = %err, "workflow failed");
        }

        Submission {
            run_id: ctx.run_id,
            workflow: ctx.workflow,
            log,
            outcome,
        }
    }
}
