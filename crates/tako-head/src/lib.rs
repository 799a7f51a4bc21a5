//! TAKO Head: turns a list of arms into a validated plan and runs it.
//!
//! ```text
//! arms ──► Workflow ──► Plan::build ──► PipelineRunner ──► RunReport
//!  (code or YAML)      (ids, refs,       (tako-core)        + ExecutionLog
//!                       outputs)
//! ```

pub mod error;
pub mod head;
pub mod plan;
pub mod telemetry;
pub mod workflow;

pub use error::HeadError;
pub use head::{Head, Submission};
pub use plan::{Plan, PlanView, StageView, StepView};
pub use telemetry::init_tracing;
pub use workflow::{StageEntry, StageSpec, Workflow, WorkflowFile, WorkflowItem, PREVIOUS};
