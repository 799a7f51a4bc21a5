//! TAKO Core: Stage contract, Runner, and Data Model
//!
//! Generic staged pipeline core. Stages resolve to tasks (an external
//! executable or an in-process function) and the runner threads each
//! stage's output file into the next stage's input.
//!
//! # Pipeline Flow
//!
//! ```text
//! data → [stage] → output handle → [stage] → output handle → ...
//!                      │
//!                      └→ {stage | stage}   (parallel group, same input)
//! ```

pub mod context;
pub mod data_model;
pub mod error;
pub mod monitor;
pub mod runner;
pub mod settings;
pub mod stage;

pub use context::ExecutionContext;
pub use data_model::{
    DataRef, OutputHandle, Params, RunReport, RunStatus, StageConfig, StageRecord, StageStatus,
};
pub use error::TakoError;
pub use monitor::{ExecutionLog, Level, LogRecord, LogStats, TaskState};
pub use runner::{PipelineRunner, Step};
pub use settings::{ImageJSettings, LogSettings, RunnerSettings, Settings};
pub use stage::{CommandSpec, FunctionTask, Stage, StageError, StageIo, Task};

/// TAKO engine version
pub const TAKO_VERSION: &str = env!("CARGO_PKG_VERSION");
