//! Stage Trait: single contract for every arm
use crate::context::ExecutionContext;
use crate::data_model::{DataRef, OutputHandle};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Contract of a pipeline stage
pub trait Stage: Send + Sync {
    /// Unique stage id within a workflow (ex: "alignment")
    fn id(&self) -> &str;

    /// Arm this stage was built from (ex: "segmentation")
    fn arm(&self) -> &str;

    /// Algorithm name as configured
    fn algorithm(&self) -> &str;

    /// Where the stage reads from
    fn input(&self) -> &DataRef;

    /// Handle to the file this stage writes
    fn output(&self) -> OutputHandle;

    /// Whether the same input always yields the same output (default: true)
    fn deterministic(&self) -> bool {
        true
    }

    /// Resolve the task to run for the given paths
    fn prepare(&self, io: &StageIo, ctx: &ExecutionContext) -> Result<Task, StageError>;
}

/// Concrete input/output paths of one stage execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageIo {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Closure run in-process for [`Task::Function`]
pub type FunctionTask = Arc<dyn Fn(&StageIo) -> Result<(), StageError> + Send + Sync>;

/// What a stage runs: an external program or an in-process function
#[derive(Clone)]
pub enum Task {
    Executable(CommandSpec),
    Function(FunctionTask),
}

impl Task {
    /// Wrap a closure as a function task
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&StageIo) -> Result<(), StageError> + Send + Sync + 'static,
    {
        Task::Function(Arc::new(f))
    }

    /// Command line rendered for reports, `None` for function tasks
    pub fn command_line(&self) -> Option<Vec<String>> {
        match self {
            Task::Executable(spec) => Some(spec.argv()),
            Task::Function(_) => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Executable(spec) => f.debug_tuple("Executable").field(spec).finish(),
            Task::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// External program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum StageError {
    ValidationFailed(String),
    InputMissing(PathBuf),
    ExecutionFailed(String),
    ExitStatus { code: Option<i32>, stderr: String },
    OutputMissing(PathBuf),
    TimedOut(u64),
    Cancelled,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "VALIDATION: {}", msg),
            Self::InputMissing(path) => write!(f, "INPUT/MISSING: {}", path.display()),
            Self::ExecutionFailed(msg) => write!(f, "EXEC: {}", msg),
            Self::ExitStatus { code, stderr } => {
                match code {
                    Some(code) => write!(f, "EXIT/{}", code)?,
                    None => write!(f, "EXIT/signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            Self::OutputMissing(path) => write!(f, "OUTPUT/MISSING: {}", path.display()),
            Self::TimedOut(seconds) => write!(f, "TIMEOUT: exceeded {}s", seconds),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::error::Error for StageError {}
