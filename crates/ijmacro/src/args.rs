use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Positional arguments handed to a macro
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacroArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub extra: Vec<String>,
}

impl MacroArgs {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            extra: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.extra.push(param.into());
        self
    }
}
