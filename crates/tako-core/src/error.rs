//! Unified Error Model
use crate::stage::StageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TakoError {
    #[error("CONFIG/{0}")]
    ConfigError(String),

    #[error("STAGE/{stage}: {source}")]
    StageFailed { stage: String, source: StageError },

    #[error("IO/{0}")]
    IoError(#[from] std::io::Error),
}

impl TakoError {
    /// Id of the stage the error belongs to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
