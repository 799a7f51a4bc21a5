use std::path::PathBuf;
use tako_arms::ArmError;
use tako_core::TakoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeadError {
    #[error("WORKFLOW/{0}")]
    Workflow(String),

    #[error("PLAN/{0}")]
    Plan(String),

    #[error("ARM/{stage}: {source}")]
    Arm { stage: String, source: ArmError },

    #[error("YAML/{0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO/{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Run(#[from] TakoError),
}
