use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("unknown arm '{0}'")]
    UnknownArm(String),

    #[error("unknown algorithm '{algorithm}' for {arm} (available: {available})")]
    UnknownAlgorithm {
        arm: String,
        algorithm: String,
        available: String,
    },

    #[error("algorithm '{algorithm}' requires parameter '{param}'")]
    MissingParam { algorithm: String, param: String },

    #[error("parameter '{param}': {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("invalid stage id '{0}'")]
    InvalidId(String),

    #[error("template error: {0}")]
    Template(String),
}
