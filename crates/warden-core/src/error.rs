//! Error types for Warden

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("module not registered: {0}")]
    ModuleNotFound(String),

    #[error("transition failed: {module} - {message}")]
    Transition { module: String, message: String },

    #[error("request pipeline is unavailable")]
    PipelineUnavailable,

    #[error("pipeline step error: {stage} - {message}")]
    PipelineStep { stage: String, message: String },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("scheduled task failed: {task} - {message}")]
    ScheduledTask { task: String, message: String },

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn transition(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transition {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn pipeline_step(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PipelineStep {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn scheduled_task(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScheduledTask {
            task: task.into(),
            message: message.into(),
        }
    }
}
