use thiserror::Error;

use crate::models::AlarmId;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Error: {0}")]
    Anyhow(#[from] anyhow::Error),

    #[error("Exact scheduling denied: {0}")]
    SchedulingDenied(String),

    #[error("Scheduling failed: {0}")]
    Scheduling(String),

    #[error("An interval alarm is already active (id {0})")]
    AlreadyActive(AlarmId),

    #[error("Corrupt persisted record '{key}': {reason}")]
    PersistenceCorruption { key: String, reason: String },

    #[error("Completion for alarm {0} arrived after it was removed")]
    StaleCompletion(AlarmId),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Device link error: {0}")]
    Link(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn scheduling_denied<S: Into<String>>(msg: S) -> Self {
        Self::SchedulingDenied(msg.into())
    }

    pub fn scheduling<S: Into<String>>(msg: S) -> Self {
        Self::Scheduling(msg.into())
    }

    pub fn corruption<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::PersistenceCorruption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn audio<S: Into<String>>(msg: S) -> Self {
        Self::Audio(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Errors that are the caller's to act on, as opposed to failures absorbed at the
    /// boundary where they originate.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::AlreadyActive(_) | Self::InvalidInput(_))
    }

    pub fn to_safe_string(&self) -> String {
        match self {
            Self::Database(_) => "Database operation failed".to_string(),
            Self::Serialization(_) => "Could not read saved alarm".to_string(),
            Self::Anyhow(_) => "Operation failed".to_string(),
            Self::Link(_) => "Device connection failed".to_string(),
            Self::AlreadyActive(_) => "Active interval alarm already set".to_string(),
            _ => self.to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
