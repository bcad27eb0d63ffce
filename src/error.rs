use thiserror::Error;

use crate::persist::{UNIQUE_MODULE_HANDLE, UNIQUE_MODULE_NAME};

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("module not found")]
    NotFound,
    #[error("module name not unique")]
    NameNotUnique,
    #[error("module handle not unique")]
    HandleNotUnique,
    #[error("invalid order specification: {0}")]
    OrderSpecInvalid(String),
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: Cause,
    },
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Wraps this error in a `Storage` error describing the operation in progress.
    /// The original error stays reachable through `source()`.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Storage {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

// Helper conversions
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &e {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                // sqlite names the index for expression indexes, e.g.
                // "UNIQUE constraint failed: index 'uid_compose_module_handle'"
                if message.contains(UNIQUE_MODULE_HANDLE) {
                    return Self::HandleNotUnique;
                }
                if message.contains(UNIQUE_MODULE_NAME) {
                    return Self::NameNotUnique;
                }
            }
        }
        Self::Storage {
            context: "persistence".to_string(),
            source: Box::new(e),
        }
    }
}

impl From<config::ConfigError> for StoreError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
