use thiserror::Error;

#[derive(Error, Debug)]
pub enum Nl2SqlError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("SQL execution error: {message} (sql: {sql})")]
    SqlExecution { sql: String, message: String },

    #[error("Delegate unavailable: {0}")]
    DelegateUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Nl2SqlError {
    pub fn sql_execution(sql: &str, err: impl std::fmt::Display) -> Self {
        Nl2SqlError::SqlExecution {
            sql: sql.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Nl2SqlError {
    fn from(err: rusqlite::Error) -> Self {
        Nl2SqlError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Nl2SqlError>;
