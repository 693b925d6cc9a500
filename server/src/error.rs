use derive_more::derive::Display;
use sea_orm::{DbErr, SqlErr};

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Display)]
pub enum IngestError {
    /// Network or timeout talking to the mail provider. Retried on the next tick.
    #[display("Mail provider error: {_0}")]
    TransientProvider(anyhow::Error),
    /// Storage signalled a uniqueness conflict, i.e. another run created the record first.
    #[display("Duplicate key: {_0}")]
    DuplicateKey(String),
    /// A required field was missing when building a record.
    #[display("Validation error: {_0}")]
    Validation(String),
    /// Credentials or rules unavailable for a user. Aborts that user's run only.
    #[display("Configuration error: {_0}")]
    Configuration(String),
    #[display("Database error: {_0}")]
    Storage(DbErr),
}

impl std::error::Error for IngestError {}

impl IngestError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, IngestError::DuplicateKey(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, IngestError::Configuration(_))
    }
}

impl From<DbErr> for IngestError {
    fn from(error: DbErr) -> Self {
        match error.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => IngestError::DuplicateKey(msg),
            _ => IngestError::Storage(error),
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(error: reqwest::Error) -> Self {
        IngestError::TransientProvider(error.into())
    }
}
