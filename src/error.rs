use crate::schema::Schedule;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors surfaced to callers of the scheduling operations. The
/// dispatcher never returns these; its failures are recorded on the
/// notification rows instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("schedule overlaps {} existing session(s)", conflicts.len())]
    Conflict { conflicts: Vec<Schedule> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict check unavailable: {0}")]
    ConflictCheckUnavailable(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Stable machine-readable code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Conflict { .. } => "schedule_conflict",
            Error::NotFound(_) => "not_found",
            Error::ConflictCheckUnavailable(_) => "conflict_check_unavailable",
            Error::Storage(_) => "storage_error",
        }
    }
}
