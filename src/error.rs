use thiserror::Error;

/// Errors raised by the registry ledger, the RSVP book, and CSV ingestion.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Item or contribution index absent
    #[error("{0}")]
    NotFound(String),

    /// Operation would break a ledger invariant (e.g. over-contribution)
    #[error("{0}")]
    InvalidOperation(String),

    /// Upload could not be interpreted (missing columns, unreadable stream)
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn item_not_found() -> Self {
        LedgerError::NotFound("Item not found".to_string())
    }

    pub fn contribution_not_found() -> Self {
        LedgerError::NotFound("Contribution not found".to_string())
    }

    /// True for errors caused by the caller's input rather than the store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound(_)
                | LedgerError::InvalidOperation(_)
                | LedgerError::MalformedInput(_)
                | LedgerError::Csv(_)
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
