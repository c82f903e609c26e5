use thiserror::Error;

use crate::db::EntryDraft;

/// Recoverable failures surfaced to whoever drives a scan session.
///
/// None of these are fatal: the session is left in the state it had before the
/// failing call, and the caller can show the message and let the user retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("capture rejected: {0}")]
    InvalidCapture(String),
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("entry not saved, please retry: {message}")]
    LogWrite { draft: EntryDraft, message: String },
}

impl ScanError {
    pub fn validation(message: impl Into<String>) -> Self {
        ScanError::Validation(message.into())
    }

    /// The form data to resubmit, when the failure was a log write.
    pub fn retry_draft(&self) -> Option<EntryDraft> {
        match self {
            ScanError::LogWrite { draft, .. } => Some(*draft),
            _ => None,
        }
    }
}
