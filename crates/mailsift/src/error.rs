//! Error types for the fetch pipeline.

use thiserror::Error;

use crate::criteria::CriteriaError;
use crate::selection::Field;
use crate::store::StoreError;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a fetch.
///
/// Setup failures are returned before any stream exists; the others are
/// reported when a stream is finished.
#[derive(Debug, Error)]
pub enum Error {
    /// Criteria rejected before any I/O.
    #[error("invalid criteria: {0}")]
    InvalidCriteria(#[from] CriteriaError),

    /// The store refused to open the mailbox.
    #[error("failed to select mailbox {mailbox:?}: {source}")]
    MailboxSelect {
        /// Requested mailbox.
        mailbox: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// The search command failed.
    #[error("search failed: {0}")]
    Search(#[source] StoreError),

    /// Bulk retrieval failed after streaming started.
    #[error("fetch failed: {0}")]
    Fetch(#[source] StoreError),

    /// Too many messages failed to decode.
    #[error("too many decode errors ({failed} of {limit} allowed), aborted")]
    ErrorBudgetExceeded {
        /// Messages that failed to decode.
        failed: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON settings.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stage task panicked or was aborted.
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

/// Why a single message was dropped by the decoder.
///
/// Never surfaced as a stream item: logged and counted against the error
/// budget.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The raw body could not be opened as a message.
    #[error("cannot open message: {0}")]
    Open(#[source] mailsift_mime::Error),

    /// A requested field could not be extracted.
    #[error("cannot decode {field}: {source}")]
    Field {
        /// Field being extracted.
        field: Field,
        /// Parser failure.
        #[source]
        source: mailsift_mime::Error,
    },

    /// The body part iterator failed.
    #[error("cannot read body part: {0}")]
    Part(#[source] mailsift_mime::Error),
}

impl DecodeError {
    pub(crate) fn field(field: Field) -> impl Fn(mailsift_mime::Error) -> Self {
        move |source| Self::Field { field, source }
    }
}
