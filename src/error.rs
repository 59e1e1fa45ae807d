//! Error kinds reported back to whoever invoked a search.

use thiserror::Error;

/// Failure of a single search invocation.
///
/// Each variant maps to a distinct message shown to the invoker; none of
/// them is fatal to the process.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A date argument was not `YYYY-MM-DD`.
    #[error("invalid date '{input}': expected YYYY-MM-DD")]
    InvalidDate { input: String },

    /// The history source refused to hand out the channel's messages.
    #[error("missing permission to read the history of channel {channel_id}")]
    PermissionDenied { channel_id: String },

    /// Anything else that went wrong while fetching, formatting or sending.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`SearchError`], kept in outcomes and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Permission,
    Unclassified,
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::InvalidDate { .. } => ErrorKind::Validation,
            SearchError::PermissionDenied { .. } => ErrorKind::Permission,
            SearchError::Other(_) => ErrorKind::Unclassified,
        }
    }
}
