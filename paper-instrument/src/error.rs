use thiserror::Error;

/// Errors raised by the [`crate::store::InstrumentStore`] (§4.1).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum InstrumentError {
    /// The store has not completed its first load yet.
    #[error("instrument store not ready - no snapshot has been loaded")]
    NotReady,

    /// No instrument matches the requested symbol or key.
    #[error("instrument not found: {0}")]
    NotFound(String),

    /// A bulk load contained a duplicate `instrumentKey`.
    #[error("duplicate instrument key in load: {0}")]
    DuplicateKey(String),
}
