//! Unified error type for the cloudframe pipeline.
//!
//! Pipeline stages log and absorb remote failures themselves;
//! [`Error`] covers the failures that do propagate to a caller: bad
//! configuration, cache I/O, and a session that is no longer running.

/// Unified error type covering the failure modes that reach a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration file could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Settings or request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The session actor has stopped and can no longer accept commands.
    #[error("Session closed")]
    SessionClosed,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
