//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while the
//! CLI uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level error enum for the detection core
//! - [`ProviderError`](crate::detection::ProviderError): per-provider failures,
//!   which never escape the recognition chain
//! - [`ConfigError`](crate::config::ConfigError): configuration file problems
//!
//! Only [`Error::Database`] is fatal for a station cycle; see
//! [`Error::is_persistence`].

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the detection core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error (the persistence failure class)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Segment signature is empty or malformed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// A matched candidate could not be turned into a canonical track
    #[error("Cannot resolve track identity: {0}")]
    Resolution(String),

    /// Duration string did not parse
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    /// Recognition provider error
    #[error("Provider error: {0}")]
    Provider(#[from] crate::detection::ProviderError),

    /// Segment file could not be decoded
    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blocking or spawned task failed to complete
    #[error("Task join error: {0}")]
    TaskJoin(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid signature error.
    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::InvalidSignature(message.into())
    }

    /// Create a resolution error.
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error belongs to the persistence failure class.
    ///
    /// Persistence failures abort the current station cycle; the segment
    /// stays pending and is retried on the next tick.
    pub fn is_persistence(&self) -> bool {
        match self {
            Error::Database(_) => true,
            Error::WithContext { source, .. } => source.is_persistence(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
