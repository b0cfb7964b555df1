//! Error types for the storage engine.
//!
//! Operations report three informative outcomes: success, "the key is not
//! there" (with an optional reason such as `"Stale"` for expired keys), and
//! hard failures (malformed on-disk records, invalid arguments, engine
//! errors). Engine errors are propagated verbatim; the caller-facing
//! taxonomy never wraps them in extra context.

/// Errors surfaced by sorted-set operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key is absent, logically empty, or expired. `reason` is
    /// `Some("Stale")` when the key exists but its timestamp has passed,
    /// mirroring what the command frontend reports to clients.
    #[error("not found{}", reason_suffix(.reason))]
    NotFound { reason: Option<&'static str> },

    /// Invalid arguments or a malformed on-disk record.
    #[error("corruption: {0}")]
    Corruption(String),

    /// An engine error, returned unchanged.
    #[error(transparent)]
    Rocks(#[from] rocksdb::Error),
}

impl Error {
    /// A plain not-found: the key is absent or logically empty.
    pub fn not_found() -> Self {
        Error::NotFound { reason: None }
    }

    /// The key exists but is expired.
    pub fn stale() -> Self {
        Error::NotFound {
            reason: Some("Stale"),
        }
    }

    /// True for any `NotFound`, stale or not.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True only for the expired-key flavor of `NotFound`.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Error::NotFound {
                reason: Some("Stale")
            }
        )
    }
}

fn reason_suffix(reason: &Option<&'static str>) -> String {
    match reason {
        Some(r) => format!(" ({r})"),
        None => String::new(),
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
