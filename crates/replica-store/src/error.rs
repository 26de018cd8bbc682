use thiserror::Error;

use crate::Replica;

/// Errors that can occur when talking to a single replica.
///
/// "Not found" is never an error here: lookups return `Ok(None)` so a
/// failed call can't be mistaken for an empty result.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The replica could not be reached (connection, pool, timeout).
    #[error("{replica} replica unavailable: {reason}")]
    Unavailable { replica: Replica, reason: String },

    /// The replica answered but rejected the statement.
    #[error("{replica} replica error: {source}")]
    Backend {
        replica: Replica,
        source: sqlx::Error,
    },

    /// A record with the same identifier already exists.
    #[error("{replica} replica already holds {kind} {id}")]
    Duplicate {
        replica: Replica,
        kind: &'static str,
        id: String,
    },

    /// A stored record could not be decoded into a domain value.
    #[error("{replica} replica returned a malformed record: {reason}")]
    Corrupt { replica: Replica, reason: String },
}

impl StoreError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(replica: Replica, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            replica,
            reason: reason.into(),
        }
    }

    /// Creates a `Corrupt` error.
    pub fn corrupt(replica: Replica, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            replica,
            reason: reason.into(),
        }
    }

    /// Classifies a sqlx error: transport failures become `Unavailable`,
    /// decode failures `Corrupt`, everything else `Backend`.
    pub fn database(replica: Replica, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => {
                tracing::warn!(%replica, error = %err, "replica unreachable");
                Self::unavailable(replica, err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                tracing::error!(%replica, error = %err, "stored record failed to decode");
                Self::corrupt(replica, err.to_string())
            }
            source => Self::Backend { replica, source },
        }
    }

    /// Returns the replica the error came from.
    pub fn replica(&self) -> Replica {
        match self {
            Self::Unavailable { replica, .. }
            | Self::Backend { replica, .. }
            | Self::Duplicate { replica, .. }
            | Self::Corrupt { replica, .. } => *replica,
        }
    }

    /// Returns true if the replica could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if the write collided with an existing record.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result type for replica operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err = StoreError::database(Replica::Document, sqlx::Error::PoolTimedOut);
        assert!(err.is_unavailable());
        assert_eq!(err.replica(), Replica::Document);
    }

    #[test]
    fn test_row_not_found_is_backend_error() {
        let err = StoreError::database(Replica::Relational, sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Backend { .. }));
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_display_names_replica() {
        let err = StoreError::unavailable(Replica::Relational, "connection refused");
        assert_eq!(
            err.to_string(),
            "relational replica unavailable: connection refused"
        );
    }
}
