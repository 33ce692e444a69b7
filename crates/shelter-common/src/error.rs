//! Error types for shelter

use thiserror::Error;

/// Result type alias for shelter operations
pub type Result<T> = std::result::Result<T, ShelterError>;

/// Unified error type for all shelter operations
///
/// Validation failures are raised before the store is contacted. Every other
/// variant describes something that went wrong at or beyond the store
/// boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShelterError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ShelterError {
    /// Returns true if the caller supplied bad input and nothing was sent to the store
    pub fn is_validation(&self) -> bool {
        matches!(self, ShelterError::Validation(_))
    }

    /// Returns true if the failure came from the store or the driver
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            ShelterError::MongoDB(_)
                | ShelterError::Connection(_)
                | ShelterError::Query(_)
                | ShelterError::Deserialization(_)
        )
    }

    /// Rewrite the message while keeping the variant
    pub fn map_message(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            ShelterError::MongoDB(m) => ShelterError::MongoDB(f(&m)),
            ShelterError::Deserialization(m) => ShelterError::Deserialization(f(&m)),
            ShelterError::Connection(m) => ShelterError::Connection(f(&m)),
            ShelterError::Query(m) => ShelterError::Query(f(&m)),
            ShelterError::Validation(m) => ShelterError::Validation(f(&m)),
            ShelterError::Config(m) => ShelterError::Config(f(&m)),
        }
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for ShelterError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::Io(..) => ShelterError::Connection(err.to_string()),
            ErrorKind::InvalidArgument { .. } => ShelterError::Query(err.to_string()),
            _ => ShelterError::MongoDB(err.to_string()),
        }
    }
}
