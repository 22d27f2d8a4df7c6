//! Error types for formwork engine operations.

/// Errors that can occur during record store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record was not found in the store.
    NotFound,
    /// A record with the same key already exists.
    AlreadyExists,
    /// The named relationship is not declared for the model.
    UnknownRelationship(String),
    /// A commit or rollback was requested with no open transaction.
    NoTransaction,
    /// JSON serialization or deserialization failed.
    SerializationError(String),
    /// An internal storage system error occurred.
    Internal(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Record not found in store"),
            Self::AlreadyExists => write!(f, "Record already exists in store"),
            Self::UnknownRelationship(name) => {
                write!(f, "Relationship {:?} is not declared for this model", name)
            }
            Self::NoTransaction => write!(f, "No transaction is open"),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Programming errors caused by engine misconfiguration.
///
/// These indicate a mistake in how a schema or action was assembled, not a
/// runtime condition. They are returned immediately and never recovered
/// from inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An action was given a blank or non-identifier name.
    InvalidActionName(String),
    /// An authorization denial carried no message and no fallback message
    /// was configured, so there is nothing to show the user.
    DeniedWithoutMessage,
    /// A relationship save was requested without the required mutation
    /// callback being configured.
    MissingMutationCallback(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidActionName(name) => {
                write!(
                    f,
                    "Invalid action name {:?}. Action names must be non-blank identifiers",
                    name
                )
            }
            Self::DeniedWithoutMessage => {
                write!(
                    f,
                    "An authorization response was denied without a message and no fallback message was configured"
                )
            }
            Self::MissingMutationCallback(relationship) => {
                write!(
                    f,
                    "Relationship {:?} cannot be saved without a mutation callback",
                    relationship
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        assert_eq!(
            StoreError::NotFound.to_string(),
            "Record not found in store"
        );
        assert!(
            StoreError::UnknownRelationship("author".to_string())
                .to_string()
                .contains("author")
        );
    }

    #[test]
    fn config_error_display() {
        assert!(
            ConfigError::InvalidActionName(String::new())
                .to_string()
                .contains("non-blank")
        );
        assert!(
            ConfigError::DeniedWithoutMessage
                .to_string()
                .contains("fallback")
        );
    }
}
