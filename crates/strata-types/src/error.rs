//! Shared error types for the Strata system.

use thiserror::Error;

/// Top-level error type for the Strata system.
#[derive(Error, Debug)]
pub enum StrataError {
    /// The requested document type is not one of the managed documents.
    #[error("Unknown document type: {0}")]
    UnknownDocument(String),

    /// A list operation addressed a key that holds a non-list value.
    #[error("Key '{key}' in document '{document}' is not a list")]
    NotAList {
        /// The document that was addressed.
        document: String,
        /// The offending key.
        key: String,
    },

    /// File content is not valid structured data.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The advisory lock could not be obtained in time.
    #[error("Timed out after {waited_ms}ms waiting for lock {path}")]
    LockTimeout {
        /// Path of the lock file.
        path: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The requested agent was not found.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// The operation would make an agent its own transitive superior.
    #[error("Hierarchy cycle: {0}")]
    HierarchyCycle(String),

    /// A delegation was attempted outside a direct superior/subordinate pair.
    #[error("Agent {subordinate} is not a subordinate of {superior}")]
    NotSubordinate {
        /// The delegating agent.
        superior: String,
        /// The agent that was expected to report to it.
        subordinate: String,
    },

    /// No delegation record matched.
    #[error("Delegation not found: task {task_id} for {subordinate_id}")]
    DelegationNotFound {
        /// Task id that was reported.
        task_id: String,
        /// Subordinate that reported it.
        subordinate_id: String,
    },

    /// The requested snapshot does not exist.
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// A memory id is already used somewhere in the memory document.
    #[error("Duplicate memory id: {0}")]
    DuplicateMemoryId(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

/// Alias for Result with StrataError.
pub type StrataResult<T> = Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_list_message() {
        let err = StrataError::NotAList {
            document: "memory".to_string(),
            key: "metadata".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Key 'metadata' in document 'memory' is not a list"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: StrataError = io.into();
        assert!(matches!(err, StrataError::Io(_)));
    }
}
