use thiserror::Error;

/// Main error type for Questchain
#[derive(Error, Debug)]
pub enum QuestchainError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (rejected before any query runs)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The world store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single store query exceeded its deadline
    #[error("Query timed out: {0}")]
    Timeout(String),

    /// Quest not found
    #[error("Quest not found: {0}")]
    QuestNotFound(u32),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

impl QuestchainError {
    /// Backend failures that end the whole request instead of a single chain walk.
    ///
    /// A stalled store times out on every query, so timeouts count as well.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QuestchainError::StoreUnavailable(_) | QuestchainError::Timeout(_)
        )
    }
}

/// Convenient Result type using QuestchainError
pub type Result<T> = std::result::Result<T, QuestchainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuestchainError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: QuestchainError = rusqlite_err.into();
        assert!(matches!(err, QuestchainError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QuestchainError = io_err.into();
        assert!(matches!(err, QuestchainError::Io(_)));
    }

    #[test]
    fn test_backend_failures_are_fatal() {
        assert!(QuestchainError::StoreUnavailable("down".to_string()).is_fatal());
        assert!(QuestchainError::Timeout("slow".to_string()).is_fatal());
        assert!(!QuestchainError::Parse("bad row".to_string()).is_fatal());
        assert!(!QuestchainError::QuestNotFound(7).is_fatal());
        assert!(!QuestchainError::Database(rusqlite::Error::InvalidQuery).is_fatal());
    }
}
