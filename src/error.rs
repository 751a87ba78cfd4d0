use thiserror::Error;

/// Main error type for citegraph
#[derive(Error, Debug)]
pub enum CitegraphError {
    /// No connector and no DOI fallback claims the identifier
    #[error("Unresolved identifier: {0}")]
    UnresolvedIdentifier(String),

    /// Identifier resolved, but the upstream fetch failed
    #[error("Metadata unavailable for {id}: {reason}")]
    MetadataUnavailable { id: String, reason: SourceError },

    /// A source call made during expansion failed entirely
    #[error("Source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: SourceError },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No seed resolved and nothing was discovered
    #[error("No papers found for: {0}")]
    NoPapersFound(String),

    /// The build was cancelled by the caller
    #[error("Citation graph build cancelled")]
    Cancelled,

    /// The build exceeded its time budget
    #[error("Citation graph build timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

/// Outcome of a failed call to an upstream source.
///
/// `NotFound` is the expected miss; everything else is a fault.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl SourceError {
    /// True when the upstream answered and the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }

    /// Rate limits and server-side failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            SourceError::Network(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SourceError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

/// Convenient Result type using CitegraphError
pub type Result<T> = std::result::Result<T, CitegraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CitegraphError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_metadata_unavailable_carries_reason() {
        let err = CitegraphError::MetadataUnavailable {
            id: "arxiv:1111.1111".to_string(),
            reason: SourceError::NotFound("arxiv:1111.1111".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("arxiv:1111.1111"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn test_not_found_is_distinct_from_faults() {
        assert!(SourceError::NotFound("x".into()).is_not_found());
        assert!(!SourceError::Network("down".into()).is_not_found());
        assert!(!SourceError::Http { status: 500, message: "boom".into() }.is_not_found());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(SourceError::Http { status: 429, message: String::new() }.is_retryable());
        assert!(SourceError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(!SourceError::Http { status: 400, message: String::new() }.is_retryable());
        assert!(!SourceError::NotFound("x".into()).is_retryable());
        assert!(!SourceError::Parse("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CitegraphError = io_err.into();
        assert!(matches!(err, CitegraphError::Io(_)));
    }
}
