//! Error types for the upgrade impact audit.

/// Top-level error enum for the audit library.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Invalid search term {term:?}: {reason}")]
    InvalidTerm { term: String, reason: &'static str },

    #[error("Corpus access error on {artifact}: {reason}")]
    CorpusAccess { artifact: String, reason: String },

    #[error("Malformed script pattern {pattern:?}: {reason}")]
    MalformedPattern { pattern: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuditError {
    pub fn invalid_term(term: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidTerm {
            term: term.into(),
            reason,
        }
    }

    pub fn corpus_access(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Self::CorpusAccess {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    /// Ledger and totals writes go through here so a failed write is reported
    /// as a storage failure rather than a generic SQLite error.
    pub fn storage(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }

    /// `false` for errors that only invalidate one event or one artifact.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AuditError::InvalidTerm { .. } | AuditError::CorpusAccess { .. }
        )
    }
}

pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_item_errors_are_not_fatal() {
        assert!(!AuditError::invalid_term("  ", "blank").is_fatal());
        assert!(!AuditError::corpus_access("a.sqr", "denied").is_fatal());
    }

    #[test]
    fn test_run_level_errors_are_fatal() {
        assert!(AuditError::Connectivity("down".into()).is_fatal());
        assert!(AuditError::Storage("disk full".into()).is_fatal());
        assert!(AuditError::MalformedPattern {
            pattern: "*.sq[".into(),
            reason: "unclosed class".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = AuditError::invalid_term("", "empty term");
        assert_eq!(err.to_string(), "Invalid search term \"\": empty term");
    }
}
