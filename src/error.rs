use thiserror::Error;

#[derive(Error, Debug)]
pub enum AthenaError {
    /// The service rejected the query at submission time.
    #[error("Submission error: {0}")]
    Submission(String),

    /// A retryable service failure that has not yet exhausted the retry budget.
    #[error("Transient service error: {0}")]
    TransientService(String),

    /// The query reached FAILED, or retries were exhausted.
    #[error("Query {} failed: {message}", query_id.as_deref().unwrap_or("<unsubmitted>"))]
    TerminalQuery {
        query_id: Option<String>,
        message: String,
    },

    #[error("Query {0} was cancelled")]
    Cancelled(String),

    #[error("Conversion error in column {ordinal} ({wire_type}) for value {raw:?}: {reason}")]
    Conversion {
        ordinal: usize,
        wire_type: String,
        raw: String,
        reason: String,
    },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AthenaError {
    pub fn terminal(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        AthenaError::TerminalQuery {
            query_id: Some(query_id.into()),
            message: message.into(),
        }
    }

    pub fn conversion(
        ordinal: usize,
        wire_type: &str,
        raw: &str,
        reason: impl Into<String>,
    ) -> Self {
        AthenaError::Conversion {
            ordinal,
            wire_type: wire_type.to_string(),
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error came from a cancellation the caller asked for.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AthenaError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, AthenaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_error_carries_message_verbatim() {
        let err = AthenaError::terminal("q1", "SYNTAX_ERROR: line 1:8: Column 'x' cannot be resolved");
        assert_eq!(
            err.to_string(),
            "Query q1 failed: SYNTAX_ERROR: line 1:8: Column 'x' cannot be resolved"
        );
    }

    #[test]
    fn test_conversion_error_identifies_cell() {
        let err = AthenaError::conversion(3, "boolean", "TRUE", "expected 'true' or 'false'");
        let text = err.to_string();
        assert!(text.contains("column 3"));
        assert!(text.contains("boolean"));
        assert!(text.contains("\"TRUE\""));
    }

    #[test]
    fn test_malformed_result_file_maps_to_csv_error() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("a,b\n1\n".as_bytes());
        let failure = reader
            .records()
            .find_map(|r| r.err())
            .expect("ragged row should fail");
        let err: AthenaError = failure.into();
        assert!(matches!(err, AthenaError::Csv(_)));
        assert!(err.to_string().starts_with("CSV error:"));
    }
}
