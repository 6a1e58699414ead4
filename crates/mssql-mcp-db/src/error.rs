//! Database-side error classification.
//!
//! These errors are rendered into tool text output as `"Error: <display>"`,
//! so every variant's `Display` is the exact client-visible reason. Kinds are
//! distinguished by variant, not by exception type, mirroring the propagation
//! policy: argument validation first, driver errors wrapped once with the
//! operation label, budget violations rewriting anything that follows them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A required tool argument was missing or blank.
    #[error("{argument} cannot be empty")]
    EmptyArgument { argument: String },

    #[error("Database '{name}' does not exist or is not accessible")]
    DatabaseNotFound { name: String },

    #[error("Stored procedure '{name}' was not found")]
    ProcedureNotFound { name: String },

    #[error("Required parameter '@{name}' was not supplied")]
    ParameterMissing { name: String },

    #[error("Parameter '@{name}': cannot convert {source_type} to {target_type}")]
    ParameterType {
        name: String,
        source_type: String,
        target_type: String,
    },

    #[error("Parameter '@{name}' does not allow NULL")]
    NullNotAllowed { name: String },

    #[error("Parameter '@{name}' is an OUTPUT parameter; OUTPUT binding is not supported")]
    OutputParameterUnsupported { name: String },

    #[error("Invalid object name '{name}'")]
    InvalidObjectName { name: String },

    /// The tool-call total budget was exceeded. Message shape is part of the
    /// wire contract.
    #[error("Total tool timeout of {budget_secs}s exceeded")]
    ToolCallTimeout { budget_secs: u32 },

    #[error("Command timed out after {timeout_secs} seconds")]
    CommandTimeout { timeout_secs: u32 },

    #[error("Timeout must be between {min} and {max} seconds (got {value})")]
    TimeoutOutOfRange { value: u64, min: u32, max: u32 },

    /// Explicit cancellation (stop_session or client disconnect).
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Failed to connect to SQL Server: {message}")]
    Connect { message: String },

    /// Any other driver error, wrapped once with the operation label.
    #[error("SQL error while {operation}: {message}")]
    Sql {
        operation: &'static str,
        message: String,
        code: Option<u32>,
    },

    #[error("Capability probe failed: {0}")]
    CapabilityProbe(String),
}

impl DbError {
    pub fn empty_argument(argument: impl Into<String>) -> Self {
        Self::EmptyArgument {
            argument: argument.into(),
        }
    }

    /// Wrap a raw driver error with the current operation label.
    pub fn from_driver(operation: &'static str, err: tiberius::error::Error) -> Self {
        match &err {
            tiberius::error::Error::Server(token) => Self::Sql {
                operation,
                message: token.message().to_string(),
                code: Some(token.code()),
            },
            other => Self::Sql {
                operation,
                message: other.to_string(),
                code: None,
            },
        }
    }

    /// Client-facing one-liner, the way tools report failures.
    pub fn to_tool_text(&self) -> String {
        format!("Error: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_timeout_message_is_exact() {
        let err = DbError::ToolCallTimeout { budget_secs: 2 };
        assert_eq!(err.to_string(), "Total tool timeout of 2s exceeded");
        assert_eq!(err.to_tool_text(), "Error: Total tool timeout of 2s exceeded");
    }

    #[test]
    fn sql_error_carries_operation_label() {
        let err = DbError::Sql {
            operation: "executing query",
            message: "Invalid column name 'x'".to_string(),
            code: Some(207),
        };
        assert_eq!(
            err.to_tool_text(),
            "Error: SQL error while executing query: Invalid column name 'x'"
        );
    }

    #[test]
    fn parameter_errors_name_the_parameter() {
        let err = DbError::ParameterType {
            name: "Age".to_string(),
            source_type: "string".to_string(),
            target_type: "int".to_string(),
        };
        assert!(err.to_string().contains("@Age"));
        assert!(err.to_string().contains("string"));
        assert!(err.to_string().contains("int"));
    }
}
