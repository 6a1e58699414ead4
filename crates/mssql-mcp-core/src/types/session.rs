//! Session wire types.
//!
//! The session *table* lives in the server crate; these are the shapes both
//! sides of the wire agree on.

use serde::{Deserialize, Serialize};

/// What a session is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Query,
    StoredProcedure,
}

impl SessionKind {
    /// Key used for the statement field in session payloads
    /// (`query` vs `procedureName`).
    pub fn statement_field(&self) -> &'static str {
        match self {
            SessionKind::Query => "query",
            SessionKind::StoredProcedure => "procedureName",
        }
    }
}

/// Lifecycle state of a session. Transitions only running -> terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Running)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Filter accepted by the `list_sessions` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionFilter {
    #[default]
    All,
    Running,
    Completed,
}

impl SessionFilter {
    pub fn matches(&self, state: SessionState) -> bool {
        match self {
            SessionFilter::All => true,
            SessionFilter::Running => state == SessionState::Running,
            SessionFilter::Completed => state.is_terminal(),
        }
    }
}
