//! Background session management.
//!
//! A session is one SQL statement or stored-procedure call running on its own
//! worker task with a dedicated connection. The manager owns the session
//! table, admission control, cancellation and reaping; the actual database
//! work is injected as a future so the state machine stays independent of the
//! driver.
//!
//! Locking: the table lock guards membership and admission; each session body
//! has its own lock, written only by the owning worker (rows, terminal state)
//! and `cancel`. Buffer and row count move under one critical section, so a
//! reader never observes a row count ahead of the buffer.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mssql_mcp_core::timefmt;
use mssql_mcp_core::types::session::{SessionFilter, SessionKind, SessionState};
use mssql_mcp_db::execute::RowConsumer;
use mssql_mcp_db::markdown;
use mssql_mcp_db::stream::ColumnInfo;
use mssql_mcp_db::DbError;

/// How long a terminal session is kept before the reaper frees its buffer.
pub const SESSION_RETENTION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("TooManyConcurrentSessions: the maximum of {limit} concurrent sessions are already running")]
    TooManyConcurrentSessions { limit: usize },

    #[error("Session {id} was not found")]
    NotFound { id: u64 },
}

impl SessionError {
    pub fn to_tool_text(&self) -> String {
        format!("Error: {self}")
    }
}

/// What to start.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub kind: SessionKind,
    pub statement: String,
    pub parameters: Option<Value>,
    pub database: Option<String>,
    pub timeout_secs: u32,
}

struct SessionBody {
    state: SessionState,
    ended_at: Option<DateTime<Utc>>,
    row_count: u64,
    buffer: String,
    error: Option<String>,
}

/// One tracked session. Immutable descriptor plus a locked mutable body.
pub struct Session {
    pub id: u64,
    pub kind: SessionKind,
    pub statement: String,
    pub parameters: Option<Value>,
    pub database: Option<String>,
    pub started_at: DateTime<Utc>,
    pub timeout_secs: u32,
    token: CancellationToken,
    body: RwLock<SessionBody>,
}

impl Session {
    fn new(id: u64, spec: NewSession) -> Self {
        Self {
            id,
            kind: spec.kind,
            statement: spec.statement,
            parameters: spec.parameters,
            database: spec.database,
            started_at: Utc::now(),
            timeout_secs: spec.timeout_secs,
            token: CancellationToken::new(),
            body: RwLock::new(SessionBody {
                state: SessionState::Running,
                ended_at: None,
                row_count: 0,
                buffer: String::new(),
                error: None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.body.read().state
    }

    /// Terminal transition; only the first one wins.
    fn finish(&self, state: SessionState, error: Option<String>) {
        debug_assert!(state.is_terminal());
        let mut body = self.body.write();
        if body.state.is_terminal() {
            return;
        }
        body.state = state;
        body.ended_at = Some(Utc::now());
        body.error = error;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let body = self.body.read();
        SessionSnapshot {
            id: self.id,
            kind: self.kind,
            statement: self.statement.clone(),
            parameters: self.parameters.clone(),
            database: self.database.clone(),
            started_at: self.started_at,
            timeout_secs: self.timeout_secs,
            state: body.state,
            ended_at: body.ended_at,
            row_count: body.row_count,
            error: body.error.clone(),
        }
    }

    fn results_text(&self, max_rows: Option<u64>) -> String {
        let body = self.body.read();
        match max_rows {
            Some(max) if body.row_count > max => {
                truncate_buffer(&body.buffer, body.row_count, max)
            }
            _ => {
                let mut text = body.buffer.clone();
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&format!("\nTotal rows: {}", body.row_count));
                text.trim_start().to_string()
            }
        }
    }
}

/// Point-in-time copy of a session's observable state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: u64,
    pub kind: SessionKind,
    pub statement: String,
    pub parameters: Option<Value>,
    pub database: Option<String>,
    pub started_at: DateTime<Utc>,
    pub timeout_secs: u32,
    pub state: SessionState,
    pub ended_at: Option<DateTime<Utc>>,
    pub row_count: u64,
    pub error: Option<String>,
}

impl SessionSnapshot {
    fn database_label(&self) -> String {
        self.database
            .clone()
            .unwrap_or_else(|| "connected database".to_string())
    }

    /// Wire shape returned by `start_query` / `start_stored_procedure`.
    pub fn start_payload(&self) -> Value {
        let what = match self.kind {
            SessionKind::Query => "Query",
            SessionKind::StoredProcedure => "Stored procedure",
        };
        let mut payload = json!({
            "sessionId": self.id,
            "startTime": timefmt::format_utc(self.started_at),
            "databaseName": self.database_label(),
            "timeoutSeconds": self.timeout_secs,
            "status": "running",
            "message": format!(
                "{what} started in background session {}. Poll get_session_status for progress.",
                self.id
            ),
        });
        payload[self.kind.statement_field()] = Value::String(self.statement.clone());
        if let Some(parameters) = &self.parameters {
            payload["parameters"] = parameters.clone();
        }
        payload
    }

    /// Wire shape returned by `get_session_status` (and extended by
    /// `get_session_results`).
    pub fn status_payload(&self) -> Value {
        let end = self.ended_at;
        let duration_end = end.unwrap_or_else(Utc::now);
        let mut payload = json!({
            "sessionId": self.id,
            "startTime": timefmt::format_utc(self.started_at),
            "databaseName": self.database_label(),
            "timeoutSeconds": self.timeout_secs,
            "status": self.state.to_string(),
            "endTime": end.map(timefmt::format_utc),
            "duration": timefmt::format_duration(self.started_at, duration_end),
            "isRunning": self.state == SessionState::Running,
            "rowCount": self.row_count,
            "error": self.error,
        });
        payload[self.kind.statement_field()] = Value::String(self.statement.clone());
        if let Some(parameters) = &self.parameters {
            payload["parameters"] = parameters.clone();
        }
        payload
    }
}

/// Handed to the worker future: the cancel token plus the append-only sink.
pub struct SessionContext {
    session: Arc<Session>,
}

impl SessionContext {
    pub fn token(&self) -> CancellationToken {
        self.session.token.clone()
    }

    pub fn timeout_secs(&self) -> u32 {
        self.session.timeout_secs
    }

    pub fn sink(&self) -> SessionSink {
        SessionSink {
            session: self.session.clone(),
        }
    }
}

/// Append-only writer for the owning worker.
pub struct SessionSink {
    session: Arc<Session>,
}

impl RowConsumer for SessionSink {
    fn on_result_set(&mut self, columns: &[ColumnInfo]) {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let (header, separator) = markdown::header_lines(&names);
        let mut body = self.session.body.write();
        if !body.buffer.is_empty() {
            body.buffer.push('\n');
        }
        body.buffer.push_str(&header);
        body.buffer.push('\n');
        body.buffer.push_str(&separator);
    }

    fn on_row(&mut self, cells: Vec<String>) {
        let line = markdown::row_line(&cells);
        // One critical section: the row count never runs ahead of the buffer.
        let mut body = self.session.body.write();
        if !body.buffer.is_empty() {
            body.buffer.push('\n');
        }
        body.buffer.push_str(&line);
        body.row_count += 1;
    }
}

/// The session table.
pub struct SessionManager {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
    max_concurrent: usize,
}

impl SessionManager {
    pub fn new(max_concurrent: usize) -> Self {
        // Random seed for log-friendliness; only monotonicity matters.
        let seed = rand::rng().random_range(1000..10_000);
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(seed),
            max_concurrent,
        }
    }

    /// Admit and start a session. `work` runs on its own task; its result
    /// drives the terminal transition.
    pub fn start<F, Fut>(&self, spec: NewSession, work: F) -> Result<SessionSnapshot, SessionError>
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: Future<Output = Result<(), DbError>> + Send + 'static,
    {
        let session = {
            let mut sessions = self.sessions.write();
            let running = sessions
                .values()
                .filter(|s| s.state() == SessionState::Running)
                .count();
            if running >= self.max_concurrent {
                warn!(limit = self.max_concurrent, "session admission rejected");
                return Err(SessionError::TooManyConcurrentSessions {
                    limit: self.max_concurrent,
                });
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let session = Arc::new(Session::new(id, spec));
            sessions.insert(id, session.clone());
            session
        };

        info!(
            session = session.id,
            kind = ?session.kind,
            timeout_secs = session.timeout_secs,
            "session started"
        );

        let future = work(SessionContext {
            session: session.clone(),
        });
        let handle = session.clone();
        tokio::spawn(async move {
            match future.await {
                Ok(()) => {
                    handle.finish(SessionState::Completed, None);
                    debug!(session = handle.id, "session completed");
                }
                Err(DbError::Cancelled) => {
                    handle.finish(SessionState::Cancelled, None);
                    info!(session = handle.id, "session cancelled");
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(session = handle.id, error = message.as_str(), "session failed");
                    handle.finish(SessionState::Failed, Some(message));
                }
            }
        });

        Ok(session.snapshot())
    }

    fn get_arc(&self, id: u64) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound { id })
    }

    pub fn get(&self, id: u64) -> Result<SessionSnapshot, SessionError> {
        Ok(self.get_arc(id)?.snapshot())
    }

    /// Snapshot plus the (optionally truncated) result buffer.
    pub fn results(
        &self,
        id: u64,
        max_rows: Option<u64>,
    ) -> Result<(SessionSnapshot, String), SessionError> {
        let session = self.get_arc(id)?;
        let text = session.results_text(max_rows);
        Ok((session.snapshot(), text))
    }

    pub fn list(&self, filter: SessionFilter) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .read()
            .values()
            .map(|s| s.snapshot())
            .filter(|s| filter.matches(s.state))
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Signal a running session to stop. `false` when it is already terminal;
    /// the worker transitions to `cancelled` at its next yield point.
    pub fn cancel(&self, id: u64) -> Result<bool, SessionError> {
        let session = self.get_arc(id)?;
        if session.state().is_terminal() {
            return Ok(false);
        }
        info!(session = id, "cancel requested");
        session.token.cancel();
        Ok(true)
    }

    /// Drop terminal sessions older than the retention window. Returns how
    /// many were removed.
    pub fn reap(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(SESSION_RETENTION).unwrap_or(chrono::Duration::zero());
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            let body = session.body.read();
            match (body.state.is_terminal(), body.ended_at) {
                (true, Some(ended)) => ended > cutoff,
                _ => true,
            }
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "reaped expired sessions");
        }
        removed
    }

    /// Periodic reaper; runs until the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                match manager.upgrade() {
                    Some(manager) => {
                        manager.reap();
                    }
                    None => break,
                }
            }
        })
    }
}

/// First `max` data rows (header counted separately) plus the literal
/// truncation marker.
fn truncate_buffer(buffer: &str, total_rows: u64, max: u64) -> String {
    let lines: Vec<&str> = buffer.lines().collect();
    let header_len = if lines.len() >= 2 && lines.get(1).is_some_and(|l| l.starts_with("| ---")) {
        2
    } else {
        0
    };
    let shown = (max as usize).min(lines.len().saturating_sub(header_len));
    let mut out: Vec<&str> = Vec::with_capacity(header_len + shown + 2);
    out.extend(&lines[..header_len + shown]);

    let marker = format!(
        "... (showing first {} rows of {} total)",
        max.min(total_rows),
        total_rows
    );
    let mut text = out.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(&marker);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(statement: &str) -> NewSession {
        NewSession {
            kind: SessionKind::Query,
            statement: statement.to_string(),
            parameters: None,
            database: None,
            timeout_secs: 30,
        }
    }

    async fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn session_ids_are_monotonic() {
        let manager = SessionManager::new(10);
        let a = manager.start(spec("SELECT 1"), |_| async { Ok(()) }).unwrap();
        let b = manager.start(spec("SELECT 2"), |_| async { Ok(()) }).unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn worker_outcome_drives_terminal_state() {
        let manager = SessionManager::new(10);

        let ok = manager.start(spec("SELECT 1"), |_| async { Ok(()) }).unwrap();
        wait_for(|| manager.get(ok.id).unwrap().state == SessionState::Completed).await;
        let done = manager.get(ok.id).unwrap();
        assert!(done.ended_at.is_some());
        assert!(done.error.is_none());

        let failed = manager
            .start(spec("SELECT bad"), |_| async {
                Err(DbError::Sql {
                    operation: "executing query",
                    message: "Invalid column name 'bad'".to_string(),
                    code: Some(207),
                })
            })
            .unwrap();
        wait_for(|| manager.get(failed.id).unwrap().state == SessionState::Failed).await;
        let done = manager.get(failed.id).unwrap();
        assert_eq!(
            done.error.as_deref(),
            Some("SQL error while executing query: Invalid column name 'bad'")
        );
    }

    #[tokio::test]
    async fn admission_is_bounded_and_recovers() {
        let manager = SessionManager::new(2);

        // Zero permits: both workers block until the test releases them.
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut ids = Vec::new();
        for _ in 0..2 {
            let gate = gate.clone();
            let snapshot = manager
                .start(spec("WAITFOR"), move |_| async move {
                    let _permit = gate.acquire().await;
                    Ok(())
                })
                .unwrap();
            ids.push(snapshot.id);
        }

        let err = manager
            .start(spec("SELECT 1"), |_| async { Ok(()) })
            .unwrap_err();
        assert!(err.to_tool_text().contains("TooManyConcurrentSessions"));

        gate.add_permits(2);
        wait_for(|| {
            manager.get(ids[0]).unwrap().state == SessionState::Completed
                && manager.get(ids[1]).unwrap().state == SessionState::Completed
        })
        .await;

        assert!(manager.start(spec("SELECT 1"), |_| async { Ok(()) }).is_ok());
    }

    #[tokio::test]
    async fn cancel_transitions_at_next_yield_point() {
        let manager = SessionManager::new(10);
        let snapshot = manager
            .start(spec("WAITFOR DELAY '00:01:00'"), |ctx| async move {
                ctx.token().cancelled().await;
                Err(DbError::Cancelled)
            })
            .unwrap();

        assert!(manager.cancel(snapshot.id).unwrap());
        wait_for(|| manager.get(snapshot.id).unwrap().state == SessionState::Cancelled).await;

        let done = manager.get(snapshot.id).unwrap();
        assert!(done.error.is_none());
        assert!(done.ended_at.is_some());

        // Terminal sessions report false without error.
        assert!(!manager.cancel(snapshot.id).unwrap());
    }

    #[tokio::test]
    async fn cancel_unknown_session_is_not_found() {
        let manager = SessionManager::new(10);
        assert!(matches!(
            manager.cancel(99_999),
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn buffer_and_row_count_grow_together() {
        let manager = SessionManager::new(10);
        let columns = vec![
            ColumnInfo {
                name: "n".to_string(),
                type_name: "int",
            },
        ];
        let snapshot = manager
            .start(spec("SELECT n"), move |ctx| async move {
                let mut sink = ctx.sink();
                sink.on_result_set(&columns);
                for i in 0..5 {
                    sink.on_row(vec![i.to_string()]);
                }
                Ok(())
            })
            .unwrap();

        wait_for(|| manager.get(snapshot.id).unwrap().state == SessionState::Completed).await;
        let (done, text) = manager.results(snapshot.id, None).unwrap();
        assert_eq!(done.row_count, 5);
        let data_lines = text.lines().filter(|l| l.starts_with("| ") && !l.starts_with("| ---")).count();
        // header + 5 data rows
        assert_eq!(data_lines as u64, done.row_count + 1);
        assert!(text.contains("| n |"));
        assert!(text.ends_with("Total rows: 5"));
    }

    #[tokio::test]
    async fn results_truncate_to_max_rows_with_marker() {
        let manager = SessionManager::new(10);
        let columns = vec![ColumnInfo {
            name: "n".to_string(),
            type_name: "int",
        }];
        let snapshot = manager
            .start(spec("SELECT n"), move |ctx| async move {
                let mut sink = ctx.sink();
                sink.on_result_set(&columns);
                for i in 0..10 {
                    sink.on_row(vec![i.to_string()]);
                }
                Ok(())
            })
            .unwrap();
        wait_for(|| manager.get(snapshot.id).unwrap().state == SessionState::Completed).await;

        let (_, text) = manager.results(snapshot.id, Some(3)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2 + 3 + 1); // header, separator, 3 rows, marker
        assert_eq!(lines[2], "| 0 |");
        assert_eq!(lines.last().unwrap(), &"... (showing first 3 rows of 10 total)");

        // maxRows=0: header only plus the marker.
        let (_, text) = manager.results(snapshot.id, Some(0)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.last().unwrap(), &"... (showing first 0 rows of 10 total)");
    }

    #[tokio::test]
    async fn partial_results_are_readable_while_running() {
        let manager = SessionManager::new(10);
        let columns = vec![ColumnInfo {
            name: "n".to_string(),
            type_name: "int",
        }];
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let release = gate.clone();
        let snapshot = manager
            .start(spec("SELECT n"), move |ctx| async move {
                let mut sink = ctx.sink();
                sink.on_result_set(&columns);
                sink.on_row(vec!["1".to_string()]);
                let _permit = gate.acquire().await;
                Ok(())
            })
            .unwrap();

        wait_for(|| manager.get(snapshot.id).unwrap().row_count == 1).await;
        let (status, text) = manager.results(snapshot.id, None).unwrap();
        assert_eq!(status.state, SessionState::Running);
        assert!(text.contains("| 1 |"));

        release.add_permits(1);
        wait_for(|| manager.get(snapshot.id).unwrap().state == SessionState::Completed).await;
    }

    #[tokio::test]
    async fn list_filters_by_state() {
        let manager = SessionManager::new(10);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let hold = gate.clone();
        let running = manager
            .start(spec("WAITFOR"), move |_| async move {
                let _permit = hold.acquire().await;
                Ok(())
            })
            .unwrap();
        let done = manager.start(spec("SELECT 1"), |_| async { Ok(()) }).unwrap();
        wait_for(|| manager.get(done.id).unwrap().state == SessionState::Completed).await;

        assert_eq!(manager.list(SessionFilter::All).len(), 2);
        let running_list = manager.list(SessionFilter::Running);
        assert_eq!(running_list.len(), 1);
        assert_eq!(running_list[0].id, running.id);
        let completed_list = manager.list(SessionFilter::Completed);
        assert_eq!(completed_list.len(), 1);
        assert_eq!(completed_list[0].id, done.id);

        gate.add_permits(1);
    }

    #[tokio::test]
    async fn reaper_removes_only_expired_terminal_sessions() {
        let manager = SessionManager::new(10);
        let done = manager.start(spec("SELECT 1"), |_| async { Ok(()) }).unwrap();
        wait_for(|| manager.get(done.id).unwrap().state == SessionState::Completed).await;

        // Fresh terminal session survives.
        assert_eq!(manager.reap(), 0);
        assert!(manager.get(done.id).is_ok());

        // Age it past the retention window.
        {
            let sessions = manager.sessions.read();
            let session = sessions.get(&done.id).unwrap();
            session.body.write().ended_at =
                Some(Utc::now() - chrono::Duration::minutes(16));
        }
        assert_eq!(manager.reap(), 1);
        assert!(matches!(
            manager.get(done.id),
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn start_payload_has_wire_shape() {
        let manager = SessionManager::new(10);
        let snapshot = manager
            .start(spec("SELECT COUNT(*) FROM Customers"), |_| async { Ok(()) })
            .unwrap();
        let payload = snapshot.start_payload();
        assert_eq!(payload["status"], "running");
        assert_eq!(payload["query"], "SELECT COUNT(*) FROM Customers");
        assert_eq!(payload["databaseName"], "connected database");
        assert!(payload["sessionId"].as_u64().unwrap() >= 1000);
        assert!(payload["startTime"].as_str().unwrap().ends_with(" UTC"));
    }

    #[tokio::test]
    async fn status_payload_reports_duration_and_flags() {
        let manager = SessionManager::new(10);
        let snapshot = manager
            .start(spec("SELECT 1"), |_| async { Ok(()) })
            .unwrap();
        wait_for(|| manager.get(snapshot.id).unwrap().state == SessionState::Completed).await;

        let payload = manager.get(snapshot.id).unwrap().status_payload();
        assert_eq!(payload["status"], "completed");
        assert_eq!(payload["isRunning"], false);
        assert_eq!(payload["error"], Value::Null);
        assert!(payload["endTime"].as_str().unwrap().ends_with(" UTC"));
        assert!(payload["duration"].as_str().unwrap().ends_with(" seconds"));
    }

    #[tokio::test]
    async fn stored_procedure_payload_uses_procedure_field() {
        let manager = SessionManager::new(10);
        let snapshot = manager
            .start(
                NewSession {
                    kind: SessionKind::StoredProcedure,
                    statement: "dbo.CreateNewCustomer".to_string(),
                    parameters: Some(json!({"CompanyName": "Acme"})),
                    database: Some("Northwind".to_string()),
                    timeout_secs: 60,
                },
                |_| async { Ok(()) },
            )
            .unwrap();
        let payload = snapshot.start_payload();
        assert_eq!(payload["procedureName"], "dbo.CreateNewCustomer");
        assert_eq!(payload["databaseName"], "Northwind");
        assert_eq!(payload["parameters"]["CompanyName"], "Acme");
        assert!(payload.get("query").is_none());
    }
}
