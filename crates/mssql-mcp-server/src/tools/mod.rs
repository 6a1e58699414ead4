//! Tool implementations.
//!
//! One handler owns the execution service, the session manager, the
//! capability detector and the runtime-tunable default timeout, and routes
//! every `tools/call` by name. Database-side failures become tool *text*
//! (`"Error: …"` with `isError`), never JSON-RPC errors; only unknown tools
//! and malformed requests surface at the protocol level.

pub mod args;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use mssql_mcp_core::config::{ConnectionProfile, ServerMode};
use mssql_mcp_core::error::{McpError, McpResult};
use mssql_mcp_core::types::capabilities::features;
use mssql_mcp_core::types::session::SessionKind;
use mssql_mcp_core::types::tools::{ListToolsResponse, Tool, ToolCall, ToolResult};
use mssql_mcp_db::{
    CapabilityDetector, DbError, DefaultCommandTimeout, ExecutionService, ToolDeadline,
};

use crate::handlers::ToolHandler;
use crate::registry;
use crate::sessions::{NewSession, SessionManager};
use args::*;

/// The SQL Server tool surface.
pub struct SqlServerTools {
    service: Arc<ExecutionService>,
    sessions: Arc<SessionManager>,
    detector: Arc<CapabilityDetector>,
    default_timeout: Arc<DefaultCommandTimeout>,
    tools: Vec<Tool>,
}

impl SqlServerTools {
    pub fn new(profile: ConnectionProfile) -> Self {
        let tools = registry::build_registry(&profile);
        let sessions = Arc::new(SessionManager::new(profile.max_concurrent_sessions));
        let default_timeout = Arc::new(DefaultCommandTimeout::new(
            profile.default_command_timeout_secs,
        ));
        Self {
            service: Arc::new(ExecutionService::new(profile)),
            sessions,
            detector: Arc::new(CapabilityDetector::new()),
            default_timeout,
            tools,
        }
    }

    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    fn profile(&self) -> &ConnectionProfile {
        self.service.profile()
    }

    /// Fresh deadline for one synchronous invocation.
    fn deadline(&self) -> ToolDeadline {
        ToolDeadline::new(self.profile().total_tool_call_timeout_secs)
    }

    fn registered(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Resolve the database argument. In server mode the `_in_database`
    /// variants require an explicit name; in database mode the connection's
    /// initial catalog applies and callers pass nothing.
    fn resolve_database(&self, scoped: bool, database: Option<String>) -> Result<Option<String>, DbError> {
        if !scoped {
            return Ok(None);
        }
        match database {
            Some(name) if !name.trim().is_empty() => Ok(Some(name)),
            _ => Err(DbError::empty_argument("Database name")),
        }
    }

    /// Session timeout: caller-supplied or current default; the tool-call
    /// budget deliberately does not apply to background sessions.
    fn session_timeout(&self, override_secs: Option<u32>) -> Result<u32, DbError> {
        match override_secs {
            None => Ok(self.default_timeout.get()),
            Some(secs) => {
                if !(1..=3600).contains(&secs) {
                    return Err(DbError::TimeoutOutOfRange {
                        value: secs as u64,
                        min: 1,
                        max: 3600,
                    });
                }
                Ok(secs)
            }
        }
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> McpResult<ToolResult> {
        if !self.registered(name) {
            return Err(McpError::tool_not_found(name));
        }
        let (base, scoped) = match name.strip_suffix("_in_database") {
            Some(base) => (base, true),
            None => (name, false),
        };
        debug!(tool = name, "dispatching tool call");

        let result = match base {
            "server_capabilities" => self.server_capabilities().await,
            "get_command_timeout" => Ok(ToolResult::text(format!(
                "Default command timeout: {} seconds",
                self.default_timeout.get()
            ))),
            "set_command_timeout" => self.set_command_timeout(parse(arguments)?),
            "list_databases" => self.list_databases().await,
            "list_tables" => self.list_tables(parse(arguments)?, scoped).await,
            "get_table_schema" => self.get_table_schema(parse(arguments)?, scoped).await,
            "list_stored_procedures" => {
                self.list_stored_procedures(parse(arguments)?, scoped).await
            }
            "get_stored_procedure_definition" => {
                self.get_procedure_definition(parse(arguments)?, scoped).await
            }
            "get_stored_procedure_parameters" => {
                self.get_procedure_parameters(parse(arguments)?, scoped).await
            }
            "execute_query" => self.execute_query(parse(arguments)?, scoped).await,
            "execute_stored_procedure" => {
                self.execute_stored_procedure(parse(arguments)?, scoped).await
            }
            "start_query" => self.start_query(parse(arguments)?, scoped),
            "start_stored_procedure" => self.start_stored_procedure(parse(arguments)?, scoped),
            "get_session_status" => self.get_session_status(parse(arguments)?),
            "get_session_results" => self.get_session_results(parse(arguments)?),
            "stop_session" => self.stop_session(parse(arguments)?),
            "list_sessions" => self.list_sessions(parse(arguments)?),
            _ => return Err(McpError::tool_not_found(name)),
        };

        Ok(result.unwrap_or_else(|e| ToolResult::error(e.to_tool_text())))
    }

    async fn server_capabilities(&self) -> Result<ToolResult, DbError> {
        let deadline = self.deadline();
        let timeout = deadline.effective_timeout(None, self.default_timeout.get())?;
        let profile = self.profile();
        let info = self
            .detector
            .detect(&profile.connection_string, || {
                self.service.probe_facts(&deadline, timeout)
            })
            .await?;

        let mut payload = json!({
            "version": format!(
                "{}.{}.{}",
                info.major_version, info.minor_version, info.build_number
            ),
            "majorVersion": info.major_version,
            "minorVersion": info.minor_version,
            "buildNumber": info.build_number,
            "edition": info.edition,
            "isAzureSqlDatabase": info.is_azure_sql_database(),
            "isAzureVmSqlServer": info.is_azure_vm(),
            "isOnPremisesSqlServer": info.is_on_premises(),
            "toolMode": profile.mode.to_string(),
            "features": info.features,
        });
        if profile.mode == ServerMode::Database {
            if let Some(catalog) = &profile.initial_catalog {
                payload["databaseName"] = Value::String(catalog.clone());
            }
        }
        Ok(ToolResult::json(&payload))
    }

    fn set_command_timeout(&self, args: SetTimeoutArgs) -> Result<ToolResult, DbError> {
        self.default_timeout.set(args.timeout_seconds)?;
        Ok(ToolResult::text(format!(
            "Default command timeout set to {} seconds. Commands already in flight keep their original timeout.",
            args.timeout_seconds
        )))
    }

    async fn list_databases(&self) -> Result<ToolResult, DbError> {
        let deadline = self.deadline();
        let timeout = deadline.effective_timeout(None, self.default_timeout.get())?;
        let table = self.service.list_databases(&deadline, timeout).await?;
        Ok(ToolResult::text(table))
    }

    async fn list_tables(&self, args: ScopeArgs, scoped: bool) -> Result<ToolResult, DbError> {
        let database = self.resolve_database(scoped, args.database_name)?;
        let deadline = self.deadline();
        let timeout = deadline.effective_timeout(None, self.default_timeout.get())?;
        let exact = self
            .detector
            .detect(&self.profile().connection_string, || {
                self.service.probe_facts(&deadline, timeout)
            })
            .await
            .map(|info| info.supports(features::EXACT_ROW_COUNT))
            .unwrap_or(false);
        let table = self
            .service
            .list_tables(database.as_deref(), exact, &deadline, timeout)
            .await?;
        Ok(ToolResult::text(table))
    }

    async fn get_table_schema(&self, args: TableArgs, scoped: bool) -> Result<ToolResult, DbError> {
        if args.table_name.trim().is_empty() {
            return Err(DbError::empty_argument("Table name"));
        }
        let database = self.resolve_database(scoped, args.database_name)?;
        let deadline = self.deadline();
        let timeout = deadline.effective_timeout(None, self.default_timeout.get())?;
        let table = self
            .service
            .get_table_schema(&args.table_name, database.as_deref(), &deadline, timeout)
            .await?;
        Ok(ToolResult::text(table))
    }

    async fn list_stored_procedures(
        &self,
        args: ScopeArgs,
        scoped: bool,
    ) -> Result<ToolResult, DbError> {
        let database = self.resolve_database(scoped, args.database_name)?;
        let deadline = self.deadline();
        let timeout = deadline.effective_timeout(None, self.default_timeout.get())?;
        let table = self
            .service
            .list_stored_procedures(database.as_deref(), &deadline, timeout)
            .await?;
        Ok(ToolResult::text(table))
    }

    async fn get_procedure_definition(
        &self,
        args: ProcedureArgs,
        scoped: bool,
    ) -> Result<ToolResult, DbError> {
        if args.procedure_name.trim().is_empty() {
            return Err(DbError::empty_argument("Procedure name"));
        }
        let database = self.resolve_database(scoped, args.database_name)?;
        let deadline = self.deadline();
        let timeout = deadline.effective_timeout(None, self.default_timeout.get())?;
        let definition = self
            .service
            .get_procedure_definition(&args.procedure_name, database.as_deref(), &deadline, timeout)
            .await?;
        Ok(ToolResult::text(format!("```sql\n{definition}\n```")))
    }

    async fn get_procedure_parameters(
        &self,
        args: ProcedureArgs,
        scoped: bool,
    ) -> Result<ToolResult, DbError> {
        if args.procedure_name.trim().is_empty() {
            return Err(DbError::empty_argument("Procedure name"));
        }
        let database = self.resolve_database(scoped, args.database_name)?;
        let deadline = self.deadline();
        let timeout = deadline.effective_timeout(None, self.default_timeout.get())?;
        let descriptors = self
            .service
            .describe_procedure(&args.procedure_name, database.as_deref(), &deadline, timeout)
            .await?;

        match args.format.as_deref().unwrap_or("table") {
            "json" => Ok(ToolResult::json(
                &mssql_mcp_db::params::schema::parameters_json(&args.procedure_name, &descriptors),
            )),
            _ => Ok(ToolResult::text(
                mssql_mcp_db::params::schema::parameters_markdown(
                    &args.procedure_name,
                    &descriptors,
                ),
            )),
        }
    }

    async fn execute_query(&self, args: QueryArgs, scoped: bool) -> Result<ToolResult, DbError> {
        if args.query.trim().is_empty() {
            return Err(DbError::empty_argument("Query"));
        }
        let database = self.resolve_database(scoped, args.database_name)?;
        let deadline = self.deadline();
        let timeout =
            deadline.effective_timeout(args.timeout_seconds, self.default_timeout.get())?;
        let output = self
            .service
            .execute_query(&args.query, database.as_deref(), &deadline, timeout)
            .await?;
        Ok(ToolResult::text(output.markdown))
    }

    async fn execute_stored_procedure(
        &self,
        args: ProcedureArgs,
        scoped: bool,
    ) -> Result<ToolResult, DbError> {
        if args.procedure_name.trim().is_empty() {
            return Err(DbError::empty_argument("Procedure name"));
        }
        let database = self.resolve_database(scoped, args.database_name)?;
        let deadline = self.deadline();
        let timeout =
            deadline.effective_timeout(args.timeout_seconds, self.default_timeout.get())?;
        let parameters = args.parameters.unwrap_or_default();
        let output = self
            .service
            .execute_procedure(
                &args.procedure_name,
                &parameters,
                database.as_deref(),
                &deadline,
                timeout,
            )
            .await?;
        Ok(ToolResult::text(output.markdown))
    }

    fn start_query(&self, args: QueryArgs, scoped: bool) -> Result<ToolResult, DbError> {
        if args.query.trim().is_empty() {
            return Err(DbError::empty_argument("Query"));
        }
        let database = self.resolve_database(scoped, args.database_name)?;
        let timeout = self.session_timeout(args.timeout_seconds)?;

        let spec = NewSession {
            kind: SessionKind::Query,
            statement: args.query.clone(),
            parameters: None,
            database: database.clone(),
            timeout_secs: timeout,
        };
        let service = self.service.clone();
        let started = self.sessions.start(spec, move |ctx| async move {
            let token = ctx.token();
            let mut sink = ctx.sink();
            service
                .run_query_session(&args.query, database.as_deref(), &token, timeout, &mut sink)
                .await
                .map(|_| ())
        });
        Ok(match started {
            Ok(snapshot) => ToolResult::json(&snapshot.start_payload()),
            Err(e) => ToolResult::error(e.to_tool_text()),
        })
    }

    fn start_stored_procedure(
        &self,
        args: ProcedureArgs,
        scoped: bool,
    ) -> Result<ToolResult, DbError> {
        if args.procedure_name.trim().is_empty() {
            return Err(DbError::empty_argument("Procedure name"));
        }
        let database = self.resolve_database(scoped, args.database_name)?;
        let timeout = self.session_timeout(args.timeout_seconds)?;
        let parameters = args.parameters.unwrap_or_default();

        let spec = NewSession {
            kind: SessionKind::StoredProcedure,
            statement: args.procedure_name.clone(),
            parameters: Some(Value::Object(parameters.clone())),
            database: database.clone(),
            timeout_secs: timeout,
        };
        let service = self.service.clone();
        let started = self.sessions.start(spec, move |ctx| async move {
            let token = ctx.token();
            let mut sink = ctx.sink();
            service
                .run_procedure_session(
                    &args.procedure_name,
                    &parameters,
                    database.as_deref(),
                    &token,
                    timeout,
                    &mut sink,
                )
                .await
                .map(|_| ())
        });
        Ok(match started {
            Ok(snapshot) => ToolResult::json(&snapshot.start_payload()),
            Err(e) => ToolResult::error(e.to_tool_text()),
        })
    }

    fn get_session_status(&self, args: SessionIdArgs) -> Result<ToolResult, DbError> {
        Ok(match self.sessions.get(args.session_id) {
            Ok(snapshot) => ToolResult::json(&snapshot.status_payload()),
            Err(e) => ToolResult::error(e.to_tool_text()),
        })
    }

    fn get_session_results(&self, args: SessionResultsArgs) -> Result<ToolResult, DbError> {
        Ok(match self.sessions.results(args.session_id, args.max_rows) {
            Ok((snapshot, results)) => {
                let mut payload = snapshot.status_payload();
                payload["results"] = Value::String(results);
                ToolResult::json(&payload)
            }
            Err(e) => ToolResult::error(e.to_tool_text()),
        })
    }

    fn stop_session(&self, args: SessionIdArgs) -> Result<ToolResult, DbError> {
        Ok(match self.sessions.cancel(args.session_id) {
            Ok(stopped) => {
                let message = if stopped {
                    format!("Cancellation requested for session {}", args.session_id)
                } else {
                    format!("Session {} had already finished", args.session_id)
                };
                ToolResult::json(&json!({
                    "sessionId": args.session_id,
                    "stopped": stopped,
                    "message": message,
                }))
            }
            Err(e) => ToolResult::error(e.to_tool_text()),
        })
    }

    fn list_sessions(&self, args: ListSessionsArgs) -> Result<ToolResult, DbError> {
        let snapshots = self.sessions.list(args.filter.unwrap_or_default());
        let sessions: Vec<Value> = snapshots.iter().map(|s| s.status_payload()).collect();
        Ok(ToolResult::json(&json!({
            "count": sessions.len(),
            "sessions": sessions,
        })))
    }
}

fn parse<T: serde::de::DeserializeOwned>(arguments: Value) -> McpResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| McpError::invalid_params(format!("invalid tool arguments: {e}")))
}

#[async_trait]
impl ToolHandler for SqlServerTools {
    async fn handle_tool_call(&self, call: ToolCall) -> McpResult<ToolResult> {
        let arguments = call.arguments.unwrap_or_else(|| json!({}));
        self.dispatch(&call.name, arguments).await
    }

    async fn list_tools(&self) -> McpResult<ListToolsResponse> {
        Ok(ListToolsResponse {
            tools: self.tools.clone(),
        })
    }
}
