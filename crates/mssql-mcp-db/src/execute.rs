//! Query and stored-procedure execution plus the read-only catalog helpers.
//!
//! Every public operation opens one fresh connection, drives the row stream
//! to completion (or abandonment on cancel/timeout) and releases the
//! connection when its scope ends, on every exit path. Synchronous
//! operations are guarded by the tool deadline; session runners are guarded
//! by a cancellation token and the session's command timeout only.

use std::time::Duration;
use tiberius::ToSql;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mssql_mcp_core::config::ConnectionProfile;

use crate::capability::ProbeFacts;
use crate::connection::{quote_ident, SqlConnection};
use crate::error::DbError;
use crate::markdown;
use crate::params::{self, bind_parameters, describe, BoundParameter, ParameterDescriptor};
use crate::stream::{ColumnInfo, RowStream};
use crate::timeout::ToolDeadline;
use crate::value;

/// Receiver for result-set boundaries and rendered rows.
///
/// Implementations render with the [`markdown`] helpers; the execution core
/// only hands over column metadata and cell text.
pub trait RowConsumer: Send {
    fn on_result_set(&mut self, columns: &[ColumnInfo]);
    fn on_row(&mut self, cells: Vec<String>);
}

/// Fully-rendered result of a synchronous execution.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub markdown: String,
    pub row_count: u64,
}

/// First result set of a catalog query, as display strings.
#[derive(Debug, Clone)]
pub struct CollectedRows {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<String>>,
}

impl CollectedRows {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Collects rendered table lines for synchronous tools.
#[derive(Debug, Default)]
pub struct MarkdownCollector {
    lines: Vec<String>,
}

impl RowConsumer for MarkdownCollector {
    fn on_result_set(&mut self, columns: &[ColumnInfo]) {
        if !self.lines.is_empty() {
            self.lines.push(String::new());
        }
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let (header, separator) = markdown::header_lines(&names);
        self.lines.push(header);
        self.lines.push(separator);
    }

    fn on_row(&mut self, cells: Vec<String>) {
        self.lines.push(markdown::row_line(&cells));
    }
}

impl MarkdownCollector {
    pub fn into_output(self, row_count: u64) -> QueryOutput {
        let mut markdown = self.lines.join("\n");
        markdown.push_str(&format!("\n\nTotal rows: {row_count}"));
        QueryOutput {
            markdown: markdown.trim_start().to_string(),
            row_count,
        }
    }
}

enum Statement<'a> {
    Batch(&'a str),
    Parameterized {
        sql: &'a str,
        params: &'a [&'a dyn ToSql],
    },
}

const PROBE_SQL: &str = r#"
SELECT @@VERSION AS banner,
       CONVERT(nvarchar(128), SERVERPROPERTY('ProductVersion')) AS product_version,
       CONVERT(nvarchar(128), SERVERPROPERTY('Edition')) AS edition,
       CONVERT(int, SERVERPROPERTY('EngineEdition')) AS engine_edition,
       DB_NAME() AS database_name
"#;

const LIST_DATABASES_SQL: &str = r#"
SELECT name AS [Database], state_desc AS [State],
       recovery_model_desc AS [Recovery Model], create_date AS [Created]
FROM sys.databases
ORDER BY name
"#;

const LIST_TABLES_EXACT_SQL: &str = r#"
SELECT s.name AS [Schema], t.name AS [Table], SUM(ps.row_count) AS [Rows]
FROM sys.tables t
JOIN sys.schemas s ON t.schema_id = s.schema_id
JOIN sys.dm_db_partition_stats ps
  ON ps.object_id = t.object_id AND ps.index_id IN (0, 1)
GROUP BY s.name, t.name
ORDER BY s.name, t.name
"#;

const LIST_TABLES_ESTIMATE_SQL: &str = r#"
SELECT s.name AS [Schema], t.name AS [Table], SUM(p.rows) AS [Rows]
FROM sys.tables t
JOIN sys.schemas s ON t.schema_id = s.schema_id
JOIN sys.partitions p
  ON p.object_id = t.object_id AND p.index_id IN (0, 1)
GROUP BY s.name, t.name
ORDER BY s.name, t.name
"#;

const TABLE_SCHEMA_SQL: &str = r#"
SELECT c.name AS [Column], ty.name AS [Type], c.max_length AS [MaxLength],
       c.precision AS [Precision], c.scale AS [Scale],
       CASE WHEN c.is_nullable = 1 THEN 'YES' ELSE 'NO' END AS [Nullable],
       ISNULL(dc.definition, '') AS [Default],
       CASE WHEN pk.column_id IS NOT NULL THEN 'YES' ELSE '' END AS [PrimaryKey]
FROM sys.columns c
JOIN sys.types ty ON c.user_type_id = ty.user_type_id
JOIN sys.objects o ON o.object_id = c.object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
LEFT JOIN sys.default_constraints dc ON dc.object_id = c.default_object_id
LEFT JOIN (
    SELECT ic.object_id, ic.column_id
    FROM sys.index_columns ic
    JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id
    WHERE i.is_primary_key = 1
) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id
WHERE s.name = @P1 AND o.name = @P2
ORDER BY c.column_id
"#;

const LIST_PROCEDURES_SQL: &str = r#"
SELECT s.name + '.' + p.name AS [Procedure],
       p.create_date AS [Created], p.modify_date AS [Modified]
FROM sys.procedures p
JOIN sys.schemas s ON p.schema_id = s.schema_id
ORDER BY s.name, p.name
"#;

const PROCEDURE_DEFINITION_SQL: &str = r#"
SELECT sm.definition
FROM sys.sql_modules sm
JOIN sys.objects o ON o.object_id = sm.object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
WHERE s.name = @P1 AND o.name = @P2 AND o.type IN ('P', 'PC')
"#;

/// The execution service: one instance per process, no shared connections.
pub struct ExecutionService {
    profile: ConnectionProfile,
}

impl ExecutionService {
    pub fn new(profile: ConnectionProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Open a fresh connection, switching to `database` when given (after an
    /// existence check, so a missing database fails before any statement).
    async fn open(&self, database: Option<&str>) -> Result<SqlConnection, DbError> {
        let mut conn = SqlConnection::connect(
            &self.profile.connection_string,
            Duration::from_secs(self.profile.connection_timeout_secs as u64),
        )
        .await?;
        if let Some(db) = database {
            conn.ensure_database(db).await?;
        }
        Ok(conn)
    }

    /// Execute an ad-hoc SQL batch and render every result set.
    pub async fn execute_query(
        &self,
        sql: &str,
        database: Option<&str>,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<QueryOutput, DbError> {
        let work = async {
            let mut conn = self.open(database).await?;
            let mut collector = MarkdownCollector::default();
            let rows =
                drive_statement(&mut conn, Statement::Batch(sql), "executing query", &mut collector)
                    .await?;
            debug!(rows, "query completed");
            Ok(collector.into_output(rows))
        };
        guarded(deadline, timeout_secs, work).await
    }

    /// Execute a stored procedure with JSON arguments bound by catalog
    /// metadata.
    pub async fn execute_procedure(
        &self,
        procedure: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        database: Option<&str>,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<QueryOutput, DbError> {
        let (schema, name) = params::parse_object_name(procedure)?;
        let work = async {
            let mut conn = self.open(database).await?;
            let descriptors = describe::fetch_descriptors(&mut conn, &schema, &name).await?;
            let bound = bind_parameters(&descriptors, args)?;
            let exec_sql = build_exec_statement(&schema, &name, &bound);
            let refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.value.as_sql()).collect();
            let mut collector = MarkdownCollector::default();
            let rows = drive_statement(
                &mut conn,
                Statement::Parameterized {
                    sql: &exec_sql,
                    params: &refs,
                },
                "executing stored procedure",
                &mut collector,
            )
            .await?;
            debug!(rows, procedure = procedure, "stored procedure completed");
            Ok(collector.into_output(rows))
        };
        guarded(deadline, timeout_secs, work).await
    }

    /// Background variant of [`execute_query`](Self::execute_query): no tool
    /// budget, cancellation via the session token, rows streamed into
    /// `consumer` as they arrive.
    pub async fn run_query_session(
        &self,
        sql: &str,
        database: Option<&str>,
        cancel: &CancellationToken,
        timeout_secs: u32,
        consumer: &mut dyn RowConsumer,
    ) -> Result<u64, DbError> {
        let work = async {
            let mut conn = self.open(database).await?;
            drive_statement(&mut conn, Statement::Batch(sql), "executing query", consumer).await
        };
        session_guarded(cancel, timeout_secs, work).await
    }

    /// Background variant of [`execute_procedure`](Self::execute_procedure).
    pub async fn run_procedure_session(
        &self,
        procedure: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        database: Option<&str>,
        cancel: &CancellationToken,
        timeout_secs: u32,
        consumer: &mut dyn RowConsumer,
    ) -> Result<u64, DbError> {
        let (schema, name) = params::parse_object_name(procedure)?;
        let work = async {
            let mut conn = self.open(database).await?;
            let descriptors = describe::fetch_descriptors(&mut conn, &schema, &name).await?;
            let bound = bind_parameters(&descriptors, args)?;
            let exec_sql = build_exec_statement(&schema, &name, &bound);
            let refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.value.as_sql()).collect();
            drive_statement(
                &mut conn,
                Statement::Parameterized {
                    sql: &exec_sql,
                    params: &refs,
                },
                "executing stored procedure",
                consumer,
            )
            .await
        };
        session_guarded(cancel, timeout_secs, work).await
    }

    /// True when `name` exists in `sys.databases`.
    pub async fn database_exists(
        &self,
        name: &str,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<bool, DbError> {
        let work = async {
            let mut conn = self.open(None).await?;
            conn.database_exists(name).await
        };
        guarded(deadline, timeout_secs, work).await
    }

    pub async fn list_databases(
        &self,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<String, DbError> {
        let work = async {
            let mut conn = self.open(None).await?;
            let collected = collect(&mut conn, LIST_DATABASES_SQL, &[], "listing databases").await?;
            Ok(markdown::render_table(
                &collected.column_names(),
                &collected.rows,
            ))
        };
        guarded(deadline, timeout_secs, work).await
    }

    /// List user tables with row counts; exact counts come from partition
    /// stats when the capability probe says they are supported, otherwise the
    /// partition estimate is used.
    pub async fn list_tables(
        &self,
        database: Option<&str>,
        use_exact_counts: bool,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<String, DbError> {
        let sql = if use_exact_counts {
            LIST_TABLES_EXACT_SQL
        } else {
            LIST_TABLES_ESTIMATE_SQL
        };
        let work = async {
            let mut conn = self.open(database).await?;
            let collected = collect(&mut conn, sql, &[], "listing tables").await?;
            Ok(markdown::render_table(
                &collected.column_names(),
                &collected.rows,
            ))
        };
        guarded(deadline, timeout_secs, work).await
    }

    pub async fn get_table_schema(
        &self,
        table: &str,
        database: Option<&str>,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<String, DbError> {
        let (schema, name) = params::parse_object_name(table)?;
        let work = async {
            let mut conn = self.open(database).await?;
            let collected = collect(
                &mut conn,
                TABLE_SCHEMA_SQL,
                &[&schema.as_str(), &name.as_str()],
                "reading table schema",
            )
            .await?;
            if collected.rows.is_empty() {
                return Err(DbError::InvalidObjectName {
                    name: format!("{schema}.{name}"),
                });
            }
            Ok(markdown::render_table(
                &collected.column_names(),
                &collected.rows,
            ))
        };
        guarded(deadline, timeout_secs, work).await
    }

    pub async fn list_stored_procedures(
        &self,
        database: Option<&str>,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<String, DbError> {
        let work = async {
            let mut conn = self.open(database).await?;
            let mut collected = collect(
                &mut conn,
                LIST_PROCEDURES_SQL,
                &[],
                "listing stored procedures",
            )
            .await?;
            // Timestamps and the N/A fallback share one fixed width so the
            // table stays aligned.
            for row in collected.rows.iter_mut() {
                for cell in row.iter_mut().skip(1) {
                    let text = if cell.as_str() == value::NULL_CELL {
                        "N/A"
                    } else {
                        cell.as_str()
                    };
                    *cell = fixed_width(text, TIMESTAMP_WIDTH);
                }
            }
            Ok(markdown::render_table(
                &collected.column_names(),
                &collected.rows,
            ))
        };
        guarded(deadline, timeout_secs, work).await
    }

    pub async fn get_procedure_definition(
        &self,
        procedure: &str,
        database: Option<&str>,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<String, DbError> {
        let (schema, name) = params::parse_object_name(procedure)?;
        let work = async {
            const OPERATION: &str = "reading stored procedure definition";
            let mut conn = self.open(database).await?;
            let row = conn
                .client()
                .query(PROCEDURE_DEFINITION_SQL, &[&schema.as_str(), &name.as_str()])
                .await
                .map_err(|e| DbError::from_driver(OPERATION, e))?
                .into_row()
                .await
                .map_err(|e| DbError::from_driver(OPERATION, e))?;
            match row {
                Some(row) => {
                    let definition: Option<&str> = row
                        .try_get(0)
                        .map_err(|e| DbError::from_driver(OPERATION, e))?;
                    Ok(definition.unwrap_or_default().to_string())
                }
                None => Err(DbError::ProcedureNotFound {
                    name: format!("{schema}.{name}"),
                }),
            }
        };
        guarded(deadline, timeout_secs, work).await
    }

    /// Descriptor list for a stored procedure, for the parameter tools.
    pub async fn describe_procedure(
        &self,
        procedure: &str,
        database: Option<&str>,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<Vec<ParameterDescriptor>, DbError> {
        let (schema, name) = params::parse_object_name(procedure)?;
        let work = async {
            let mut conn = self.open(database).await?;
            describe::fetch_descriptors(&mut conn, &schema, &name).await
        };
        guarded(deadline, timeout_secs, work).await
    }

    /// Raw capability probe, run on its own connection. The detector caches
    /// the derived record.
    pub async fn probe_facts(
        &self,
        deadline: &ToolDeadline,
        timeout_secs: u32,
    ) -> Result<ProbeFacts, DbError> {
        let work = async {
            let mut conn = self.open(None).await?;
            let collected =
                collect(&mut conn, PROBE_SQL, &[], "probing server capabilities").await?;
            let row = collected
                .rows
                .first()
                .ok_or_else(|| DbError::CapabilityProbe("probe returned no rows".to_string()))?;
            Ok(ProbeFacts {
                banner: row.first().cloned().unwrap_or_default(),
                product_version: row.get(1).cloned().unwrap_or_default(),
                edition: row.get(2).cloned().unwrap_or_default(),
                engine_edition: row
                    .get(3)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                database_name: row
                    .get(4)
                    .filter(|s| s.as_str() != value::NULL_CELL)
                    .cloned(),
            })
        };
        guarded(deadline, timeout_secs, work).await
    }
}

/// Width timestamps are padded to in `list_stored_procedures` output.
const TIMESTAMP_WIDTH: usize = 19;

fn fixed_width(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    while out.chars().count() < width {
        out.push(' ');
    }
    out
}

/// `EXEC [schema].[name] @A = @P1, @B = @P2, ...`
fn build_exec_statement(schema: &str, name: &str, bound: &[BoundParameter]) -> String {
    let assignments: Vec<String> = bound
        .iter()
        .enumerate()
        .map(|(i, p)| format!("@{} = @P{}", p.name, i + 1))
        .collect();
    let mut sql = format!("EXEC {}.{}", quote_ident(schema), quote_ident(name));
    if !assignments.is_empty() {
        sql.push(' ');
        sql.push_str(&assignments.join(", "));
    }
    sql
}

/// Run `work` under the synchronous-tool guards: effective command timeout,
/// total tool budget and external cancel, in that preference order.
async fn guarded<T>(
    deadline: &ToolDeadline,
    timeout_secs: u32,
    work: impl std::future::Future<Output = Result<T, DbError>>,
) -> Result<T, DbError> {
    tokio::select! {
        biased;
        _ = deadline.budget_elapsed() => Err(deadline.budget_error()),
        _ = deadline.token().cancelled() => Err(DbError::Cancelled),
        outcome = tokio::time::timeout(Duration::from_secs(timeout_secs as u64), work) => {
            match outcome {
                Ok(result) => result.map_err(|e| deadline.classify(e)),
                Err(_) => Err(deadline.classify(DbError::CommandTimeout { timeout_secs })),
            }
        }
    }
}

/// Run `work` under the background-session guards: command timeout and the
/// session's cancel token. The tool budget does not apply here.
async fn session_guarded<T>(
    cancel: &CancellationToken,
    timeout_secs: u32,
    work: impl std::future::Future<Output = Result<T, DbError>>,
) -> Result<T, DbError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DbError::Cancelled),
        outcome = tokio::time::timeout(Duration::from_secs(timeout_secs as u64), work) => {
            match outcome {
                Ok(result) => result,
                Err(_) => Err(DbError::CommandTimeout { timeout_secs }),
            }
        }
    }
}

/// Drive a statement to completion, feeding every result set into
/// `consumer`. Returns the total row count across sets.
async fn drive_statement(
    conn: &mut SqlConnection,
    statement: Statement<'_>,
    operation: &'static str,
    consumer: &mut dyn RowConsumer,
) -> Result<u64, DbError> {
    let wrap = move |e| DbError::from_driver(operation, e);

    let stream = match statement {
        Statement::Batch(sql) => conn.client().simple_query(sql).await,
        Statement::Parameterized { sql, params } => conn.client().query(sql, params).await,
    }
    .map_err(wrap)?;

    let mut rows = RowStream::start(stream).await.map_err(wrap)?;
    let mut total = 0u64;
    loop {
        if !rows.column_metadata().is_empty() {
            let columns = rows.column_metadata().to_vec();
            consumer.on_result_set(&columns);
        }
        while let Some(row) = rows.read_next().await.map_err(wrap)? {
            let cells: Vec<String> = row.into_iter().map(value::cell_text).collect();
            consumer.on_row(cells);
            total += 1;
        }
        if !rows.next_result_set().await.map_err(wrap)? {
            break;
        }
    }
    Ok(total)
}

/// Collect the first result set of a catalog query as display strings.
async fn collect(
    conn: &mut SqlConnection,
    sql: &str,
    params: &[&dyn ToSql],
    operation: &'static str,
) -> Result<CollectedRows, DbError> {
    let wrap = move |e| DbError::from_driver(operation, e);

    let stream = if params.is_empty() {
        conn.client().simple_query(sql).await
    } else {
        conn.client().query(sql, params).await
    }
    .map_err(wrap)?;

    let mut stream = RowStream::start(stream).await.map_err(wrap)?;
    let columns = stream.column_metadata().to_vec();
    let mut rows = Vec::new();
    while let Some(row) = stream.read_next().await.map_err(wrap)? {
        rows.push(row.into_iter().map(value::cell_text).collect());
    }
    Ok(CollectedRows { columns, rows })
}
