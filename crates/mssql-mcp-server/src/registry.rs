//! Tool registry.
//!
//! Built once at startup from the connection profile: the mode decides
//! between scope-less tools (database mode) and `_in_database` variants
//! (server mode), the enablement flags gate the execute/start tools, and the
//! session tools register only when at least one start tool is enabled.

use serde_json::{json, Value};

use mssql_mcp_core::config::{ConnectionProfile, ServerMode};
use mssql_mcp_core::types::tools::Tool;

fn database_name_property() -> Value {
    json!({
        "type": "string",
        "description": "Name of the database to run against"
    })
}

fn timeout_property() -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "maximum": 3600,
        "description": "Command timeout in seconds for this call (overrides the default)"
    })
}

/// Object schema with the given properties/required lists.
fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// In server mode tools take an explicit database and carry the
/// `_in_database` suffix.
fn scoped_name(base: &str, mode: ServerMode) -> String {
    match mode {
        ServerMode::Database => base.to_string(),
        ServerMode::Server => format!("{base}_in_database"),
    }
}

/// Build the full tool set for this profile.
pub fn build_registry(profile: &ConnectionProfile) -> Vec<Tool> {
    let mode = profile.mode;
    let mut tools = Vec::new();

    // Always registered.
    tools.push(
        Tool::new(
            "server_capabilities",
            "Report SQL Server version, edition, deployment class and feature support",
            object_schema(json!({}), &[]),
        )
        .read_only(),
    );
    tools.push(
        Tool::new(
            "get_command_timeout",
            "Show the default command timeout applied to new calls",
            object_schema(json!({}), &[]),
        )
        .read_only(),
    );
    tools.push(Tool::new(
        "set_command_timeout",
        "Change the default command timeout (seconds, 1-3600) for subsequent calls",
        object_schema(
            json!({
                "timeoutSeconds": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 3600,
                    "description": "New default command timeout in seconds"
                }
            }),
            &["timeoutSeconds"],
        ),
    ));

    if mode == ServerMode::Server {
        tools.push(
            Tool::new(
                "list_databases",
                "List all databases on the server with state and recovery model",
                object_schema(json!({}), &[]),
            )
            .read_only(),
        );
    }

    // Read-only schema tools, scoped per mode.
    let with_scope = |base: &str,
                          description: &str,
                          mut properties: serde_json::Map<String, Value>,
                          required: &[&str]| {
        let mut required: Vec<&str> = required.to_vec();
        if mode == ServerMode::Server {
            properties.insert("databaseName".to_string(), database_name_property());
            required.push("databaseName");
        }
        Tool::new(
            scoped_name(base, mode),
            description,
            object_schema(Value::Object(properties), &required),
        )
    };

    let props = |value: Value| value.as_object().cloned().unwrap_or_default();

    tools.push(
        with_scope(
            "list_tables",
            "List tables with row counts",
            props(json!({})),
            &[],
        )
        .read_only(),
    );
    tools.push(
        with_scope(
            "get_table_schema",
            "Describe a table's columns, types, nullability, defaults and primary key",
            props(json!({
                "tableName": {
                    "type": "string",
                    "description": "Table name, optionally schema-qualified (default schema dbo)"
                }
            })),
            &["tableName"],
        )
        .read_only(),
    );
    tools.push(
        with_scope(
            "list_stored_procedures",
            "List stored procedures with creation and modification times",
            props(json!({})),
            &[],
        )
        .read_only(),
    );
    tools.push(
        with_scope(
            "get_stored_procedure_definition",
            "Return the T-SQL definition of a stored procedure",
            props(json!({
                "procedureName": {
                    "type": "string",
                    "description": "Procedure name, optionally schema-qualified (default schema dbo)"
                }
            })),
            &["procedureName"],
        )
        .read_only(),
    );
    tools.push(
        with_scope(
            "get_stored_procedure_parameters",
            "Describe a stored procedure's parameters as a table or JSON Schema",
            props(json!({
                "procedureName": {
                    "type": "string",
                    "description": "Procedure name, optionally schema-qualified (default schema dbo)"
                },
                "format": {
                    "type": "string",
                    "enum": ["table", "json"],
                    "description": "Output format (default table)"
                }
            })),
            &["procedureName"],
        )
        .read_only(),
    );

    if profile.enable_execute_query {
        tools.push(with_scope(
            "execute_query",
            "Execute a SQL query and return results as a Markdown table",
            props(json!({
                "query": { "type": "string", "description": "SQL query to execute" },
                "timeoutSeconds": timeout_property()
            })),
            &["query"],
        ));
    }
    if profile.enable_execute_stored_procedure {
        tools.push(with_scope(
            "execute_stored_procedure",
            "Execute a stored procedure with JSON parameters and return its result sets",
            props(json!({
                "procedureName": {
                    "type": "string",
                    "description": "Procedure name, optionally schema-qualified (default schema dbo)"
                },
                "parameters": {
                    "type": "object",
                    "description": "Parameter values by name; names match case-insensitively with or without '@'"
                },
                "timeoutSeconds": timeout_property()
            })),
            &["procedureName"],
        ));
    }
    if profile.enable_start_query {
        tools.push(with_scope(
            "start_query",
            "Start a SQL query in a background session and return its session id",
            props(json!({
                "query": { "type": "string", "description": "SQL query to execute" },
                "timeoutSeconds": timeout_property()
            })),
            &["query"],
        ));
    }
    if profile.enable_start_stored_procedure {
        tools.push(with_scope(
            "start_stored_procedure",
            "Start a stored procedure in a background session and return its session id",
            props(json!({
                "procedureName": {
                    "type": "string",
                    "description": "Procedure name, optionally schema-qualified (default schema dbo)"
                },
                "parameters": {
                    "type": "object",
                    "description": "Parameter values by name; names match case-insensitively with or without '@'"
                },
                "timeoutSeconds": timeout_property()
            })),
            &["procedureName"],
        ));
    }

    // Session management registers only when something can start sessions.
    if profile.any_start_tool_enabled() {
        let session_id = json!({
            "sessionId": {
                "type": "integer",
                "description": "Session id returned by a start tool"
            }
        });
        tools.push(
            Tool::new(
                "get_session_status",
                "Report state, row count and timing of a background session",
                object_schema(session_id.clone(), &["sessionId"]),
            )
            .read_only(),
        );
        tools.push(
            Tool::new(
                "get_session_results",
                "Fetch the (optionally truncated) results of a background session",
                object_schema(
                    json!({
                        "sessionId": {
                            "type": "integer",
                            "description": "Session id returned by a start tool"
                        },
                        "maxRows": {
                            "type": "integer",
                            "minimum": 0,
                            "description": "Return at most this many rows"
                        }
                    }),
                    &["sessionId"],
                ),
            )
            .read_only(),
        );
        tools.push(Tool::new(
            "stop_session",
            "Request cancellation of a running background session",
            object_schema(session_id, &["sessionId"]),
        ));
        tools.push(
            Tool::new(
                "list_sessions",
                "List background sessions, optionally filtered by state",
                object_schema(
                    json!({
                        "filter": {
                            "type": "string",
                            "enum": ["all", "running", "completed"],
                            "description": "Which sessions to include (default all)"
                        }
                    }),
                    &[],
                ),
            )
            .read_only(),
        );
    }

    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_mcp_core::config::keys;
    use std::collections::{HashMap, HashSet};

    fn profile(conn: &str, flags: &[(&'static str, &str)]) -> ConnectionProfile {
        let mut map = HashMap::new();
        map.insert(keys::CONNECTION_STRING.to_string(), conn.to_string());
        for (key, value) in flags {
            map.insert(key.to_string(), value.to_string());
        }
        ConnectionProfile::from_map(&map).unwrap()
    }

    fn names(tools: &[Tool]) -> HashSet<String> {
        tools.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn database_mode_registers_scope_less_read_only_tools() {
        let tools = build_registry(&profile("Server=h;Database=app;", &[]));
        let names = names(&tools);
        assert!(names.contains("list_tables"));
        assert!(names.contains("get_table_schema"));
        assert!(names.contains("server_capabilities"));
        assert!(names.contains("set_command_timeout"));
        // no scope variants, no list_databases, nothing enabled or gated
        assert!(!names.contains("list_tables_in_database"));
        assert!(!names.contains("list_databases"));
        assert!(!names.contains("execute_query"));
        assert!(!names.contains("get_session_status"));
    }

    #[test]
    fn server_mode_registers_in_database_variants() {
        let tools = build_registry(&profile("Server=h;", &[]));
        let names = names(&tools);
        assert!(names.contains("list_databases"));
        assert!(names.contains("list_tables_in_database"));
        assert!(names.contains("get_stored_procedure_parameters_in_database"));
        assert!(!names.contains("list_tables"));
        assert!(!names.contains("execute_query_in_database"));
    }

    #[test]
    fn execute_flags_gate_the_execute_tools() {
        let tools = build_registry(&profile(
            "Server=h;Database=app;",
            &[
                (keys::ENABLE_EXECUTE_QUERY, "true"),
                (keys::ENABLE_EXECUTE_STORED_PROCEDURE, "true"),
            ],
        ));
        let names = names(&tools);
        assert!(names.contains("execute_query"));
        assert!(names.contains("execute_stored_procedure"));
        assert!(!names.contains("start_query"));
        assert!(!names.contains("get_session_status"));
    }

    #[test]
    fn session_tools_register_when_any_start_tool_is_enabled() {
        let tools = build_registry(&profile(
            "Server=h;Database=app;",
            &[(keys::ENABLE_START_QUERY, "true")],
        ));
        let names = names(&tools);
        assert!(names.contains("start_query"));
        assert!(!names.contains("start_stored_procedure"));
        for session_tool in [
            "get_session_status",
            "get_session_results",
            "stop_session",
            "list_sessions",
        ] {
            assert!(names.contains(session_tool), "missing {session_tool}");
        }
    }

    #[test]
    fn server_mode_start_tools_require_database_name() {
        let tools = build_registry(&profile(
            "Server=h;",
            &[(keys::ENABLE_START_QUERY, "true")],
        ));
        let tool = tools
            .iter()
            .find(|t| t.name == "start_query_in_database")
            .expect("start_query_in_database registered");
        let required = tool.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "databaseName"));
        assert!(required.iter().any(|v| v == "query"));
    }

    #[test]
    fn every_tool_has_a_schema_and_description() {
        let tools = build_registry(&profile(
            "Server=h;",
            &[
                (keys::ENABLE_EXECUTE_QUERY, "true"),
                (keys::ENABLE_EXECUTE_STORED_PROCEDURE, "true"),
                (keys::ENABLE_START_QUERY, "true"),
                (keys::ENABLE_START_STORED_PROCEDURE, "true"),
            ],
        ));
        for tool in &tools {
            assert!(!tool.description.is_empty(), "{} lacks description", tool.name);
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        }
        // full server-mode surface
        let names = names(&tools);
        assert_eq!(names.len(), tools.len(), "duplicate tool names");
        assert!(names.contains("execute_stored_procedure_in_database"));
        assert!(names.contains("start_stored_procedure_in_database"));
    }
}
