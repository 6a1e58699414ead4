//! Tool argument shapes.
//!
//! Wire fields are camelCase; unknown fields are tolerated so clients that
//! send extras don't break.

use serde::Deserialize;
use serde_json::{Map, Value};

use mssql_mcp_core::types::session::SessionFilter;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryArgs {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureArgs {
    #[serde(default)]
    pub procedure_name: String,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    /// `table` (default) or `json`; only the parameters tool reads it.
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableArgs {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub database_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeArgs {
    #[serde(default)]
    pub database_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdArgs {
    pub session_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResultsArgs {
    pub session_id: u64,
    #[serde(default)]
    pub max_rows: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsArgs {
    #[serde(default)]
    pub filter: Option<SessionFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTimeoutArgs {
    pub timeout_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_fields_parse() {
        let args: QueryArgs = serde_json::from_value(json!({
            "query": "SELECT 1",
            "databaseName": "app",
            "timeoutSeconds": 45
        }))
        .unwrap();
        assert_eq!(args.query, "SELECT 1");
        assert_eq!(args.database_name.as_deref(), Some("app"));
        assert_eq!(args.timeout_seconds, Some(45));
    }

    #[test]
    fn missing_optionals_default() {
        let args: ProcedureArgs = serde_json::from_value(json!({
            "procedureName": "dbo.GetOrders"
        }))
        .unwrap();
        assert!(args.parameters.is_none());
        assert!(args.timeout_seconds.is_none());
        assert!(args.format.is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let args: SessionIdArgs =
            serde_json::from_value(json!({"sessionId": 42, "extra": true})).unwrap();
        assert_eq!(args.session_id, 42);
    }

    #[test]
    fn session_filter_parses_lowercase() {
        let args: ListSessionsArgs =
            serde_json::from_value(json!({"filter": "running"})).unwrap();
        assert_eq!(args.filter, Some(SessionFilter::Running));
    }
}
