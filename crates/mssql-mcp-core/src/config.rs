//! Connection profile and configuration loading.
//!
//! Configuration comes from environment variables overlaid on an optional
//! flat JSON file carrying the same keys; the environment wins. The profile
//! is immutable for the process lifetime, with one exception: the default
//! command timeout is runtime-tunable through the `set_command_timeout` tool
//! and therefore lives behind an atomic owned by the timeout controller, not
//! here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Configuration keys. Environment variable names and JSON file keys match.
pub mod keys {
    pub const CONNECTION_STRING: &str = "MSSQL_CONNECTIONSTRING";
    pub const ENABLE_EXECUTE_QUERY: &str = "DatabaseConfiguration__EnableExecuteQuery";
    pub const ENABLE_EXECUTE_STORED_PROCEDURE: &str =
        "DatabaseConfiguration__EnableExecuteStoredProcedure";
    pub const ENABLE_START_QUERY: &str = "DatabaseConfiguration__EnableStartQuery";
    pub const ENABLE_START_STORED_PROCEDURE: &str =
        "DatabaseConfiguration__EnableStartStoredProcedure";
    pub const DEFAULT_COMMAND_TIMEOUT: &str =
        "DatabaseConfiguration__DefaultCommandTimeoutSeconds";
    pub const CONNECTION_TIMEOUT: &str = "DatabaseConfiguration__ConnectionTimeoutSeconds";
    pub const MAX_CONCURRENT_SESSIONS: &str = "DatabaseConfiguration__MaxConcurrentSessions";
    pub const SESSION_CLEANUP_INTERVAL: &str =
        "DatabaseConfiguration__SessionCleanupIntervalMinutes";
    pub const TOTAL_TOOL_CALL_TIMEOUT: &str =
        "DatabaseConfiguration__TotalToolCallTimeoutSeconds";
}

/// Tool scoping mode, derived once at startup from the connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// No initial catalog: tools take an explicit database name.
    Server,
    /// Initial catalog present: tools run against the connected database.
    Database,
}

impl std::fmt::Display for ServerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerMode::Server => f.write_str("server"),
            ServerMode::Database => f.write_str("database"),
        }
    }
}

/// Process-wide connection profile, immutable after init.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    pub connection_string: String,
    pub mode: ServerMode,
    /// Initial catalog parsed from the connection string, if any.
    pub initial_catalog: Option<String>,

    pub enable_execute_query: bool,
    pub enable_execute_stored_procedure: bool,
    pub enable_start_query: bool,
    pub enable_start_stored_procedure: bool,

    /// Startup value for the runtime-tunable default command timeout.
    pub default_command_timeout_secs: u32,
    pub connection_timeout_secs: u32,
    /// Wall-clock ceiling for one synchronous tool call; `None` disables it.
    pub total_tool_call_timeout_secs: Option<u32>,

    pub max_concurrent_sessions: usize,
    pub session_cleanup_interval_minutes: u64,
}

impl ConnectionProfile {
    /// True when at least one background start tool is enabled, which is what
    /// gates registration of the session-management tools.
    pub fn any_start_tool_enabled(&self) -> bool {
        self.enable_start_query || self.enable_start_stored_procedure
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required", keys::CONNECTION_STRING)]
    MissingConnectionString,

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read configuration file {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },

    #[error("configuration file {path} is not a flat JSON object: {source}")]
    FileFormat {
        path: String,
        source: serde_json::Error,
    },
}

impl ConnectionProfile {
    /// Load from the process environment overlaid on an optional JSON file.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut map = match config_file {
            Some(path) => read_config_file(path)?,
            None => HashMap::new(),
        };
        // env wins over file
        map.extend(std::env::vars());
        Self::from_map(&map)
    }

    /// Build a profile from a resolved key/value map. Pure; tests use this
    /// directly instead of mutating the process environment.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let connection_string = map
            .get(keys::CONNECTION_STRING)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingConnectionString)?;

        let initial_catalog = initial_catalog(&connection_string);
        let mode = match initial_catalog {
            Some(_) => ServerMode::Database,
            None => ServerMode::Server,
        };

        let default_command_timeout_secs =
            parse_u32(map, keys::DEFAULT_COMMAND_TIMEOUT, 30, 1, 3600)?;
        let connection_timeout_secs = parse_u32(map, keys::CONNECTION_TIMEOUT, 15, 1, 3600)?;
        let max_concurrent_sessions = parse_u32(map, keys::MAX_CONCURRENT_SESSIONS, 10, 1, 1000)?;
        let session_cleanup_interval_minutes =
            parse_u32(map, keys::SESSION_CLEANUP_INTERVAL, 60, 1, 24 * 60)?;

        // Documented default is 120 seconds; an explicit 0 disables the budget.
        let total_tool_call_timeout_secs = match map.get(keys::TOTAL_TOOL_CALL_TIMEOUT) {
            None => Some(120),
            Some(raw) if raw.trim().is_empty() || raw.trim() == "0" => None,
            Some(raw) => Some(parse_u32_raw(keys::TOTAL_TOOL_CALL_TIMEOUT, raw, 1, 3600)?),
        };

        Ok(Self {
            connection_string,
            mode,
            initial_catalog,
            enable_execute_query: parse_bool(map, keys::ENABLE_EXECUTE_QUERY, false)?,
            enable_execute_stored_procedure: parse_bool(
                map,
                keys::ENABLE_EXECUTE_STORED_PROCEDURE,
                false,
            )?,
            enable_start_query: parse_bool(map, keys::ENABLE_START_QUERY, false)?,
            enable_start_stored_procedure: parse_bool(
                map,
                keys::ENABLE_START_STORED_PROCEDURE,
                false,
            )?,
            default_command_timeout_secs,
            connection_timeout_secs,
            total_tool_call_timeout_secs,
            max_concurrent_sessions: max_concurrent_sessions as usize,
            session_cleanup_interval_minutes: session_cleanup_interval_minutes as u64,
        })
    }
}

/// Extract the initial catalog from an ADO-style connection string.
///
/// `Database=` and `Initial Catalog=` match case-insensitively; a
/// whitespace-only value counts as absent.
pub fn initial_catalog(connection_string: &str) -> Option<String> {
    for pair in connection_string.split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key == "database" || key == "initial catalog" {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn read_config_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
        path: path.display().to_string(),
        source,
    })?;
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_str(&text).map_err(|source| ConfigError::FileFormat {
            path: path.display().to_string(),
            source,
        })?;
    // Scalars only; numbers and booleans are stringified so the file and the
    // environment go through one parser.
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, s)
        })
        .collect())
}

fn parse_bool(
    map: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: "expected \"true\" or \"false\"".to_string(),
            }),
        },
    }
}

fn parse_u32(
    map: &HashMap<String, String>,
    key: &'static str,
    default: u32,
    min: u32,
    max: u32,
) -> Result<u32, ConfigError> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => parse_u32_raw(key, raw, min, max),
    }
}

fn parse_u32_raw(key: &'static str, raw: &str, min: u32, max: u32) -> Result<u32, ConfigError> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "expected an integer".to_string(),
        })?;
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: format!("expected a value in [{min}, {max}]"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_map() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            keys::CONNECTION_STRING.to_string(),
            "Server=localhost;User Id=sa;Password=x;TrustServerCertificate=True;".to_string(),
        );
        map
    }

    #[test]
    fn connection_string_is_required() {
        let err = ConnectionProfile::from_map(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConnectionString));
    }

    #[test]
    fn defaults_apply_when_keys_absent() {
        let profile = ConnectionProfile::from_map(&base_map()).unwrap();
        assert_eq!(profile.mode, ServerMode::Server);
        assert!(!profile.enable_execute_query);
        assert_eq!(profile.default_command_timeout_secs, 30);
        assert_eq!(profile.connection_timeout_secs, 15);
        assert_eq!(profile.max_concurrent_sessions, 10);
        assert_eq!(profile.session_cleanup_interval_minutes, 60);
        assert_eq!(profile.total_tool_call_timeout_secs, Some(120));
    }

    #[test]
    fn initial_catalog_selects_database_mode() {
        let mut map = base_map();
        map.insert(
            keys::CONNECTION_STRING.to_string(),
            "Server=localhost;Initial Catalog=Northwind;User Id=sa;Password=x;".to_string(),
        );
        let profile = ConnectionProfile::from_map(&map).unwrap();
        assert_eq!(profile.mode, ServerMode::Database);
        assert_eq!(profile.initial_catalog.as_deref(), Some("Northwind"));
    }

    #[test]
    fn whitespace_only_database_counts_as_absent() {
        let mut map = base_map();
        map.insert(
            keys::CONNECTION_STRING.to_string(),
            "Server=localhost;Database=   ;User Id=sa;Password=x;".to_string(),
        );
        let profile = ConnectionProfile::from_map(&map).unwrap();
        assert_eq!(profile.mode, ServerMode::Server);
        assert!(profile.initial_catalog.is_none());
    }

    #[test]
    fn database_key_is_case_insensitive() {
        assert_eq!(
            initial_catalog("server=h;DATABASE=Orders;"),
            Some("Orders".to_string())
        );
        assert_eq!(
            initial_catalog("server=h;initial CATALOG=Orders;"),
            Some("Orders".to_string())
        );
        assert_eq!(initial_catalog("server=h;"), None);
    }

    #[test]
    fn booleans_parse_case_insensitively() {
        let mut map = base_map();
        map.insert(keys::ENABLE_EXECUTE_QUERY.to_string(), "TRUE".to_string());
        map.insert(keys::ENABLE_START_QUERY.to_string(), "False".to_string());
        let profile = ConnectionProfile::from_map(&map).unwrap();
        assert!(profile.enable_execute_query);
        assert!(!profile.enable_start_query);
    }

    #[test]
    fn malformed_numeric_is_rejected() {
        let mut map = base_map();
        map.insert(
            keys::DEFAULT_COMMAND_TIMEOUT.to_string(),
            "soon".to_string(),
        );
        assert!(ConnectionProfile::from_map(&map).is_err());
    }

    #[test]
    fn command_timeout_bounds_are_enforced() {
        for bad in ["0", "3601"] {
            let mut map = base_map();
            map.insert(keys::DEFAULT_COMMAND_TIMEOUT.to_string(), bad.to_string());
            assert!(ConnectionProfile::from_map(&map).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn zero_total_timeout_disables_budget() {
        let mut map = base_map();
        map.insert(keys::TOTAL_TOOL_CALL_TIMEOUT.to_string(), "0".to_string());
        let profile = ConnectionProfile::from_map(&map).unwrap();
        assert_eq!(profile.total_tool_call_timeout_secs, None);
    }

    #[test]
    fn session_tools_gate_on_start_flags() {
        let mut map = base_map();
        map.insert(
            keys::ENABLE_START_STORED_PROCEDURE.to_string(),
            "true".to_string(),
        );
        let profile = ConnectionProfile::from_map(&map).unwrap();
        assert!(profile.any_start_tool_enabled());
    }

    #[test]
    fn file_values_are_overridden_by_env_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            serde_json::json!({
                keys::CONNECTION_STRING: "Server=from-file;",
                keys::MAX_CONCURRENT_SESSIONS: 4,
                keys::ENABLE_EXECUTE_QUERY: true
            })
        )
        .unwrap();

        let mut map = read_config_file(file.path()).unwrap();
        // simulate the environment overlay
        map.insert(
            keys::CONNECTION_STRING.to_string(),
            "Server=from-env;Database=app;".to_string(),
        );

        let profile = ConnectionProfile::from_map(&map).unwrap();
        assert_eq!(profile.connection_string, "Server=from-env;Database=app;");
        assert_eq!(profile.mode, ServerMode::Database);
        assert_eq!(profile.max_concurrent_sessions, 4);
        assert!(profile.enable_execute_query);
    }
}
