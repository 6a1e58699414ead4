//! Server capability wire types.
//!
//! Produced by the capability detector in `mssql-mcp-db` and surfaced through
//! the `server_capabilities` tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the target server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentClass {
    AzureSqlDb,
    AzureVm,
    OnPremises,
}

/// Parsed server version and feature surface, cached per connection string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerVersionInfo {
    /// Raw `@@VERSION` banner.
    pub version: String,
    #[serde(rename = "majorVersion")]
    pub major_version: u32,
    #[serde(rename = "minorVersion")]
    pub minor_version: u32,
    #[serde(rename = "buildNumber")]
    pub build_number: u32,
    pub edition: String,
    #[serde(rename = "deploymentClass")]
    pub deployment_class: DeploymentClass,
    /// Name of the connected database, when the connection has one.
    #[serde(rename = "databaseName", skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    /// Feature-name -> supported. BTreeMap keeps the wire order stable.
    pub features: BTreeMap<String, bool>,
}

impl ServerVersionInfo {
    pub fn is_azure_sql_database(&self) -> bool {
        self.deployment_class == DeploymentClass::AzureSqlDb
    }

    pub fn is_azure_vm(&self) -> bool {
        self.deployment_class == DeploymentClass::AzureVm
    }

    pub fn is_on_premises(&self) -> bool {
        self.deployment_class == DeploymentClass::OnPremises
    }

    pub fn supports(&self, feature: &str) -> bool {
        self.features.get(feature).copied().unwrap_or(false)
    }
}

/// Canonical feature-flag names.
pub mod features {
    pub const PARTITIONING: &str = "SupportsPartitioning";
    pub const COLUMNSTORE: &str = "SupportsColumnstoreIndex";
    pub const JSON: &str = "SupportsJson";
    pub const IN_MEMORY_OLTP: &str = "SupportsInMemoryOLTP";
    pub const ROW_LEVEL_SECURITY: &str = "SupportsRowLevelSecurity";
    pub const TEMPORAL_TABLES: &str = "SupportsTemporalTables";
    pub const GRAPH: &str = "SupportsGraphDatabase";
    pub const ALWAYS_ENCRYPTED: &str = "SupportsAlwaysEncrypted";
    pub const QUERY_STORE: &str = "SupportsQueryStore";
    pub const EXACT_ROW_COUNT: &str = "SupportsExactRowCount";
    pub const DETAILED_INDEX_METADATA: &str = "SupportsDetailedIndexMetadata";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_class_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DeploymentClass::AzureSqlDb).unwrap(),
            "\"azure_sql_db\""
        );
    }

    #[test]
    fn supports_defaults_to_false_for_unknown_features() {
        let info = ServerVersionInfo {
            version: "Microsoft SQL Server 2019".to_string(),
            major_version: 15,
            minor_version: 0,
            build_number: 4123,
            edition: "Developer Edition (64-bit)".to_string(),
            deployment_class: DeploymentClass::OnPremises,
            database_name: None,
            features: BTreeMap::new(),
        };
        assert!(!info.supports(features::JSON));
        assert!(info.is_on_premises());
    }
}
