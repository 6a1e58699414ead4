//! Server capability detection.
//!
//! One probe per connection string per TTL window: version banner,
//! `SERVERPROPERTY` facts and the current database, parsed into version
//! digits and threshold-derived feature flags. Concurrent callers share the
//! in-flight probe; failures are never cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use mssql_mcp_core::types::capabilities::{features, DeploymentClass, ServerVersionInfo};

use crate::error::DbError;

/// How long a successful probe stays fresh.
pub const CAPABILITY_TTL: Duration = Duration::from_secs(60 * 60);

/// Raw facts read from the server, before derivation.
#[derive(Debug, Clone)]
pub struct ProbeFacts {
    pub banner: String,
    pub product_version: String,
    pub edition: String,
    pub engine_edition: i32,
    pub database_name: Option<String>,
}

struct CacheEntry {
    info: ServerVersionInfo,
    fetched_at: Instant,
}

/// Memoizing detector, keyed by connection string.
pub struct CapabilityDetector {
    ttl: Duration,
    cache: Mutex<HashMap<String, Arc<Mutex<Option<CacheEntry>>>>>,
}

impl Default for CapabilityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityDetector {
    pub fn new() -> Self {
        Self::with_ttl(CAPABILITY_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached capability for `key`, probing via `probe` on a miss.
    ///
    /// The per-key mutex serializes concurrent misses so the probe runs at
    /// most once per expiry; a probe error leaves the slot empty and the next
    /// caller retries.
    pub async fn detect<F, Fut>(&self, key: &str, probe: F) -> Result<ServerVersionInfo, DbError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<ProbeFacts, DbError>>,
    {
        let slot = {
            let mut cache = self.cache.lock().await;
            cache.entry(key.to_string()).or_default().clone()
        };

        let mut entry = slot.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!("capability cache hit");
                return Ok(cached.info.clone());
            }
        }

        let facts = probe().await.map_err(|e| match e {
            probe_err @ DbError::CapabilityProbe(_) => probe_err,
            other => DbError::CapabilityProbe(other.to_string()),
        })?;
        let info = build_info(facts);
        info!(
            major = info.major_version,
            edition = info.edition.as_str(),
            "detected server capabilities"
        );
        *entry = Some(CacheEntry {
            info: info.clone(),
            fetched_at: Instant::now(),
        });
        Ok(info)
    }
}

/// Derive the capability record from raw probe facts.
pub fn build_info(facts: ProbeFacts) -> ServerVersionInfo {
    let (major, minor, build) = parse_version(&facts.product_version);
    let deployment = classify_deployment(facts.engine_edition, &facts.banner);
    let feature_map = feature_flags(major, &facts.edition, deployment);
    ServerVersionInfo {
        version: facts.banner,
        major_version: major,
        minor_version: minor,
        build_number: build,
        edition: facts.edition,
        deployment_class: deployment,
        database_name: facts.database_name,
        features: feature_map,
    }
}

/// Parse `"16.0.1000.6"`-style product versions; missing digits are zero.
pub fn parse_version(product_version: &str) -> (u32, u32, u32) {
    let mut digits = product_version
        .split('.')
        .map(|part| part.trim().parse::<u32>().unwrap_or(0));
    (
        digits.next().unwrap_or(0),
        digits.next().unwrap_or(0),
        digits.next().unwrap_or(0),
    )
}

/// `SERVERPROPERTY('EngineEdition')`: 5 is Azure SQL Database, 8 is Managed
/// Instance (treated as Azure SQL), anything else is a full engine that may
/// still be hosted on an Azure VM, which only the banner reveals.
pub fn classify_deployment(engine_edition: i32, banner: &str) -> DeploymentClass {
    match engine_edition {
        5 | 8 => DeploymentClass::AzureSqlDb,
        _ if banner.contains("Azure") => DeploymentClass::AzureVm,
        _ => DeploymentClass::OnPremises,
    }
}

/// Feature flags by version threshold. Azure SQL Database tracks the newest
/// engine regardless of its reported major version.
pub fn feature_flags(
    major: u32,
    edition: &str,
    deployment: DeploymentClass,
) -> BTreeMap<String, bool> {
    let azure = deployment == DeploymentClass::AzureSqlDb;
    let at_least = |threshold: u32| azure || major >= threshold;
    let premium_edition = edition.contains("Enterprise") || edition.contains("Developer");

    let mut map = BTreeMap::new();
    map.insert(features::PARTITIONING.to_string(), at_least(13) || premium_edition);
    map.insert(features::COLUMNSTORE.to_string(), at_least(11));
    map.insert(features::JSON.to_string(), at_least(13));
    map.insert(features::IN_MEMORY_OLTP.to_string(), at_least(12));
    map.insert(features::ROW_LEVEL_SECURITY.to_string(), at_least(13));
    map.insert(features::TEMPORAL_TABLES.to_string(), at_least(13));
    map.insert(features::GRAPH.to_string(), at_least(14));
    map.insert(features::ALWAYS_ENCRYPTED.to_string(), at_least(13));
    map.insert(features::QUERY_STORE.to_string(), at_least(13));
    map.insert(features::EXACT_ROW_COUNT.to_string(), at_least(11));
    map.insert(features::DETAILED_INDEX_METADATA.to_string(), at_least(12));
    map
}
