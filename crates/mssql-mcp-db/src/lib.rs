//! # MSSQL MCP DB
//!
//! The execution core of the MSSQL MCP server: everything that sits between
//! a tool invocation and the TDS driver.
//!
//! - [`connection`]: one fresh tiberius connection per operation, released
//!   on every exit path.
//! - [`timeout`]: composition of default / per-call / total-budget timeouts
//!   into an effective per-command timeout plus a cancellation handle.
//! - [`stream`]: a lazy, forward-only row stream over the driver's native
//!   reader.
//! - [`value`]: display conversion of driver column data.
//! - [`params`]: stored-procedure parameter discovery, JSON binding and
//!   JSON-Schema rendering.
//! - [`capability`]: one-shot server version/feature probe with a TTL cache.
//! - [`execute`]: query and stored-procedure execution plus the read-only
//!   catalog helpers.
//! - [`markdown`]: the Markdown table writer used for tabular results.

pub mod capability;
pub mod connection;
pub mod error;
pub mod execute;
pub mod markdown;
pub mod params;
pub mod stream;
pub mod timeout;
pub mod value;

pub use capability::CapabilityDetector;
pub use connection::SqlConnection;
pub use error::DbError;
pub use execute::{CollectedRows, ExecutionService, QueryOutput, RowConsumer};
pub use params::{BoundParameter, ParameterDescriptor, SqlValue};
pub use timeout::{DefaultCommandTimeout, ToolDeadline};
