//! Connection acquisition.
//!
//! Every operation, synchronous or background, opens one fresh connection and
//! drops it on exit; nothing in this crate shares a live connection. The
//! connection string is ADO-style and handed to tiberius unchanged.

use std::time::Duration;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::error::DbError;

/// One TDS connection with exclusive ownership.
pub struct SqlConnection {
    client: Client<Compat<TcpStream>>,
}

impl SqlConnection {
    /// Open a connection, bounding both the TCP connect and the TDS login by
    /// `connect_timeout`.
    pub async fn connect(
        connection_string: &str,
        connect_timeout: Duration,
    ) -> Result<Self, DbError> {
        let config = Config::from_ado_string(connection_string).map_err(|e| DbError::Connect {
            message: e.to_string(),
        })?;

        let addr = config.get_addr();
        debug!(%addr, "opening connection");

        let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| DbError::Connect {
                message: format!(
                    "connection attempt to {addr} timed out after {}s",
                    connect_timeout.as_secs()
                ),
            })?
            .map_err(|e| DbError::Connect {
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).map_err(|e| DbError::Connect {
            message: e.to_string(),
        })?;

        let client = tokio::time::timeout(connect_timeout, Client::connect(config, tcp.compat_write()))
            .await
            .map_err(|_| DbError::Connect {
                message: format!(
                    "login to {addr} timed out after {}s",
                    connect_timeout.as_secs()
                ),
            })?
            .map_err(|e| DbError::Connect {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    pub fn client(&mut self) -> &mut Client<Compat<TcpStream>> {
        &mut self.client
    }

    /// True when `name` exists in `sys.databases`.
    pub async fn database_exists(&mut self, name: &str) -> Result<bool, DbError> {
        let row = self
            .client
            .query("SELECT 1 FROM sys.databases WHERE name = @P1", &[&name])
            .await
            .map_err(|e| DbError::from_driver("checking database existence", e))?
            .into_row()
            .await
            .map_err(|e| DbError::from_driver("checking database existence", e))?;
        Ok(row.is_some())
    }

    /// Verify `name` exists, then switch the session's database context.
    ///
    /// `USE` must run as a plain batch: inside `sp_executesql` the context
    /// change would be scoped to the statement and revert immediately.
    pub async fn ensure_database(&mut self, name: &str) -> Result<(), DbError> {
        if !self.database_exists(name).await? {
            return Err(DbError::DatabaseNotFound {
                name: name.to_string(),
            });
        }
        let statement = format!("USE {}", quote_ident(name));
        self.client
            .simple_query(statement)
            .await
            .map_err(|e| DbError::from_driver("switching database", e))?
            .into_results()
            .await
            .map_err(|e| DbError::from_driver("switching database", e))?;
        debug!(database = name, "switched database context");
        Ok(())
    }
}

/// Bracket-quote an identifier, doubling closing brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_closing_brackets() {
        assert_eq!(quote_ident("Orders"), "[Orders]");
        assert_eq!(quote_ident("Odd]Name"), "[Odd]]Name]");
        assert_eq!(quote_ident("semi;colon"), "[semi;colon]");
    }
}
