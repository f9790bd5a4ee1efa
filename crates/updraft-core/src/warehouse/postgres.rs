//! Adapter for warehouses speaking the Postgres wire protocol.

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_postgres::NoTls;
use tracing::{debug, warn};

use super::{WarehouseConnector, WarehouseSession};
use crate::config::ConnectionConfig;
use crate::error::WarehouseError;

/// Connector producing one independent [`PgSession`] per call.
pub struct PgConnector {
    config: ConnectionConfig,
}

impl PgConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WarehouseConnector for PgConnector {
    async fn connect(
        &self,
        warehouse: Option<&str>,
    ) -> Result<Box<dyn WarehouseSession>, WarehouseError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .dbname(&self.config.database);
        if let Some(password) = &self.config.password {
            pg.password(password);
        }

        let (client, connection) = timeout(self.config.connect_timeout, pg.connect(NoTls))
            .await
            .map_err(|_| {
                WarehouseError::Timeout(format!(
                    "connecting to {}:{} timed out",
                    self.config.host, self.config.port
                ))
            })?
            .map_err(|e| WarehouseError::Connection(e.to_string()))?;

        // The connection object drives the socket until the client drops.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "warehouse connection closed with error");
            }
        });

        let mut session = PgSession { client };
        if let Some(schema) = &self.config.schema {
            session.execute(&format!("SET search_path TO {schema}")).await?;
        }
        // Workload-group routing: the pg-wire analogue of pointing a
        // partition at a dedicated compute pool.
        if let Some(name) = warehouse.or(self.config.warehouse.as_deref()) {
            session.execute(&format!("SET query_group TO '{name}'")).await?;
        }
        Ok(Box::new(session))
    }
}

/// A single Postgres-wire session.
pub struct PgSession {
    client: tokio_postgres::Client,
}

#[async_trait]
impl WarehouseSession for PgSession {
    async fn execute(&mut self, statement: &str) -> Result<u64, WarehouseError> {
        debug!(statement, "executing");
        self.client
            .execute(statement, &[])
            .await
            .map_err(|e| WarehouseError::Statement(e.to_string()))
    }

    async fn columns(&mut self, table: &str) -> Result<Vec<String>, WarehouseError> {
        let rows = match table.rsplit_once('.') {
            Some((schema, name)) => {
                self.client
                    .query(
                        "SELECT column_name FROM information_schema.columns \
                         WHERE table_schema = $1 AND table_name = $2 \
                         ORDER BY ordinal_position",
                        &[&schema, &name],
                    )
                    .await
            }
            None => {
                self.client
                    .query(
                        "SELECT column_name FROM information_schema.columns \
                         WHERE table_name = $1 ORDER BY ordinal_position",
                        &[&table],
                    )
                    .await
            }
        }
        .map_err(|e| WarehouseError::Statement(e.to_string()))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        // Dropping the client tears down the spawned connection task.
        Ok(())
    }
}
