//! Warehouse client boundary.
//!
//! The orchestrator consumes the warehouse through these two traits and
//! never inspects statement results beyond rows-affected counts, success or
//! failure, and the column listing the reconciler needs for its schema
//! inspection.

use async_trait::async_trait;

use crate::error::WarehouseError;

pub mod postgres;

/// One session against the backing store.
#[async_trait]
pub trait WarehouseSession: Send {
    /// Execute a statement, returning the number of rows affected.
    async fn execute(&mut self, statement: &str) -> Result<u64, WarehouseError>;

    /// Column names of a table, in declaration order.
    async fn columns(&mut self, table: &str) -> Result<Vec<String>, WarehouseError>;

    /// Close the session.
    async fn close(&mut self) -> Result<(), WarehouseError>;
}

/// Opens independent sessions; every parallel partition task acquires its
/// own.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Open a session, optionally routed to a named warehouse instead of
    /// the connection's default.
    async fn connect(
        &self,
        warehouse: Option<&str>,
    ) -> Result<Box<dyn WarehouseSession>, WarehouseError>;
}
