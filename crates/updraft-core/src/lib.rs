//! # updraft-core
//!
//! Partitioned parallel mutation orchestrator for SQL warehouses.
//!
//! A run splits the target table into disjoint hash partitions, applies the
//! caller's mutation to each partition concurrently against isolated
//! working-copy tables, and merges the results back into the source, with
//! the guarantees that a partial failure never corrupts the source and that
//! the working copies are always dropped, success or failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use updraft_core::{ConnectionConfig, Orchestrator, OrchestratorConfig, PgConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), updraft_core::OrchestratorError> {
//!     let connection = ConnectionConfig::new("localhost", "updraft", "analytics");
//!     let config =
//!         OrchestratorConfig::new(vec!["search_id".into(), "search_dt".into()]);
//!     let orchestrator = Orchestrator::new(Arc::new(PgConnector::new(connection)), config);
//!
//!     let outcome = orchestrator
//!         .parallel_update(
//!             "searches",
//!             "UPDATE searches SET status = 'PROCESSED' WHERE status = 'PENDING'",
//!         )
//!         .await?;
//!     println!("{:?}: {} rows updated", outcome.status, outcome.rows_affected());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod outcome;
pub mod partition;
pub mod reconcile;
pub mod warehouse;
pub mod workspace;

pub use config::{
    ConnectionConfig, OrchestratorConfig, WarehouseAssignment, DEFAULT_NUM_PARTITIONS,
};
pub use error::{OrchestratorError, WarehouseError};
pub use executor::ParallelExecutor;
pub use orchestrator::Orchestrator;
pub use outcome::{
    MergeOutcome, PartitionOutcome, PartitionStatus, RunFailure, RunOutcome, RunStatus,
};
pub use partition::PartitionScheme;
pub use reconcile::Reconciler;
pub use warehouse::postgres::PgConnector;
pub use warehouse::{WarehouseConnector, WarehouseSession};
pub use workspace::{Workspace, WorkspaceManager};
