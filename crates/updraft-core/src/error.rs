use thiserror::Error;

/// Errors surfaced by the orchestrator.
///
/// Partition execution failures are deliberately absent: they never cross
/// the task boundary and are collected into per-partition outcomes instead.
/// Cleanup failures are logged, never raised.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid partition or warehouse arguments. Raised before any store
    /// call is made.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A partition's working copy could not be materialized. The run aborts
    /// before any mutation executes.
    #[error("workspace creation failed for partition {partition}: {detail}")]
    WorkspaceCreation { partition: u32, detail: String },

    /// The merge phase failed after all partitions succeeded. The completion
    /// state is ambiguous: a partial merge cannot be told apart from a full
    /// one, so callers must re-verify the source table manually.
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),
}

/// Errors at the warehouse client boundary.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Statement execution error.
    #[error("statement error: {0}")]
    Statement(String),

    /// Timeout error.
    #[error("timeout: {0}")]
    Timeout(String),
}
