use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::partition::PartitionScheme;
use crate::warehouse::WarehouseSession;

/// Ephemeral working copy of one partition's rows. Owned exclusively by the
/// run that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub partition: u32,
    pub table: String,
}

/// A failed workspace materialization.
#[derive(Debug)]
pub struct WorkspaceFailure {
    pub partition: u32,
    pub detail: String,
}

impl From<WorkspaceFailure> for OrchestratorError {
    fn from(failure: WorkspaceFailure) -> Self {
        OrchestratorError::WorkspaceCreation {
            partition: failure.partition,
            detail: failure.detail,
        }
    }
}

/// Creates and tears down the working-copy tables of one run.
///
/// Workspaces are ordinary tables, not TEMPORARY ones: the mutation phase
/// runs each partition on its own session, and session-scoped tables would
/// be invisible there. The run suffix keeps names collision-free across
/// concurrent runs; unconditional teardown keeps them from outliving the
/// run.
pub struct WorkspaceManager {
    source_table: String,
    run_id: String,
    num_partitions: u32,
    created: Vec<Workspace>,
}

impl WorkspaceManager {
    pub fn new(
        source_table: impl Into<String>,
        run_id: impl Into<String>,
        num_partitions: u32,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            run_id: run_id.into(),
            num_partitions,
            created: Vec::new(),
        }
    }

    /// Name of the working-copy table for one partition.
    pub fn workspace_table(&self, partition: u32) -> String {
        format!("tmp_{}_p{}", self.run_id, partition)
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.created
    }

    /// Materialize one working copy per partition, sequentially. On the
    /// first failure every workspace of the run is dropped before the error
    /// is returned, so no partial state survives the call.
    pub async fn create_all(
        &mut self,
        session: &mut dyn WarehouseSession,
        scheme: &PartitionScheme,
    ) -> Result<&[Workspace], WorkspaceFailure> {
        for partition in 0..self.num_partitions {
            let table = self.workspace_table(partition);
            let statement = format!(
                "CREATE TABLE {table} AS SELECT * FROM {source} WHERE {predicate}",
                source = self.source_table,
                predicate = scheme.predicate(partition),
            );
            match session.execute(&statement).await {
                Ok(rows) => {
                    debug!(partition, table = %table, rows, "workspace created");
                    self.created.push(Workspace { partition, table });
                }
                Err(e) => {
                    self.destroy_all(session).await;
                    return Err(WorkspaceFailure {
                        partition,
                        detail: e.to_string(),
                    });
                }
            }
        }
        Ok(&self.created)
    }

    /// Drop every workspace of the run, best effort. Each drop is
    /// independent: one failure does not stop the others, and failures are
    /// logged, never raised, so cleanup can never mask the primary result.
    /// Idempotent, including after a partial `create_all`.
    pub async fn destroy_all(&mut self, session: &mut dyn WarehouseSession) {
        for partition in 0..self.num_partitions {
            let table = self.workspace_table(partition);
            match session.execute(&format!("DROP TABLE IF EXISTS {table}")).await {
                Ok(_) => debug!(partition, table = %table, "workspace dropped"),
                Err(e) => {
                    warn!(partition, table = %table, error = %e, "failed to drop workspace")
                }
            }
        }
        self.created.clear();
    }
}
