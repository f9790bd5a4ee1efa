use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::outcome::{PartitionOutcome, PartitionStatus};
use crate::partition::PartitionScheme;
use crate::warehouse::WarehouseConnector;
use crate::workspace::Workspace;

/// Runs the caller's mutation against every partition concurrently.
///
/// One task per partition, each on its own independently acquired session;
/// tasks share no mutable state. A failing partition is converted into an
/// error outcome instead of aborting its siblings, so rows-affected counts
/// from the healthy partitions are always collected. The call returns only
/// after every task has finished; whether any failure is fatal to the run
/// is the orchestrator's decision, not the executor's.
pub struct ParallelExecutor {
    connector: Arc<dyn WarehouseConnector>,
    source_table: String,
}

struct PartitionJob {
    partition: u32,
    workspace: Option<String>,
    warehouse: Option<String>,
    statement: String,
}

impl ParallelExecutor {
    pub fn new(connector: Arc<dyn WarehouseConnector>, source_table: impl Into<String>) -> Self {
        Self {
            connector,
            source_table: source_table.into(),
        }
    }

    /// Execute the mutation against every workspace, rewriting the source
    /// table's logical name to each workspace's table name.
    pub async fn run(
        &self,
        workspaces: &[Workspace],
        statement: &str,
        warehouses: &[Option<String>],
    ) -> Vec<PartitionOutcome> {
        let jobs = workspaces
            .iter()
            .map(|workspace| PartitionJob {
                partition: workspace.partition,
                workspace: Some(workspace.table.clone()),
                warehouse: warehouses
                    .get(workspace.partition as usize)
                    .cloned()
                    .flatten(),
                statement: rewrite_statement(statement, &self.source_table, &workspace.table),
            })
            .collect();
        self.fan_out(jobs).await
    }

    /// Execute the mutation in place, one partition predicate AND-appended
    /// to the statement's WHERE clause per task. No workspaces are
    /// involved; successful partitions stay applied even if siblings fail.
    pub async fn run_in_place(
        &self,
        scheme: &PartitionScheme,
        statement: &str,
        warehouses: &[Option<String>],
    ) -> Vec<PartitionOutcome> {
        let jobs = (0..scheme.num_partitions())
            .map(|partition| PartitionJob {
                partition,
                workspace: None,
                warehouse: warehouses.get(partition as usize).cloned().flatten(),
                statement: format!("{statement} AND {}", scheme.predicate(partition)),
            })
            .collect();
        self.fan_out(jobs).await
    }

    /// Spawn one task per job and join them all. The barrier is total: no
    /// task outlives this call, and every job yields an outcome.
    async fn fan_out(&self, jobs: Vec<PartitionJob>) -> Vec<PartitionOutcome> {
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let connector = Arc::clone(&self.connector);
            let partition = job.partition;
            handles.push((partition, tokio::spawn(execute_partition(connector, job))));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (partition, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(partition, error = %e, "partition task aborted");
                    outcomes.push(PartitionOutcome {
                        partition,
                        workspace: None,
                        warehouse: None,
                        status: PartitionStatus::Error {
                            detail: format!("task aborted: {e}"),
                        },
                    });
                }
            }
        }
        outcomes
    }
}

async fn execute_partition(
    connector: Arc<dyn WarehouseConnector>,
    job: PartitionJob,
) -> PartitionOutcome {
    let partition = job.partition;
    let mut session = match connector.connect(job.warehouse.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            error!(partition, error = %e, "failed to acquire partition session");
            return PartitionOutcome {
                partition,
                workspace: job.workspace,
                warehouse: job.warehouse,
                status: PartitionStatus::Error {
                    detail: e.to_string(),
                },
            };
        }
    };

    let status = match session.execute(&job.statement).await {
        Ok(rows_affected) => {
            debug!(partition, rows_affected, "partition mutation applied");
            PartitionStatus::Success { rows_affected }
        }
        Err(e) => {
            error!(partition, error = %e, "partition mutation failed");
            PartitionStatus::Error {
                detail: e.to_string(),
            }
        }
    };

    if let Err(e) = session.close().await {
        warn!(partition, error = %e, "failed to close partition session");
    }

    PartitionOutcome {
        partition,
        workspace: job.workspace,
        warehouse: job.warehouse,
        status,
    }
}

/// Exact-match textual substitution of the source table's logical name.
/// Callers must ensure the name appears verbatim and is not ambiguous with
/// column values.
pub(crate) fn rewrite_statement(
    statement: &str,
    source_table: &str,
    workspace_table: &str,
) -> String {
    statement.replace(source_table, workspace_table)
}
