use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};

use crate::config::{validate_table_name, OrchestratorConfig};
use crate::error::OrchestratorError;
use crate::executor::ParallelExecutor;
use crate::outcome::{RunFailure, RunOutcome, RunStatus};
use crate::partition::PartitionScheme;
use crate::reconcile::Reconciler;
use crate::warehouse::WarehouseConnector;
use crate::workspace::WorkspaceManager;

/// Top-level state machine for one parallel mutation run.
///
/// Phases: validate, materialize workspaces, execute the mutation on every
/// partition concurrently, and (only if every partition succeeded) merge
/// the workspaces back into the source. Workspace teardown runs on every
/// path out of the execute and merge phases, success or failure.
///
/// The run assumes no concurrent writer touches the source dataset or the
/// workspaces while it is in flight; there is no external-writer isolation.
pub struct Orchestrator {
    connector: Arc<dyn WarehouseConnector>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(connector: Arc<dyn WarehouseConnector>, config: OrchestratorConfig) -> Self {
        Self { connector, config }
    }

    /// Run a mutation statement across all partitions through isolated
    /// working copies, then reconcile the results into `table`.
    ///
    /// The statement must reference `table` by its verbatim name; the
    /// executor substitutes each workspace's name for it. If any partition
    /// fails, the merge is skipped and nothing is written back.
    ///
    /// Only configuration errors fail the call itself; every other failure
    /// is reported inside the returned [`RunOutcome`].
    pub async fn parallel_update(
        &self,
        table: &str,
        statement: &str,
    ) -> Result<RunOutcome, OrchestratorError> {
        let warehouses = self.config.validate()?;
        validate_table_name(table)?;
        if !statement.contains(table) {
            return Err(OrchestratorError::Configuration(format!(
                "mutation statement does not reference table '{table}'"
            )));
        }
        let scheme = PartitionScheme::new(&self.config.key_columns, self.config.num_partitions)?;
        let run_id = generate_run_id();
        info!(
            run_id = %run_id,
            table,
            partitions = self.config.num_partitions,
            "starting parallel update"
        );

        let mut control = match self.connector.connect(None).await {
            Ok(session) => session,
            Err(e) => {
                return Ok(RunOutcome {
                    run_id,
                    status: RunStatus::Error,
                    partitions: Vec::new(),
                    merge: None,
                    failure: Some(RunFailure::Connection {
                        detail: e.to_string(),
                    }),
                })
            }
        };

        let mut manager = WorkspaceManager::new(table, run_id.clone(), scheme.num_partitions());
        let workspaces = match manager.create_all(control.as_mut(), &scheme).await {
            Ok(workspaces) => workspaces.to_vec(),
            Err(failure) => {
                // create_all has already dropped the partial state
                if let Err(e) = control.close().await {
                    warn!(error = %e, "failed to close control session");
                }
                return Ok(RunOutcome {
                    run_id,
                    status: RunStatus::Error,
                    partitions: Vec::new(),
                    merge: None,
                    failure: Some(RunFailure::WorkspaceCreation {
                        partition: failure.partition,
                        detail: failure.detail,
                    }),
                });
            }
        };

        let executor = ParallelExecutor::new(Arc::clone(&self.connector), table);
        let partitions = executor.run(&workspaces, statement, &warehouses).await;

        let failed: Vec<u32> = partitions
            .iter()
            .filter(|p| !p.status.is_success())
            .map(|p| p.partition)
            .collect();

        let (merge, failure) = if failed.is_empty() {
            let reconciler = Reconciler::new(table, self.config.key_columns.clone());
            match reconciler.merge(control.as_mut(), &workspaces).await {
                Ok(merge) => {
                    info!(run_id = %run_id, rows_merged = merge.rows_merged, "merge complete");
                    (Some(merge), None)
                }
                Err(e) => {
                    let detail = match e {
                        OrchestratorError::Reconciliation(detail) => detail,
                        other => other.to_string(),
                    };
                    (None, Some(RunFailure::Reconciliation { detail }))
                }
            }
        } else {
            info!(
                run_id = %run_id,
                failed = failed.len(),
                "skipping merge; one or more partitions failed"
            );
            (None, Some(RunFailure::PartitionExecution { failed }))
        };

        manager.destroy_all(control.as_mut()).await;
        if let Err(e) = control.close().await {
            warn!(error = %e, "failed to close control session");
        }

        let status = if failure.is_none() {
            RunStatus::Success
        } else {
            RunStatus::Error
        };
        Ok(RunOutcome {
            run_id,
            status,
            partitions,
            merge,
            failure,
        })
    }

    /// Run a mutation statement across all partitions directly against
    /// `table`, with each partition's hash predicate AND-appended to the
    /// statement's WHERE clause. No workspaces, no merge.
    ///
    /// Unlike [`parallel_update`](Self::parallel_update) this mode is not
    /// fail-closed: partitions that succeeded stay applied even when a
    /// sibling fails.
    pub async fn parallel_update_in_place(
        &self,
        table: &str,
        statement: &str,
    ) -> Result<RunOutcome, OrchestratorError> {
        let warehouses = self.config.validate()?;
        validate_table_name(table)?;
        if !statement.to_ascii_uppercase().contains("WHERE") {
            return Err(OrchestratorError::Configuration(
                "in-place mode requires the statement to carry a WHERE clause".into(),
            ));
        }
        let scheme = PartitionScheme::new(&self.config.key_columns, self.config.num_partitions)?;
        let run_id = generate_run_id();
        info!(
            run_id = %run_id,
            table,
            partitions = self.config.num_partitions,
            "starting in-place parallel update"
        );

        let executor = ParallelExecutor::new(Arc::clone(&self.connector), table);
        let partitions = executor.run_in_place(&scheme, statement, &warehouses).await;

        let failed: Vec<u32> = partitions
            .iter()
            .filter(|p| !p.status.is_success())
            .map(|p| p.partition)
            .collect();
        let (status, failure) = if failed.is_empty() {
            (RunStatus::Success, None)
        } else {
            (
                RunStatus::Error,
                Some(RunFailure::PartitionExecution { failed }),
            )
        };
        Ok(RunOutcome {
            run_id,
            status,
            partitions,
            merge: None,
            failure,
        })
    }
}

/// Run-scoped unique suffix for workspace names.
fn generate_run_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}
