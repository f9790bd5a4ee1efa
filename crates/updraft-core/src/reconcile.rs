use crate::error::OrchestratorError;
use crate::outcome::MergeOutcome;
use crate::warehouse::WarehouseSession;
use crate::workspace::Workspace;

/// Merges the union of all workspaces back into the source dataset.
///
/// Matched on the full row key; every non-key column is overwritten with
/// the workspace's value. Last writer wins by workspace, not wall-clock:
/// a row key maps to exactly one partition, so no two workspaces ever
/// carry the same key under correct partitioning. Update-only: unmatched
/// workspace rows are not inserted and unmatched source rows are left
/// untouched.
pub struct Reconciler {
    source_table: String,
    key_columns: Vec<String>,
}

impl Reconciler {
    pub fn new(source_table: impl Into<String>, key_columns: Vec<String>) -> Self {
        Self {
            source_table: source_table.into(),
            key_columns,
        }
    }

    /// Build and execute the merge statement. Any failure is terminal and
    /// never retried: without store-side transactions a partial merge is
    /// indistinguishable from a full one, so the error means "completion
    /// state unknown, re-verify manually".
    pub async fn merge(
        &self,
        session: &mut dyn WarehouseSession,
        workspaces: &[Workspace],
    ) -> Result<MergeOutcome, OrchestratorError> {
        let first = workspaces.first().ok_or_else(|| {
            OrchestratorError::Reconciliation("no workspaces to merge".into())
        })?;

        let all_columns = session.columns(&first.table).await.map_err(|e| {
            OrchestratorError::Reconciliation(format!("schema inspection failed: {e}"))
        })?;
        let update_columns: Vec<String> = all_columns
            .into_iter()
            .filter(|column| {
                !self
                    .key_columns
                    .iter()
                    .any(|key| key.eq_ignore_ascii_case(column))
            })
            .collect();
        if update_columns.is_empty() {
            return Err(OrchestratorError::Reconciliation(
                "workspace has no non-key columns to merge".into(),
            ));
        }

        let statement = build_merge_statement(
            &self.source_table,
            workspaces,
            &self.key_columns,
            &update_columns,
        );
        let rows_merged = session
            .execute(&statement)
            .await
            .map_err(|e| OrchestratorError::Reconciliation(e.to_string()))?;

        Ok(MergeOutcome {
            rows_merged,
            columns: update_columns,
        })
    }
}

pub(crate) fn build_merge_statement(
    source_table: &str,
    workspaces: &[Workspace],
    key_columns: &[String],
    update_columns: &[String],
) -> String {
    let union = workspaces
        .iter()
        .map(|workspace| format!("SELECT * FROM {}", workspace.table))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    let on = key_columns
        .iter()
        .map(|key| format!("t.{key} = s.{key}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let set = update_columns
        .iter()
        .map(|column| format!("t.{column} = s.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "MERGE INTO {source_table} t USING ({union}) s ON {on} \
         WHEN MATCHED THEN UPDATE SET {set}"
    )
}
