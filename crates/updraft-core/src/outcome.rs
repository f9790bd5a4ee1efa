use serde::{Deserialize, Serialize};

/// Terminal state of one partition's mutation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionStatus {
    Success { rows_affected: u64 },
    Error { detail: String },
}

impl PartitionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PartitionStatus::Success { .. })
    }
}

/// Outcome of one partition task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOutcome {
    pub partition: u32,

    /// Working-copy table the mutation ran against; absent in in-place mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    /// Warehouse the partition was routed to, when overridden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,

    #[serde(flatten)]
    pub status: PartitionStatus,
}

/// Result of merging the workspaces back into the source dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Rows affected by the merge statement.
    pub rows_merged: u64,

    /// Non-key columns that were reconciled.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Which phase failed, with detail. Present exactly when `status` is
/// `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunFailure {
    /// The control session could not be opened; nothing was touched.
    Connection { detail: String },

    /// A workspace could not be materialized; no mutation ran.
    WorkspaceCreation { partition: u32, detail: String },

    /// One or more partitions failed; the merge was skipped and no data was
    /// written back.
    PartitionExecution { failed: Vec<u32> },

    /// The merge failed after all partitions succeeded. Completion state is
    /// unknown; re-verify the source table.
    Reconciliation { detail: String },
}

/// Aggregate result of one orchestration run. The caller always receives a
/// complete outcome; only configuration errors fail the call itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run-scoped unique suffix; workspace names embed it.
    pub run_id: String,

    pub status: RunStatus,

    /// One outcome per partition, ordered by partition id.
    pub partitions: Vec<PartitionOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Success)
    }

    /// Total rows affected across successful partitions.
    pub fn rows_affected(&self) -> u64 {
        self.partitions
            .iter()
            .filter_map(|p| match p.status {
                PartitionStatus::Success { rows_affected } => Some(rows_affected),
                PartitionStatus::Error { .. } => None,
            })
            .sum()
    }
}
