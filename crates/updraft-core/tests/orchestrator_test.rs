use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use updraft_core::{
    Orchestrator, OrchestratorConfig, PartitionScheme, PartitionStatus, RunFailure,
    WarehouseAssignment, WarehouseConnector, WarehouseError, WarehouseSession, WorkspaceManager,
};

/// Scripted warehouse double: every statement is recorded, responses are
/// keyed by substring rules (first rule whose needles all match wins,
/// anything else succeeds with zero rows).
#[derive(Clone, Default)]
struct MockWarehouse {
    log: Arc<Mutex<Vec<String>>>,
    rules: Arc<Mutex<Vec<Rule>>>,
    columns: Arc<Mutex<Vec<String>>>,
    connect_error: Arc<Mutex<Option<String>>>,
}

struct Rule {
    needles: Vec<&'static str>,
    response: Result<u64, String>,
}

impl MockWarehouse {
    fn new() -> Self {
        Self::default()
    }

    fn rows_for(self, needles: &[&'static str], rows: u64) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needles: needles.to_vec(),
            response: Ok(rows),
        });
        self
    }

    fn fail_for(self, needles: &[&'static str], message: &str) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needles: needles.to_vec(),
            response: Err(message.to_string()),
        });
        self
    }

    fn with_columns(self, columns: &[&str]) -> Self {
        *self.columns.lock().unwrap() = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    fn fail_connect(self, message: &str) -> Self {
        *self.connect_error.lock().unwrap() = Some(message.to_string());
        self
    }

    fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn statements_matching(&self, needle: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.contains(needle))
            .collect()
    }
}

#[async_trait]
impl WarehouseConnector for MockWarehouse {
    async fn connect(
        &self,
        warehouse: Option<&str>,
    ) -> Result<Box<dyn WarehouseSession>, WarehouseError> {
        if let Some(message) = self.connect_error.lock().unwrap().clone() {
            return Err(WarehouseError::Connection(message));
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("CONNECT warehouse={}", warehouse.unwrap_or("default")));
        Ok(Box::new(MockSession {
            log: Arc::clone(&self.log),
            rules: Arc::clone(&self.rules),
            columns: Arc::clone(&self.columns),
        }))
    }
}

struct MockSession {
    log: Arc<Mutex<Vec<String>>>,
    rules: Arc<Mutex<Vec<Rule>>>,
    columns: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl WarehouseSession for MockSession {
    async fn execute(&mut self, statement: &str) -> Result<u64, WarehouseError> {
        self.log.lock().unwrap().push(statement.to_string());
        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if rule.needles.iter().all(|needle| statement.contains(needle)) {
                return rule
                    .response
                    .clone()
                    .map_err(WarehouseError::Statement);
            }
        }
        Ok(0)
    }

    async fn columns(&mut self, _table: &str) -> Result<Vec<String>, WarehouseError> {
        Ok(self.columns.lock().unwrap().clone())
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        Ok(())
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig::new(vec!["search_id".to_string(), "search_dt".to_string()])
}

fn orchestrator(mock: &MockWarehouse) -> Orchestrator {
    Orchestrator::new(Arc::new(mock.clone()), config())
}

const STATEMENT: &str = "UPDATE searches SET status = 'PROCESSED' WHERE status = 'PENDING'";

// Scenario A: 8 rows across 4 partitions, all succeed, merge updates all 8.
#[tokio::test]
async fn all_partitions_succeed_and_merge_updates_every_row() {
    let mock = MockWarehouse::new()
        .rows_for(&["MERGE INTO"], 8)
        .rows_for(&["CREATE TABLE"], 2)
        .rows_for(&["UPDATE", "tmp_"], 2)
        .with_columns(&["search_id", "search_dt", "status", "amount"]);

    let outcome = orchestrator(&mock)
        .parallel_update("searches", STATEMENT)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.partitions.len(), 4);
    for (i, partition) in outcome.partitions.iter().enumerate() {
        assert_eq!(partition.partition, i as u32);
        assert_eq!(
            partition.status,
            PartitionStatus::Success { rows_affected: 2 }
        );
    }
    assert_eq!(outcome.rows_affected(), 8);

    let merge = outcome.merge.unwrap();
    assert_eq!(merge.rows_merged, 8);
    assert_eq!(merge.columns, vec!["status", "amount"]);

    // Four workspaces created, mutated, merged once, then dropped.
    assert_eq!(mock.statements_matching("CREATE TABLE").len(), 4);
    assert_eq!(mock.statements_matching("MERGE INTO").len(), 1);
    assert_eq!(mock.statements_matching("DROP TABLE IF EXISTS").len(), 4);

    // Reconciliation begins only after every partition finished, and the
    // teardown comes last.
    let statements = mock.statements();
    let merge_at = statements
        .iter()
        .position(|s| s.contains("MERGE INTO"))
        .unwrap();
    let last_update = statements
        .iter()
        .rposition(|s| s.contains("tmp_") && s.contains("PROCESSED"))
        .unwrap();
    let first_drop = statements
        .iter()
        .position(|s| s.contains("DROP TABLE"))
        .unwrap();
    assert!(last_update < merge_at);
    assert!(merge_at < first_drop);
}

// Scenario B: partition 2 of 4 fails; no merge, all workspaces removed.
#[tokio::test]
async fn failed_partition_skips_merge_and_still_cleans_up() {
    let mock = MockWarehouse::new()
        .rows_for(&["CREATE TABLE"], 2)
        .fail_for(&["UPDATE", "_p2"], "invalid predicate")
        .rows_for(&["UPDATE", "tmp_"], 2)
        .with_columns(&["search_id", "search_dt", "status"]);

    let outcome = orchestrator(&mock)
        .parallel_update("searches", STATEMENT)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.partitions.len(), 4);
    for partition in &outcome.partitions {
        if partition.partition == 2 {
            match &partition.status {
                PartitionStatus::Error { detail } => {
                    assert!(detail.contains("invalid predicate"), "{detail}")
                }
                other => panic!("expected error outcome, got {other:?}"),
            }
        } else {
            assert!(partition.status.is_success());
        }
    }
    assert_eq!(
        outcome.failure,
        Some(RunFailure::PartitionExecution { failed: vec![2] })
    );
    assert!(outcome.merge.is_none());

    // Fail-closed: nothing is merged back, but cleanup still runs.
    assert!(mock.statements_matching("MERGE INTO").is_empty());
    assert_eq!(mock.statements_matching("DROP TABLE IF EXISTS").len(), 4);
}

// Scenario C: warehouse list length mismatch fails before any store call.
#[tokio::test]
async fn warehouse_count_mismatch_is_a_configuration_error() {
    let mock = MockWarehouse::new();
    let config = config().with_warehouses(WarehouseAssignment::PerPartition(vec![
        "wh1".to_string(),
        "wh2".to_string(),
        "wh3".to_string(),
    ]));
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), config);

    let err = orchestrator
        .parallel_update("searches", STATEMENT)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("configuration error"));
    assert!(mock.statements().is_empty(), "no store call may be made");
}

// Scenario D: merge fails after all partitions succeed.
#[tokio::test]
async fn merge_failure_is_reported_and_workspaces_are_removed() {
    let mock = MockWarehouse::new()
        .fail_for(&["MERGE INTO"], "merge rejected")
        .rows_for(&["CREATE TABLE"], 2)
        .rows_for(&["UPDATE", "tmp_"], 2)
        .with_columns(&["search_id", "search_dt", "status"]);

    let outcome = orchestrator(&mock)
        .parallel_update("searches", STATEMENT)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert!(outcome.partitions.iter().all(|p| p.status.is_success()));
    assert!(outcome.merge.is_none());
    match outcome.failure {
        Some(RunFailure::Reconciliation { detail }) => {
            assert!(detail.contains("merge rejected"), "{detail}")
        }
        other => panic!("expected reconciliation failure, got {other:?}"),
    }
    assert_eq!(mock.statements_matching("DROP TABLE IF EXISTS").len(), 4);
}

#[tokio::test]
async fn workspace_creation_failure_aborts_before_any_mutation() {
    let mock = MockWarehouse::new()
        .fail_for(&["CREATE TABLE", "_p1"], "quota exceeded")
        .rows_for(&["CREATE TABLE"], 2);

    let outcome = orchestrator(&mock)
        .parallel_update("searches", STATEMENT)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert!(outcome.partitions.is_empty());
    match outcome.failure {
        Some(RunFailure::WorkspaceCreation { partition, detail }) => {
            assert_eq!(partition, 1);
            assert!(detail.contains("quota exceeded"), "{detail}");
        }
        other => panic!("expected workspace-creation failure, got {other:?}"),
    }

    // The mutation never ran and every workspace name of the run was
    // dropped, including the one whose creation failed mid-statement.
    assert!(mock.statements_matching("PROCESSED").is_empty());
    assert_eq!(mock.statements_matching("DROP TABLE IF EXISTS").len(), 4);
}

#[tokio::test]
async fn control_connection_failure_yields_an_outcome_not_a_panic() {
    let mock = MockWarehouse::new().fail_connect("network unreachable");

    let outcome = orchestrator(&mock)
        .parallel_update("searches", STATEMENT)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert!(outcome.partitions.is_empty());
    match outcome.failure {
        Some(RunFailure::Connection { detail }) => {
            assert!(detail.contains("network unreachable"), "{detail}")
        }
        other => panic!("expected connection failure, got {other:?}"),
    }
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let mock = MockWarehouse::new().rows_for(&["CREATE TABLE"], 1);
    let mut session = mock.connect(None).await.unwrap();
    let scheme =
        PartitionScheme::new(&["search_id".to_string(), "search_dt".to_string()], 2).unwrap();

    let mut manager = WorkspaceManager::new("searches", "run1", 2);
    manager
        .create_all(session.as_mut(), &scheme)
        .await
        .unwrap();

    manager.destroy_all(session.as_mut()).await;
    manager.destroy_all(session.as_mut()).await;

    let drops = mock.statements_matching("DROP TABLE IF EXISTS");
    assert_eq!(drops.len(), 4);
    assert!(drops.iter().all(|s| s.contains("tmp_run1_p")));
}

#[tokio::test]
async fn partitions_are_routed_to_their_assigned_warehouses() {
    let mock = MockWarehouse::new()
        .rows_for(&["MERGE INTO"], 4)
        .rows_for(&["CREATE TABLE"], 1)
        .rows_for(&["UPDATE", "tmp_"], 1)
        .with_columns(&["search_id", "search_dt", "status"]);
    let config = config().with_warehouses(WarehouseAssignment::PerPartition(vec![
        "wh_a".to_string(),
        "wh_b".to_string(),
        "wh_c".to_string(),
        "wh_d".to_string(),
    ]));
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), config);

    let outcome = orchestrator
        .parallel_update("searches", STATEMENT)
        .await
        .unwrap();

    assert!(outcome.is_success());
    for (partition, name) in outcome.partitions.iter().zip(["wh_a", "wh_b", "wh_c", "wh_d"]) {
        assert_eq!(partition.warehouse.as_deref(), Some(name));
        assert_eq!(
            mock.statements_matching(&format!("CONNECT warehouse={name}"))
                .len(),
            1
        );
    }
    // Plus the control session on the default warehouse.
    assert_eq!(
        mock.statements_matching("CONNECT warehouse=default").len(),
        1
    );
}

#[tokio::test]
async fn in_place_mode_appends_the_partition_predicate() {
    let mock = MockWarehouse::new().rows_for(&["UPDATE"], 3);

    let outcome = orchestrator(&mock)
        .parallel_update_in_place(
            "searches",
            "UPDATE searches SET amount = amount * 1.1 WHERE category = 'STANDARD'",
        )
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.rows_affected(), 12);
    assert!(outcome.merge.is_none());
    assert!(outcome.partitions.iter().all(|p| p.workspace.is_none()));

    for partition in 0..4 {
        let predicate =
            format!("AND MOD(ABS(HASH(CONCAT(search_id, search_dt))), 4) = {partition}");
        assert_eq!(mock.statements_matching(&predicate).len(), 1);
    }
    assert!(mock.statements_matching("CREATE TABLE").is_empty());
    assert!(mock.statements_matching("MERGE INTO").is_empty());
    assert!(mock.statements_matching("DROP TABLE").is_empty());
}

#[tokio::test]
async fn in_place_mode_requires_a_where_clause() {
    let mock = MockWarehouse::new();
    let err = orchestrator(&mock)
        .parallel_update_in_place("searches", "UPDATE searches SET amount = 0")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("WHERE clause"));
    assert!(mock.statements().is_empty());
}

#[tokio::test]
async fn statement_must_reference_the_target_table() {
    let mock = MockWarehouse::new();
    let err = orchestrator(&mock)
        .parallel_update("searches", "UPDATE orders SET status = 'X' WHERE 1 = 1")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not reference"));
    assert!(mock.statements().is_empty());
}
