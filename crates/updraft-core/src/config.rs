use std::time::Duration;

use crate::error::OrchestratorError;

/// Default partition count when the caller does not choose one.
pub const DEFAULT_NUM_PARTITIONS: u32 = 4;

/// Maximum length for table, column and warehouse identifiers.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Validates a single SQL identifier (column, warehouse, schema or one part
/// of a qualified table name).
///
/// Rules:
/// - Must not be empty
/// - Must not exceed MAX_IDENTIFIER_LEN (128) characters
/// - Must start with a letter or underscore
/// - May only contain letters, digits, underscores
pub(crate) fn validate_identifier(name: &str, kind: &str) -> Result<(), OrchestratorError> {
    if name.is_empty() {
        return Err(OrchestratorError::Configuration(format!(
            "{kind} name cannot be empty"
        )));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(OrchestratorError::Configuration(format!(
            "{kind} name too long ({} > {})",
            name.len(),
            MAX_IDENTIFIER_LEN
        )));
    }
    let first_char = name.chars().next().unwrap();
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(OrchestratorError::Configuration(format!(
            "{kind} name must start with a letter or underscore"
        )));
    }
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(OrchestratorError::Configuration(format!(
                "{kind} name contains invalid character: '{}'",
                c
            )));
        }
    }
    Ok(())
}

/// Validates a possibly schema-qualified table name (`schema.table`).
pub(crate) fn validate_table_name(name: &str) -> Result<(), OrchestratorError> {
    if name.is_empty() {
        return Err(OrchestratorError::Configuration(
            "table name cannot be empty".into(),
        ));
    }
    for part in name.split('.') {
        validate_identifier(part, "table")?;
    }
    Ok(())
}

/// Connection parameters for a warehouse session.
///
/// A typed record instead of a loose parameter map: every field is
/// enumerated here and checked once, before any store call.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Warehouse host.
    pub host: String,

    /// Warehouse port.
    pub port: u16,

    /// User name.
    pub user: String,

    /// Password, if the store requires one.
    pub password: Option<String>,

    /// Database name.
    pub database: String,

    /// Default schema (search path) for new sessions.
    pub schema: Option<String>,

    /// Default warehouse / workload group for new sessions. Individual
    /// partitions may override this per run.
    pub warehouse: Option<String>,

    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 5432,
            user: user.into(),
            password: None,
            database: database.into(),
            schema: None,
            warehouse: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the default schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the default warehouse.
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.host.is_empty() {
            return Err(OrchestratorError::Configuration(
                "connection host cannot be empty".into(),
            ));
        }
        if self.user.is_empty() {
            return Err(OrchestratorError::Configuration(
                "connection user cannot be empty".into(),
            ));
        }
        if self.database.is_empty() {
            return Err(OrchestratorError::Configuration(
                "connection database cannot be empty".into(),
            ));
        }
        if let Some(schema) = &self.schema {
            validate_identifier(schema, "schema")?;
        }
        if let Some(warehouse) = &self.warehouse {
            validate_identifier(warehouse, "warehouse")?;
        }
        Ok(())
    }
}

/// How partitions are routed to execution targets.
#[derive(Debug, Clone, Default)]
pub enum WarehouseAssignment {
    /// Every partition uses the connection's default warehouse.
    #[default]
    Inherit,

    /// Every partition is routed to one named warehouse.
    Shared(String),

    /// One warehouse per partition. The list length must equal the
    /// partition count.
    PerPartition(Vec<String>),
}

impl WarehouseAssignment {
    /// Expand into one optional override per partition.
    pub(crate) fn resolve(
        &self,
        num_partitions: u32,
    ) -> Result<Vec<Option<String>>, OrchestratorError> {
        match self {
            WarehouseAssignment::Inherit => Ok(vec![None; num_partitions as usize]),
            WarehouseAssignment::Shared(name) => {
                validate_identifier(name, "warehouse")?;
                Ok(vec![Some(name.clone()); num_partitions as usize])
            }
            WarehouseAssignment::PerPartition(names) => {
                if names.len() != num_partitions as usize {
                    return Err(OrchestratorError::Configuration(format!(
                        "number of warehouses ({}) must match number of partitions ({})",
                        names.len(),
                        num_partitions
                    )));
                }
                for name in names {
                    validate_identifier(name, "warehouse")?;
                }
                Ok(names.iter().cloned().map(Some).collect())
            }
        }
    }
}

/// Orchestration parameters for one target table.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of disjoint partitions; one parallel task each.
    pub num_partitions: u32,

    /// Columns forming the composite row key.
    pub key_columns: Vec<String>,

    /// Execution-target routing per partition.
    pub warehouses: WarehouseAssignment,
}

impl OrchestratorConfig {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            num_partitions: DEFAULT_NUM_PARTITIONS,
            key_columns,
            warehouses: WarehouseAssignment::Inherit,
        }
    }

    /// Set the partition count.
    pub fn with_num_partitions(mut self, num_partitions: u32) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    /// Set the warehouse routing.
    pub fn with_warehouses(mut self, warehouses: WarehouseAssignment) -> Self {
        self.warehouses = warehouses;
        self
    }

    /// Check all arguments and expand the warehouse routing. Fails with a
    /// configuration error before any store call is made.
    pub fn validate(&self) -> Result<Vec<Option<String>>, OrchestratorError> {
        if self.num_partitions == 0 {
            return Err(OrchestratorError::Configuration(
                "partition count must be at least 1".into(),
            ));
        }
        if self.key_columns.is_empty() {
            return Err(OrchestratorError::Configuration(
                "at least one key column is required".into(),
            ));
        }
        for column in &self.key_columns {
            validate_identifier(column, "key column")?;
        }
        self.warehouses.resolve(self.num_partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec!["search_id".to_string(), "search_dt".to_string()]
    }

    #[test]
    fn default_partition_count_is_four() {
        let config = OrchestratorConfig::new(keys());
        assert_eq!(config.num_partitions, DEFAULT_NUM_PARTITIONS);
        let warehouses = config.validate().unwrap();
        assert_eq!(warehouses, vec![None::<String>; 4]);
    }

    #[test]
    fn zero_partitions_is_rejected() {
        let err = OrchestratorConfig::new(keys())
            .with_num_partitions(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn empty_key_columns_are_rejected() {
        let err = OrchestratorConfig::new(Vec::new()).validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn warehouse_list_length_must_match_partition_count() {
        let err = OrchestratorConfig::new(keys())
            .with_warehouses(WarehouseAssignment::PerPartition(vec![
                "wh1".to_string(),
                "wh2".to_string(),
                "wh3".to_string(),
            ]))
            .validate()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("number of warehouses (3)"), "{message}");
        assert!(message.contains("partitions (4)"), "{message}");
    }

    #[test]
    fn shared_warehouse_expands_to_every_partition() {
        let warehouses = OrchestratorConfig::new(keys())
            .with_num_partitions(2)
            .with_warehouses(WarehouseAssignment::Shared("big_wh".to_string()))
            .validate()
            .unwrap();
        assert_eq!(
            warehouses,
            vec![Some("big_wh".to_string()), Some("big_wh".to_string())]
        );
    }

    #[test]
    fn identifiers_reject_invalid_characters() {
        assert!(validate_identifier("search_id", "column").is_ok());
        assert!(validate_identifier("_private", "column").is_ok());
        assert!(validate_identifier("1col", "column").is_err());
        assert!(validate_identifier("col-name", "column").is_err());
        assert!(validate_identifier("", "column").is_err());
        assert!(validate_identifier("a; DROP TABLE x", "column").is_err());
    }

    #[test]
    fn table_names_may_be_schema_qualified() {
        assert!(validate_table_name("searches").is_ok());
        assert!(validate_table_name("analytics.searches").is_ok());
        assert!(validate_table_name("analytics..searches").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn connection_config_requires_host_user_database() {
        assert!(ConnectionConfig::new("localhost", "svc", "analytics")
            .validate()
            .is_ok());
        assert!(ConnectionConfig::new("", "svc", "analytics")
            .validate()
            .is_err());
        assert!(ConnectionConfig::new("localhost", "", "analytics")
            .validate()
            .is_err());
        assert!(ConnectionConfig::new("localhost", "svc", "")
            .validate()
            .is_err());
    }
}
