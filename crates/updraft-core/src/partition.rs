use crate::config::validate_identifier;
use crate::error::OrchestratorError;

/// Deterministic assignment of rows to partitions by a hash of the
/// composite row key.
///
/// The scheme is used two ways: `assign` computes a partition id locally
/// for a concrete key, and `predicate` emits the equivalent SQL fragment
/// the warehouse evaluates server-side. Both are pure; for a fixed
/// partition count the union of all predicates covers the source exactly
/// once, because every predicate of a run applies the same hash expression
/// to the same key columns.
#[derive(Debug, Clone)]
pub struct PartitionScheme {
    key_columns: Vec<String>,
    num_partitions: u32,
}

impl PartitionScheme {
    pub fn new(key_columns: &[String], num_partitions: u32) -> Result<Self, OrchestratorError> {
        if num_partitions == 0 {
            return Err(OrchestratorError::Configuration(
                "partition count must be at least 1".into(),
            ));
        }
        if key_columns.is_empty() {
            return Err(OrchestratorError::Configuration(
                "at least one key column is required".into(),
            ));
        }
        for column in key_columns {
            validate_identifier(column, "key column")?;
        }
        Ok(Self {
            key_columns: key_columns.to_vec(),
            num_partitions,
        })
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Partition id for a concrete row key, given as the key fields in
    /// column order rendered to text. Deterministic and stable across
    /// process restarts: CRC32 with the standard polynomial, no seeding.
    pub fn assign(&self, key_fields: &[&str]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for field in key_fields {
            hasher.update(field.as_bytes());
        }
        hasher.finalize() % self.num_partitions
    }

    /// SQL predicate selecting exactly the rows of one partition.
    pub fn predicate(&self, partition: u32) -> String {
        debug_assert!(partition < self.num_partitions);
        format!(
            "MOD(ABS(HASH(CONCAT({}))), {}) = {}",
            self.key_columns.join(", "),
            self.num_partitions,
            partition
        )
    }
}
