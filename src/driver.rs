use crate::error::Result;
use crate::value::Value;

/// Column metadata reported by [`StorageDriver::table_columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Narrow capability interface to the underlying relational store.
///
/// The persistence engine and schema manager depend only on this trait;
/// any backend satisfying it is interchangeable. Implementations own
/// their connection and must release it on every exit path (in Rust this
/// is the `Drop` of the driver value). Statement text passed in contains
/// only vetted identifiers; all literals arrive through `params`.
/// Implementations apply their own timeout policy and surface failures
/// as [`crate::OrmError::StorageUnavailable`], except unique-constraint
/// violations, which map to [`crate::OrmError::DuplicateKey`] so the
/// engine can attribute them.
pub trait StorageDriver {
    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Columns of an existing table, for schema drift verification.
    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Execute DDL or DML; returns the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Run a SELECT; returns raw store values, one `Vec` per row, in the
    /// statement's column order. Coercion to mapped storage types is the
    /// engine's job.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>>;

    /// Key generated by the most recent insert, when the store supports
    /// key generation.
    fn generated_key(&self) -> Result<Option<i64>>;
}
