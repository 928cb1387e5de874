use std::collections::HashSet;

use tracing::{debug, info};

use crate::driver::StorageDriver;
use crate::error::{OrmError, Result};
use crate::mapping::EntityMapping;

/// Creates and verifies backing tables from entity mappings.
///
/// Holds the session's schema state: the set of entities whose table has
/// already been verified or created, so repeated operations skip the
/// existence check. The state dies with the manager. Concurrent
/// `ensure_schema` calls for one entity must be serialized externally;
/// schema setup is a bootstrap step, not a hot path.
#[derive(Debug, Default)]
pub struct SchemaManager {
    verified: HashSet<String>,
}

impl SchemaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this entity's table has been verified or created in the
    /// current session.
    pub fn is_verified(&self, entity_name: &str) -> bool {
        self.verified.contains(entity_name)
    }

    /// Make sure the mapping's table exists and is compatible.
    ///
    /// With `force_recreate` the table is dropped (missing tables
    /// tolerated) and rebuilt — destructive, for fixed-schema demo and
    /// test scenarios only. Otherwise the table is created when missing,
    /// and an existing table is verified column-by-column against the
    /// mapping; drift fails with [`OrmError::SchemaMismatch`] instead of
    /// being silently accepted.
    pub fn ensure_schema(
        &mut self,
        driver: &dyn StorageDriver,
        mapping: &EntityMapping,
        force_recreate: bool,
    ) -> Result<()> {
        if !force_recreate && self.verified.contains(mapping.entity_name()) {
            return Ok(());
        }
        let table = mapping.table_name();
        if force_recreate {
            info!(table, "dropping and recreating table");
            driver.execute(&format!("DROP TABLE IF EXISTS {table}"), &[])?;
            driver.execute(&create_table_sql(mapping), &[])?;
        } else if driver.table_exists(table)? {
            debug!(table, "verifying existing table against mapping");
            self.verify(driver, mapping)?;
        } else {
            info!(table, "creating table");
            driver.execute(&create_table_sql(mapping), &[])?;
        }
        self.verified.insert(mapping.entity_name().to_string());
        Ok(())
    }

    fn verify(&self, driver: &dyn StorageDriver, mapping: &EntityMapping) -> Result<()> {
        let table = mapping.table_name();
        let columns = driver.table_columns(table)?;
        for field in mapping.fields() {
            let column = columns.iter().find(|c| c.name == field.column).ok_or_else(|| {
                OrmError::SchemaMismatch {
                    table: table.to_string(),
                    reason: format!("column '{}' is missing", field.column),
                }
            })?;
            if !field.storage_type.accepts_declared_type(&column.declared_type) {
                return Err(OrmError::SchemaMismatch {
                    table: table.to_string(),
                    reason: format!(
                        "column '{}' is declared {} but the mapping expects {}",
                        field.column, column.declared_type, field.storage_type
                    ),
                });
            }
        }
        Ok(())
    }
}

fn create_table_sql(mapping: &EntityMapping) -> String {
    let pk_column = &mapping.primary_key_field().column;
    let columns: Vec<String> = mapping
        .fields()
        .iter()
        .map(|f| {
            let mut def = format!("{} {}", f.column, f.storage_type.sql_type());
            if f.column == *pk_column {
                def.push_str(" PRIMARY KEY");
            } else if !f.nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        mapping.table_name(),
        columns.join(", ")
    )
}
