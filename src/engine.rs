use std::collections::HashMap;

use tracing::debug;

use crate::driver::StorageDriver;
use crate::error::{OrmError, Result};
use crate::mapping::{EntityMapping, MappingRegistry, StorageType};
use crate::predicate::Predicate;
use crate::schema::SchemaManager;
use crate::value::Value;

/// An in-memory record corresponding to one row of a mapped table.
///
/// Attributes are named after the mapping's fields. Entities are built
/// by callers or materialized by the engine from query results; the
/// engine never mutates a caller's entity except to write back a
/// generated key on insert. An explicit `Value::Null` is the same as an
/// absent attribute, so round-tripped entities compare equal however
/// the caller spelled the missing value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    entity_name: String,
    values: HashMap<String, Value>,
}

impl Entity {
    pub fn new(entity_name: &str) -> Self {
        Self {
            entity_name: entity_name.to_string(),
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        match value.into() {
            Value::Null => {
                self.values.remove(field);
            }
            value => {
                self.values.insert(field.to_string(), value);
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }
}

/// Facade over the mapping registry, predicate translator, schema
/// manager, and storage driver.
///
/// One engine is one logical session: operations run sequentially
/// against one underlying connection, with no cross-operation locks and
/// no multi-statement transactions. Caller-input validation (attributes,
/// predicates) always happens before any storage call, so bad input
/// never reaches the store. Schema is ensured lazily before the first
/// operation on each entity.
pub struct PersistenceEngine {
    driver: Box<dyn StorageDriver>,
    registry: MappingRegistry,
    schema: SchemaManager,
    force_create_schema: bool,
}

impl PersistenceEngine {
    pub fn new(driver: impl StorageDriver + 'static, registry: MappingRegistry) -> Self {
        Self {
            driver: Box::new(driver),
            registry,
            schema: SchemaManager::new(),
            force_create_schema: false,
        }
    }

    /// Drop and recreate each entity's table on first use. Destructive;
    /// meant for fixed-schema demo and test scenarios.
    pub fn with_force_create_schema(mut self, force: bool) -> Self {
        self.force_create_schema = force;
        self
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Insert the entity as a new row.
    ///
    /// With `auto_generate_key` the primary key column is omitted from
    /// the statement and the store-generated key is written back into
    /// the entity; otherwise a pre-existing row with the same key fails
    /// with [`OrmError::DuplicateKey`].
    pub fn insert(&mut self, entity: &mut Entity, auto_generate_key: bool) -> Result<()> {
        let mapping = self.registry.lookup(entity.entity_name())?;
        validate_attributes(entity, &mapping, auto_generate_key)?;
        self.ensure_schema(&mapping)?;

        let pk = mapping.primary_key_field();
        if auto_generate_key {
            if pk.storage_type != StorageType::Integer {
                return Err(OrmError::InvalidMapping(format!(
                    "auto-generated keys require an integer primary key, but '{}' is {}",
                    pk.name, pk.storage_type
                )));
            }
        } else if self.row_exists(&mapping, entity)? {
            return Err(OrmError::DuplicateKey {
                entity: entity.entity_name().to_string(),
            });
        }

        let fields: Vec<_> = mapping
            .fields()
            .iter()
            .filter(|f| !(auto_generate_key && f.name == pk.name))
            .collect();
        let columns: Vec<&str> = fields.iter().map(|f| f.column.as_str()).collect();
        let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
        let params: Vec<Value> = fields
            .iter()
            .map(|f| bound_value(entity, &f.name))
            .collect();
        // A generated key on a key-only mapping leaves no columns to
        // list; every value comes from the store.
        let sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", mapping.table_name())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                mapping.table_name(),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        self.execute_dml(&sql, &params, entity.entity_name())?;
        debug!(entity = entity.entity_name(), "inserted row");

        if auto_generate_key {
            if let Some(key) = self.driver.generated_key()? {
                entity.set(&mapping.primary_key_field().name, key);
            }
        }
        Ok(())
    }

    /// Replace the row matching the entity's primary key with the
    /// entity's current values (full-row replace, not a partial patch).
    /// A missing row fails with [`OrmError::NotFound`] unless
    /// `insert_if_absent` is set, in which case the entity is inserted.
    pub fn update(&mut self, entity: &Entity, insert_if_absent: bool) -> Result<()> {
        let mapping = self.registry.lookup(entity.entity_name())?;
        validate_attributes(entity, &mapping, false)?;
        self.ensure_schema(&mapping)?;

        let pk = mapping.primary_key_field();
        let non_key: Vec<_> = mapping.fields().iter().filter(|f| f.name != pk.name).collect();
        if non_key.is_empty() {
            // The row is nothing but its key, so a full-row replace
            // degenerates to an existence check.
            if self.row_exists(&mapping, entity)? {
                return Ok(());
            }
            if insert_if_absent {
                let mut fresh = entity.clone();
                return self.insert(&mut fresh, false);
            }
            return Err(OrmError::NotFound {
                entity: entity.entity_name().to_string(),
            });
        }
        let assignments: Vec<String> = non_key
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{} = ?{}", f.column, i + 1))
            .collect();
        let mut params: Vec<Value> = non_key
            .iter()
            .map(|f| bound_value(entity, &f.name))
            .collect();
        params.push(bound_value(entity, &pk.name));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            mapping.table_name(),
            assignments.join(", "),
            pk.column,
            params.len()
        );
        let affected = self.execute_dml(&sql, &params, entity.entity_name())?;
        debug!(entity = entity.entity_name(), affected, "updated row");
        if affected > 0 {
            return Ok(());
        }
        if insert_if_absent {
            let mut fresh = entity.clone();
            return self.insert(&mut fresh, false);
        }
        Err(OrmError::NotFound {
            entity: entity.entity_name().to_string(),
        })
    }

    /// Delete the row matching the entity's primary key. Idempotent: a
    /// row that is already gone is a successful no-op.
    pub fn delete(&mut self, entity: &Entity) -> Result<()> {
        let mapping = self.registry.lookup(entity.entity_name())?;
        let pk = mapping.primary_key_field();
        let key = primary_key_value(entity, &mapping)?;
        self.ensure_schema(&mapping)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            mapping.table_name(),
            pk.column
        );
        let affected = self.execute_dml(&sql, &[key], entity.entity_name())?;
        debug!(entity = entity.entity_name(), affected, "deleted row");
        Ok(())
    }

    /// Delete every row matching the predicate; `None` deletes all rows
    /// for the entity. Returns the number of rows removed. An order-by
    /// clause in the predicate is validated but has no effect here.
    pub fn delete_by_predicate(
        &mut self,
        entity_name: &str,
        predicate_text: Option<&str>,
    ) -> Result<usize> {
        let mapping = self.registry.lookup(entity_name)?;
        let predicate = Predicate::parse(predicate_text, &mapping)?;
        self.ensure_schema(&mapping)?;
        let sql = format!(
            "DELETE FROM {}{}",
            mapping.table_name(),
            predicate.where_clause(1)
        );
        let deleted = self.execute_dml(&sql, &predicate.params(), entity_name)?;
        debug!(entity = entity_name, deleted, "deleted rows by predicate");
        Ok(deleted)
    }

    /// Single-row shorthand: run the key predicate and materialize the
    /// first match. Returns `Ok(None)` when no row matches.
    pub fn get_object_by_id(
        &mut self,
        entity_name: &str,
        key_predicate: &str,
    ) -> Result<Option<Entity>> {
        let mut results = self.get_objects(entity_name, Some(key_predicate))?;
        if results.is_empty() {
            Ok(None)
        } else {
            Ok(Some(results.swap_remove(0)))
        }
    }

    /// Fetch all rows matching the predicate as a finite, eagerly
    /// materialized snapshot. `None` means every row in store-native
    /// order.
    pub fn get_objects(
        &mut self,
        entity_name: &str,
        predicate_text: Option<&str>,
    ) -> Result<Vec<Entity>> {
        let mapping = self.registry.lookup(entity_name)?;
        let predicate = Predicate::parse(predicate_text, &mapping)?;
        self.ensure_schema(&mapping)?;
        let columns: Vec<&str> = mapping.fields().iter().map(|f| f.column.as_str()).collect();
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            columns.join(", "),
            mapping.table_name(),
            predicate.where_clause(1),
            predicate.order_clause()
        );
        let rows = self.driver.query(&sql, &predicate.params())?;
        debug!(entity = entity_name, rows = rows.len(), "fetched rows");
        rows.into_iter()
            .map(|row| materialize(&mapping, row))
            .collect()
    }

    fn ensure_schema(&mut self, mapping: &EntityMapping) -> Result<()> {
        // Forced recreation applies once, on the entity's first use in
        // this session; afterwards the verified set short-circuits.
        let force = self.force_create_schema && !self.schema.is_verified(mapping.entity_name());
        self.schema
            .ensure_schema(self.driver.as_ref(), mapping, force)
    }

    fn row_exists(&self, mapping: &EntityMapping, entity: &Entity) -> Result<bool> {
        let key = primary_key_value(entity, mapping)?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1",
            mapping.table_name(),
            mapping.primary_key_field().column
        );
        Ok(!self.driver.query(&sql, &[key])?.is_empty())
    }

    /// Run DML, attributing racing unique violations to `DuplicateKey`.
    fn execute_dml(&self, sql: &str, params: &[Value], entity_name: &str) -> Result<usize> {
        self.driver.execute(sql, params).map_err(|e| match e {
            OrmError::ConstraintViolation(_) => OrmError::DuplicateKey {
                entity: entity_name.to_string(),
            },
            other => other,
        })
    }
}

/// Check every entity attribute against the mapping before anything is
/// bound: unknown attributes, type conflicts, and missing non-nullable
/// values are all caller errors and must never reach the store.
fn validate_attributes(
    entity: &Entity,
    mapping: &EntityMapping,
    key_is_generated: bool,
) -> Result<()> {
    for name in entity.values().keys() {
        if mapping.field(name).is_none() {
            return Err(OrmError::UnknownField {
                entity: entity.entity_name().to_string(),
                field: name.clone(),
            });
        }
    }
    let pk = mapping.primary_key_field();
    for field in mapping.fields() {
        match entity.get(&field.name) {
            // `Entity::set` drops explicit Nulls, so a stored value is
            // never Null here.
            Some(value) => {
                if !value.fits(field.storage_type) {
                    return Err(OrmError::ValueTypeMismatch {
                        field: field.name.clone(),
                        expected: field.storage_type,
                    });
                }
            }
            None => {
                let generated = key_is_generated && field.name == pk.name;
                if !field.nullable && !generated {
                    return Err(OrmError::MissingValue {
                        field: field.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn primary_key_value(entity: &Entity, mapping: &EntityMapping) -> Result<Value> {
    let pk = mapping.primary_key_field();
    match entity.get(&pk.name) {
        Some(v) if !v.is_null() => Ok(v.clone()),
        _ => Err(OrmError::MissingValue {
            field: pk.name.clone(),
        }),
    }
}

/// Only called after validation, so absent nullable attributes bind as
/// NULL.
fn bound_value(entity: &Entity, field: &str) -> Value {
    entity.get(field).cloned().unwrap_or(Value::Null)
}

/// Convert one raw result row into a fresh entity, coercing each cell
/// per its field's storage type.
fn materialize(mapping: &EntityMapping, row: Vec<Value>) -> Result<Entity> {
    let mut entity = Entity::new(mapping.entity_name());
    for (field, raw) in mapping.fields().iter().zip(row) {
        let value = Value::coerce(raw, &field.name, field.storage_type)?;
        if !value.is_null() {
            entity.set(&field.name, value);
        }
    }
    Ok(entity)
}
