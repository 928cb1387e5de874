use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{OrmError, Result};

/// Storage types a mapped field can take. The variant determines the
/// generated column type, literal parsing in predicates, and the
/// coercion applied when rows are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Integer,
    Text,
    Real,
    Boolean,
    DateTime,
}

impl StorageType {
    /// Column type emitted in CREATE TABLE. Booleans ride on INTEGER
    /// (0/1) and datetimes on TEXT (ISO-8601).
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Text | Self::DateTime => "TEXT",
            Self::Real => "REAL",
        }
    }

    /// Type-family compatibility against the declared type of an
    /// existing column, used by the schema drift check. Matching is
    /// affinity-style: an INT-family column satisfies Integer/Boolean,
    /// a TEXT-family column satisfies Text/DateTime, and so on.
    pub fn accepts_declared_type(self, declared: &str) -> bool {
        let declared = declared.to_ascii_uppercase();
        match self {
            Self::Integer | Self::Boolean => declared.contains("INT") || declared.contains("BOOL"),
            Self::Text | Self::DateTime => {
                declared.contains("TEXT")
                    || declared.contains("CHAR")
                    || declared.contains("CLOB")
                    || declared.contains("DATE")
                    || declared.contains("TIME")
            }
            Self::Real => {
                declared.contains("REAL")
                    || declared.contains("FLOA")
                    || declared.contains("DOUB")
            }
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Real => "real",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// One field-to-column correspondence within an entity mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub name: String,
    pub column: String,
    pub storage_type: StorageType,
    pub nullable: bool,
}

impl FieldMapping {
    pub fn new(name: &str, storage_type: StorageType) -> Self {
        Self {
            name: name.to_string(),
            column: name.to_string(),
            storage_type,
            nullable: false,
        }
    }

    pub fn with_column(mut self, column: &str) -> Self {
        self.column = column.to_string();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// The complete declarative mapping for one entity type. Built once by
/// the registry and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    entity_name: String,
    table_name: String,
    fields: Vec<FieldMapping>,
    primary_key: usize,
}

impl EntityMapping {
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Fields in declaration order; this order also fixes column order
    /// in generated statements.
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key_field(&self) -> &FieldMapping {
        &self.fields[self.primary_key]
    }
}

/// Process-wide registry of entity mappings. Populated once at startup
/// and read-only afterwards; lookups hand out `Arc` clones, so concurrent
/// reads after registration need no locking.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    mappings: HashMap<String, Arc<EntityMapping>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping. `table_name` defaults to the entity name.
    pub fn register(
        &mut self,
        entity_name: &str,
        table_name: Option<&str>,
        fields: Vec<FieldMapping>,
        primary_key_field: &str,
    ) -> Result<Arc<EntityMapping>> {
        if self.mappings.contains_key(entity_name) {
            return Err(OrmError::DuplicateMapping(entity_name.to_string()));
        }
        let table_name = table_name.unwrap_or(entity_name);
        let mapping = Self::build(entity_name, table_name, fields, primary_key_field)?;
        let mapping = Arc::new(mapping);
        self.mappings
            .insert(entity_name.to_string(), Arc::clone(&mapping));
        Ok(mapping)
    }

    pub fn lookup(&self, entity_name: &str) -> Result<Arc<EntityMapping>> {
        self.mappings
            .get(entity_name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownEntity(entity_name.to_string()))
    }

    /// Load and register every entity from a JSON mapping specification.
    /// Malformed specifications fail here, at startup, not at first use.
    pub fn load_spec(&mut self, json: &str) -> Result<()> {
        let spec: MappingSpec = serde_json::from_str(json)
            .map_err(|e| OrmError::InvalidMapping(format!("malformed mapping spec: {e}")))?;
        for entity in spec.entities {
            let fields = entity
                .fields
                .into_iter()
                .map(|f| FieldMapping {
                    column: f.column.unwrap_or_else(|| f.name.clone()),
                    name: f.name,
                    storage_type: f.storage_type,
                    nullable: f.nullable,
                })
                .collect();
            self.register(
                &entity.entity,
                entity.table.as_deref(),
                fields,
                &entity.primary_key,
            )?;
        }
        Ok(())
    }

    fn build(
        entity_name: &str,
        table_name: &str,
        fields: Vec<FieldMapping>,
        primary_key_field: &str,
    ) -> Result<EntityMapping> {
        vet_identifier(entity_name, "entity name")?;
        vet_identifier(table_name, "table name")?;
        if fields.is_empty() {
            return Err(OrmError::InvalidMapping(format!(
                "entity '{entity_name}' has no fields"
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            vet_identifier(&field.name, "field name")?;
            vet_identifier(&field.column, "column name")?;
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(OrmError::InvalidMapping(format!(
                    "duplicate field '{}' in entity '{entity_name}'",
                    field.name
                )));
            }
            if fields[..i].iter().any(|f| f.column == field.column) {
                return Err(OrmError::InvalidMapping(format!(
                    "duplicate column '{}' in entity '{entity_name}'",
                    field.column
                )));
            }
        }
        let primary_key = fields
            .iter()
            .position(|f| f.name == primary_key_field)
            .ok_or_else(|| {
                OrmError::InvalidMapping(format!(
                    "primary key field '{primary_key_field}' is not among the fields of '{entity_name}'"
                ))
            })?;
        if fields[primary_key].nullable {
            return Err(OrmError::InvalidMapping(format!(
                "primary key field '{primary_key_field}' of '{entity_name}' must not be nullable"
            )));
        }
        Ok(EntityMapping {
            entity_name: entity_name.to_string(),
            table_name: table_name.to_string(),
            fields,
            primary_key,
        })
    }
}

/// Identifiers end up spliced into DDL/DML text, so they are restricted
/// to `[A-Za-z_][A-Za-z0-9_]*` at registration time.
fn vet_identifier(name: &str, what: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(OrmError::InvalidMapping(format!(
            "{what} '{name}' is not a valid identifier"
        )))
    }
}

/// Serde shape of the declarative mapping specification.
#[derive(Debug, Deserialize)]
struct MappingSpec {
    entities: Vec<EntitySpec>,
}

#[derive(Debug, Deserialize)]
struct EntitySpec {
    entity: String,
    #[serde(default)]
    table: Option<String>,
    fields: Vec<FieldSpec>,
    primary_key: String,
}

#[derive(Debug, Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(default)]
    column: Option<String>,
    #[serde(rename = "type")]
    storage_type: StorageType,
    #[serde(default)]
    nullable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_a_fields() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("aId", StorageType::Integer),
            FieldMapping::new("aString", StorageType::Text),
            FieldMapping::new("aDate", StorageType::DateTime),
            FieldMapping::new("aBoolean", StorageType::Boolean),
            FieldMapping::new("aFloat", StorageType::Real),
        ]
    }

    #[test]
    fn registers_and_looks_up() {
        let mut registry = MappingRegistry::new();
        registry
            .register("ClassA", None, class_a_fields(), "aId")
            .unwrap();
        let mapping = registry.lookup("ClassA").unwrap();
        assert_eq!(mapping.table_name(), "ClassA");
        assert_eq!(mapping.fields().len(), 5);
        assert_eq!(mapping.primary_key_field().name, "aId");
    }

    #[test]
    fn rejects_duplicate_entity() {
        let mut registry = MappingRegistry::new();
        registry
            .register("ClassA", None, class_a_fields(), "aId")
            .unwrap();
        let err = registry
            .register("ClassA", None, class_a_fields(), "aId")
            .unwrap_err();
        assert!(matches!(err, OrmError::DuplicateMapping(_)));
    }

    #[test]
    fn rejects_unknown_primary_key() {
        let mut registry = MappingRegistry::new();
        let err = registry
            .register("ClassA", None, class_a_fields(), "noSuchField")
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidMapping(_)));
    }

    #[test]
    fn rejects_nullable_primary_key() {
        let mut registry = MappingRegistry::new();
        let fields = vec![FieldMapping::new("id", StorageType::Integer).nullable()];
        let err = registry.register("E", None, fields, "id").unwrap_err();
        assert!(matches!(err, OrmError::InvalidMapping(_)));
    }

    #[test]
    fn rejects_column_collision() {
        let mut registry = MappingRegistry::new();
        let fields = vec![
            FieldMapping::new("a", StorageType::Integer),
            FieldMapping::new("b", StorageType::Integer).with_column("a"),
        ];
        let err = registry.register("E", None, fields, "a").unwrap_err();
        assert!(matches!(err, OrmError::InvalidMapping(_)));
    }

    #[test]
    fn rejects_hostile_identifier() {
        let mut registry = MappingRegistry::new();
        let fields = vec![FieldMapping::new("id", StorageType::Integer)];
        let err = registry
            .register("t; DROP TABLE x", None, fields, "id")
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidMapping(_)));
    }

    #[test]
    fn unknown_entity_lookup_fails() {
        let registry = MappingRegistry::new();
        let err = registry.lookup("Nope").unwrap_err();
        assert!(matches!(err, OrmError::UnknownEntity(_)));
    }

    #[test]
    fn loads_json_spec() {
        let mut registry = MappingRegistry::new();
        registry
            .load_spec(
                r#"{
                    "entities": [{
                        "entity": "ClassA",
                        "table": "class_a",
                        "primary_key": "aId",
                        "fields": [
                            {"name": "aId", "type": "integer"},
                            {"name": "aString", "type": "text"},
                            {"name": "aDate", "type": "datetime"},
                            {"name": "aBoolean", "type": "boolean"},
                            {"name": "aFloat", "type": "real", "nullable": true}
                        ]
                    }]
                }"#,
            )
            .unwrap();
        let mapping = registry.lookup("ClassA").unwrap();
        assert_eq!(mapping.table_name(), "class_a");
        assert!(mapping.field("aFloat").unwrap().nullable);
        assert_eq!(
            mapping.field("aDate").unwrap().storage_type,
            StorageType::DateTime
        );
    }

    #[test]
    fn malformed_spec_fails_fast() {
        let mut registry = MappingRegistry::new();
        let err = registry.load_spec("{ not json").unwrap_err();
        assert!(matches!(err, OrmError::InvalidMapping(_)));
    }
}
