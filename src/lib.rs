//! Lightweight object-relational mapping and persistence over SQLite.
//!
//! # Intention
//!
//! - Map plain data-holder entities to relational tables through
//!   declarative mappings registered once at startup.
//! - Generate and verify schema from those mappings, and execute typed
//!   CRUD plus predicate-filtered queries without hand-written SQL.
//!
//! # Architectural Boundaries
//!
//! - Only mapping, query-translation, and persistence code belongs here.
//! - UI, log capture, and application bootstrap are external callers.
//! - Raw SQL is constructed only against vetted identifiers; every
//!   literal reaches the store as a bound parameter.

pub mod driver;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod predicate;
pub mod schema;
pub mod sqlite;
pub mod value;

pub use driver::{ColumnInfo, StorageDriver};
pub use engine::{Entity, PersistenceEngine};
pub use error::{OrmError, Result};
pub use mapping::{EntityMapping, FieldMapping, MappingRegistry, StorageType};
pub use predicate::Predicate;
pub use schema::SchemaManager;
pub use sqlite::SqliteDriver;
pub use value::Value;
