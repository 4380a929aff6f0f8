//! The entity trait and generic field access.
//!
//! Entities are plain structs. Serde provides the field-name → value view
//! the mapper needs for argument binding and default resolution; the
//! declared [`Field`] list provides the table mapping.
//!
//! ```rust
//! use awe::orm::{Entity, Field};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: Option<String>,
//!     email: String,
//!     admin: bool,
//! }
//!
//! impl Entity for User {
//!     const NAME: &'static str = "User";
//!
//!     fn table() -> Option<&'static str> { Some("users") }
//!
//!     fn fields() -> Vec<Field> {
//!         vec![
//!             Field::string("id").primary_key().ddl("varchar(50)"),
//!             Field::string("email"),
//!             Field::boolean("admin"),
//!         ]
//!     }
//! }
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::field::{ColumnType, Field};
use super::pool::Row;
use super::schema::EntitySchema;
use crate::error::Error;

/// A type mapped onto one table.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name, used as the table name unless [`Entity::table`] says otherwise.
    const NAME: &'static str;

    fn table() -> Option<&'static str> {
        None
    }

    /// Field descriptors in declaration order; exactly one must be the key.
    fn fields() -> Vec<Field>;
}

/// The entity's attributes as a field-name → value mapping.
pub fn to_values<E: Entity>(entity: &E) -> Result<Map<String, Value>, Error> {
    match serde_json::to_value(entity)? {
        Value::Object(values) => Ok(values),
        _ => Err(Error::schema(E::NAME, "entity does not serialize to a mapping")),
    }
}

pub(crate) fn from_values<E: Entity>(values: Map<String, Value>) -> Result<E, Error> {
    Ok(serde_json::from_value(Value::Object(values))?)
}

/// The current value of `field`; absent reads as null.
pub(crate) fn value_of(values: &Map<String, Value>, field: &Field) -> Value {
    values.get(field.name()).cloned().unwrap_or(Value::Null)
}

/// The current value of `field`, or its default when empty.
///
/// A default is resolved once and stored back into `values`, so generated
/// values (ids, timestamps) stay stable for the instance.
pub(crate) fn value_or_default(values: &mut Map<String, Value>, field: &Field) -> Value {
    match values.get(field.name()) {
        Some(value) if !value.is_null() => value.clone(),
        _ => match field.default_value() {
            Some(default) => {
                debug!(field = field.name(), value = %default, "using default value");
                values.insert(field.name().to_owned(), default.clone());
                default
            }
            None => Value::Null,
        },
    }
}

/// Maps a row keyed by column onto an entity keyed by field.
pub(crate) fn from_row<E: Entity>(schema: &EntitySchema, row: Row) -> Result<E, Error> {
    let mut values = Map::with_capacity(row.len());
    for (column, value) in row {
        match schema.field_by_column(&column) {
            Some(field) => values.insert(field.name().to_owned(), coerce(field.column_type(), value)),
            None => values.insert(column, value),
        };
    }
    from_values(values)
}

/// SQLite has no boolean or strict real storage; restore what the field declares.
fn coerce(column_type: ColumnType, value: Value) -> Value {
    match (column_type, value) {
        (ColumnType::Boolean, Value::Number(n)) => Value::Bool(n.as_i64().is_some_and(|n| n != 0)),
        (ColumnType::Float, Value::Number(n)) if !n.is_f64() => {
            n.as_f64().map_or(Value::Number(n), Value::from)
        }
        (_, value) => value,
    }
}
