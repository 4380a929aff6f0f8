//! Field descriptors.

use std::fmt;

use serde_json::Value;

/// The storage kind of a column. Each kind carries its own DDL and default.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    String,
    Boolean,
    Integer,
    Float,
    Text,
}

impl ColumnType {
    pub fn ddl(self) -> &'static str {
        match self {
            Self::String  => "varchar(100)",
            Self::Boolean => "boolean",
            Self::Integer => "bigint",
            Self::Float   => "real",
            Self::Text    => "text",
        }
    }

    fn default_value(self) -> FieldDefault {
        match self {
            Self::Boolean => FieldDefault::Value(Value::Bool(false)),
            Self::Integer => FieldDefault::Value(Value::from(0)),
            Self::Float   => FieldDefault::Value(Value::from(0.0)),
            Self::String | Self::Text => FieldDefault::None,
        }
    }
}

/// What to store when an instance leaves a field empty.
#[derive(Clone, Debug)]
pub enum FieldDefault {
    None,
    Value(Value),
    /// Evaluated once per instance; the result is written back.
    Generate(fn() -> Value),
}

/// Metadata for one entity attribute.
///
/// ```rust
/// use awe::orm::Field;
///
/// let id = Field::string("id").primary_key().ddl("varchar(50)");
/// let admin = Field::boolean("admin");
/// let created = Field::float("created_at").column("created");
/// assert_eq!(created.column_name(), "created");
/// ```
#[derive(Clone)]
pub struct Field {
    name: String,
    column: Option<String>,
    column_type: ColumnType,
    ddl: String,
    primary_key: bool,
    default: FieldDefault,
}

impl Field {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_owned(),
            column: None,
            column_type,
            ddl: column_type.ddl().to_owned(),
            primary_key: false,
            default: column_type.default_value(),
        }
    }

    pub fn string(name: &str) -> Self { Self::new(name, ColumnType::String) }
    pub fn boolean(name: &str) -> Self { Self::new(name, ColumnType::Boolean) }
    pub fn integer(name: &str) -> Self { Self::new(name, ColumnType::Integer) }
    pub fn float(name: &str) -> Self { Self::new(name, ColumnType::Float) }
    pub fn text(name: &str) -> Self { Self::new(name, ColumnType::Text) }

    /// Stores the attribute under a different column name.
    pub fn column(mut self, column: &str) -> Self {
        self.column = Some(column.to_owned());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    pub fn default_with(mut self, generate: fn() -> Value) -> Self {
        self.default = FieldDefault::Generate(generate);
        self
    }

    /// Overrides the column definition, e.g. `varchar(50)`.
    pub fn ddl(mut self, ddl: &str) -> Self {
        self.ddl = ddl.to_owned();
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn column_type(&self) -> ColumnType { self.column_type }
    pub fn column_ddl(&self) -> &str { &self.ddl }
    pub fn is_primary_key(&self) -> bool { self.primary_key }
    pub fn default_spec(&self) -> &FieldDefault { &self.default }

    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    /// The default for this field, if any, generating a fresh one when needed.
    pub fn default_value(&self) -> Option<Value> {
        match &self.default {
            FieldDefault::None => None,
            FieldDefault::Value(v) => Some(v.clone()),
            FieldDefault::Generate(f) => Some(f()),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?}, {}:{}>", self.column_type, self.ddl, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_id() -> Value {
        Value::from("generated")
    }

    #[test]
    fn kinds_carry_ddl_and_defaults() {
        assert_eq!(Field::string("s").column_ddl(), "varchar(100)");
        assert_eq!(Field::string("s").default_value(), None);
        assert_eq!(Field::boolean("b").default_value(), Some(Value::Bool(false)));
        assert_eq!(Field::integer("i").column_ddl(), "bigint");
        assert_eq!(Field::integer("i").default_value(), Some(Value::from(0)));
        assert_eq!(Field::float("f").default_value(), Some(Value::from(0.0)));
        assert_eq!(Field::text("t").column_ddl(), "text");
    }

    #[test]
    fn generator_runs_on_demand() {
        let field = Field::string("id").primary_key().default_with(next_id);
        assert!(field.is_primary_key());
        assert_eq!(field.default_value(), Some(Value::from("generated")));
    }

    #[test]
    fn column_name_falls_back_to_attribute_name() {
        assert_eq!(Field::text("content").column_name(), "content");
        assert_eq!(Field::text("content").column("body").column_name(), "body");
    }
}
