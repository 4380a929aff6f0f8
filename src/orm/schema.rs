//! Entity schemas and the registry that holds them.
//!
//! Schemas are derived once at startup from each entity's field list and are
//! read-only afterwards. Derivation fails unless exactly one field is the
//! primary key. Identifiers are backtick-quoted; values are always bound.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::entity::Entity;
use super::field::Field;
use crate::error::Error;

/// Immutable table mapping for one entity type, with its SQL templates.
#[derive(Clone, Debug)]
pub struct EntitySchema {
    entity: String,
    table: String,
    primary_key: Field,
    fields: Vec<Field>,
    select: String,
    insert: String,
    update: String,
    delete: String,
}

impl EntitySchema {
    /// Builds the schema for `entity`, stored in `table` (or a table named
    /// after the entity).
    pub fn derive(entity: &str, table: Option<&str>, declared: Vec<Field>) -> Result<Self, Error> {
        let table = table.unwrap_or(entity).to_owned();
        info!(entity, table = %table, "found model");

        let mut primary_key: Option<Field> = None;
        let mut fields: Vec<Field> = Vec::with_capacity(declared.len());
        for field in declared {
            info!(entity, mapping = ?field, "found mapping");
            if fields.iter().chain(&primary_key).any(|f| f.name() == field.name()) {
                return Err(Error::schema(entity, format!("duplicate field `{}`", field.name())));
            }
            if !field.is_primary_key() {
                fields.push(field);
                continue;
            }
            if let Some(existing) = &primary_key {
                return Err(Error::schema(
                    entity,
                    format!("duplicate primary key `{}`, already `{}`", field.name(), existing.name()),
                ));
            }
            primary_key = Some(field);
        }
        let primary_key = primary_key.ok_or_else(|| Error::schema(entity, "primary key not found"))?;

        let pk = quote(primary_key.column_name());
        let columns: Vec<String> = fields.iter().map(|f| quote(f.column_name())).collect();
        let table_q = quote(&table);

        let select = if columns.is_empty() {
            format!("SELECT {pk} FROM {table_q}")
        } else {
            format!("SELECT {pk}, {} FROM {table_q}", columns.join(", "))
        };
        let insert_columns: Vec<&str> = columns.iter().map(String::as_str).chain([pk.as_str()]).collect();
        let insert = format!(
            "INSERT INTO {table_q} ({}) VALUES ({})",
            insert_columns.join(", "),
            vec!["?"; insert_columns.len()].join(", "),
        );
        let update = if columns.is_empty() {
            String::new()
        } else {
            let assignments: Vec<String> = columns.iter().map(|c| format!("{c}=?")).collect();
            format!("UPDATE {table_q} SET {} WHERE {pk}=?", assignments.join(", "))
        };
        let delete = format!("DELETE FROM {table_q} WHERE {pk}=?");

        Ok(Self { entity: entity.to_owned(), table, primary_key, fields, select, insert, update, delete })
    }

    pub fn entity(&self) -> &str { &self.entity }
    pub fn table(&self) -> &str { &self.table }
    pub fn primary_key(&self) -> &Field { &self.primary_key }

    /// Non-key fields in declared order.
    pub fn fields(&self) -> &[Field] { &self.fields }

    /// `SELECT pk, col1, … FROM table`
    pub fn select_sql(&self) -> &str { &self.select }
    /// `INSERT INTO table (col1, …, pk) VALUES (?, …)`
    pub fn insert_sql(&self) -> &str { &self.insert }
    /// `UPDATE table SET col1=?, … WHERE pk=?`; empty for key-only entities.
    pub fn update_sql(&self) -> &str { &self.update }
    /// `DELETE FROM table WHERE pk=?`
    pub fn delete_sql(&self) -> &str { &self.delete }

    /// Every field, key included, in select order.
    pub fn all_fields(&self) -> impl Iterator<Item = &Field> {
        std::iter::once(&self.primary_key).chain(&self.fields)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&Field> {
        self.all_fields().find(|f| f.column_name() == column)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement built from each field's DDL.
    pub fn create_table_sql(&self) -> String {
        let mut defs = vec![format!("{} {} PRIMARY KEY", quote(self.primary_key.column_name()), self.primary_key.column_ddl())];
        defs.extend(self.fields.iter().map(|f| format!("{} {}", quote(f.column_name()), f.column_ddl())));
        format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(&self.table), defs.join(", "))
    }
}

pub(crate) fn quote(ident: &str) -> String {
    format!("`{ident}`")
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Schemas for every registered entity type, keyed by type.
///
/// Filled at startup, then shared read-only (usually behind an `Arc`).
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<TypeId, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives and stores the schema of `E`. Must run before `E` is queried.
    pub fn register<E: Entity>(&mut self) -> Result<Arc<EntitySchema>, Error> {
        let schema = Arc::new(EntitySchema::derive(E::NAME, E::table(), E::fields())?);
        self.schemas.insert(TypeId::of::<E>(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Chaining form of [`SchemaRegistry::register`].
    pub fn with<E: Entity>(mut self) -> Result<Self, Error> {
        self.register::<E>()?;
        Ok(self)
    }

    pub fn get<E: Entity>(&self) -> Result<Arc<EntitySchema>, Error> {
        self.schemas
            .get(&TypeId::of::<E>())
            .cloned()
            .ok_or_else(|| Error::schema(E::NAME, "entity type is not registered"))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_fields() -> Vec<Field> {
        vec![
            Field::string("id").primary_key().ddl("varchar(50)"),
            Field::string("user_id"),
            Field::string("name"),
            Field::text("content"),
            Field::float("created_at"),
        ]
    }

    #[test]
    fn templates_quote_every_column_once() {
        let schema = EntitySchema::derive("Blog", Some("blogs"), blog_fields()).unwrap();
        assert_eq!(schema.select_sql(), "SELECT `id`, `user_id`, `name`, `content`, `created_at` FROM `blogs`");
        assert_eq!(
            schema.insert_sql(),
            "INSERT INTO `blogs` (`user_id`, `name`, `content`, `created_at`, `id`) VALUES (?, ?, ?, ?, ?)",
        );
        assert_eq!(
            schema.update_sql(),
            "UPDATE `blogs` SET `user_id`=?, `name`=?, `content`=?, `created_at`=? WHERE `id`=?",
        );
        assert_eq!(schema.delete_sql(), "DELETE FROM `blogs` WHERE `id`=?");

        for column in ["id", "user_id", "name", "content", "created_at"] {
            let quoted = format!("`{column}`");
            assert_eq!(schema.select_sql().matches(&quoted).count(), 1);
            assert_eq!(schema.insert_sql().matches(&quoted).count(), 1);
            assert_eq!(schema.update_sql().matches(&quoted).count(), 1);
        }
    }

    #[test]
    fn table_defaults_to_entity_name_and_columns_can_be_renamed() {
        let fields = vec![Field::integer("id").primary_key(), Field::text("body").column("order")];
        let schema = EntitySchema::derive("Note", None, fields).unwrap();
        assert_eq!(schema.table(), "Note");
        assert_eq!(schema.select_sql(), "SELECT `id`, `order` FROM `Note`");
        assert_eq!(schema.field_by_column("order").map(Field::name), Some("body"));
    }

    #[test]
    fn zero_or_two_primary_keys_fail() {
        let none = vec![Field::string("name"), Field::text("content")];
        assert!(matches!(EntitySchema::derive("A", None, none), Err(Error::Schema { .. })));

        let two = vec![Field::string("id").primary_key(), Field::string("email").primary_key()];
        assert!(matches!(EntitySchema::derive("B", None, two), Err(Error::Schema { .. })));
    }

    #[test]
    fn duplicate_field_names_fail() {
        let dup = vec![Field::string("id").primary_key(), Field::string("name"), Field::text("name")];
        assert!(EntitySchema::derive("C", None, dup).is_err());
    }

    #[test]
    fn key_only_entity_has_no_update_template() {
        let schema = EntitySchema::derive("Tag", None, vec![Field::string("id").primary_key()]).unwrap();
        assert_eq!(schema.select_sql(), "SELECT `id` FROM `Tag`");
        assert_eq!(schema.insert_sql(), "INSERT INTO `Tag` (`id`) VALUES (?)");
        assert!(schema.update_sql().is_empty());
    }

    #[test]
    fn create_table_uses_field_ddl() {
        let schema = EntitySchema::derive("Blog", Some("blogs"), blog_fields()).unwrap();
        assert_eq!(
            schema.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS `blogs` (`id` varchar(50) PRIMARY KEY, `user_id` varchar(100), \
             `name` varchar(100), `content` text, `created_at` real)",
        );
    }
}
