//! Entity-level queries on top of the pool.
//!
//! ```rust,no_run
//! # use awe::orm::{Db, Entity, Field, FindAll};
//! # #[derive(serde::Serialize, serde::Deserialize)]
//! # struct Blog { id: String, created_at: f64 }
//! # impl Entity for Blog {
//! #     const NAME: &'static str = "Blog";
//! #     fn fields() -> Vec<Field> { vec![Field::string("id").primary_key(), Field::float("created_at")] }
//! # }
//! # async fn run(db: Db) -> Result<(), awe::Error> {
//! let latest: Vec<Blog> = db
//!     .find_all(FindAll::new().order_by("created_at desc").limit((0, 10)))
//!     .await?;
//! let total = db.count::<Blog>("count(id)", None, &[]).await?;
//! # Ok(()) }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::entity::{self, Entity};
use super::pool::Pool;
use super::schema::{EntitySchema, SchemaRegistry, quote};
use crate::error::Error;

// ── Limit ─────────────────────────────────────────────────────────────────────

/// A `LIMIT` clause: a row count, or an offset and a row count.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Limit {
    Count(i64),
    Range(i64, i64),
}

impl Limit {
    /// Accepts a non-negative integer or a two-element array of them.
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        let int = |v: &Value| v.as_i64().filter(|n| *n >= 0);
        let invalid = || Error::InvalidLimit(value.to_string());
        match value {
            Value::Number(_) => int(value).map(Self::Count).ok_or_else(invalid),
            Value::Array(pair) if pair.len() == 2 => match (int(&pair[0]), int(&pair[1])) {
                (Some(offset), Some(count)) => Ok(Self::Range(offset, count)),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }

    fn to_value(self) -> Value {
        match self {
            Self::Count(n) => Value::from(n),
            Self::Range(offset, count) => Value::from(vec![offset, count]),
        }
    }
}

impl From<i64> for Limit {
    fn from(n: i64) -> Self { Self::Count(n) }
}

impl From<i32> for Limit {
    fn from(n: i32) -> Self { Self::Count(n.into()) }
}

impl From<(i64, i64)> for Limit {
    fn from((offset, count): (i64, i64)) -> Self { Self::Range(offset, count) }
}

impl From<(i32, i32)> for Limit {
    fn from((offset, count): (i32, i32)) -> Self { Self::Range(offset.into(), count.into()) }
}

// ── FindAll ───────────────────────────────────────────────────────────────────

/// Optional clauses for [`Db::find_all`].
#[derive(Clone, Debug, Default)]
pub struct FindAll {
    filter: Option<String>,
    args: Vec<Value>,
    order_by: Option<String>,
    limit: Option<Value>,
}

impl FindAll {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `WHERE` condition with `?` placeholders and their arguments.
    pub fn filter(mut self, condition: &str, args: impl IntoIterator<Item = Value>) -> Self {
        self.filter = Some(condition.to_owned());
        self.args = args.into_iter().collect();
        self
    }

    pub fn order_by(mut self, order: &str) -> Self {
        self.order_by = Some(order.to_owned());
        self
    }

    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = Some(limit.into().to_value());
        self
    }

    /// A limit taken from untyped input, e.g. a request argument. Checked
    /// when the query is built.
    pub fn limit_value(mut self, limit: Value) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Appends the clauses to `select`. Limit values are appended to the
    /// arguments in clause order.
    pub fn to_sql(&self, select: &str) -> Result<(String, Vec<Value>), Error> {
        let mut sql = vec![select.to_owned()];
        let mut args = self.args.clone();
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            sql.push(format!("WHERE {filter}"));
        }
        if let Some(order) = self.order_by.as_deref().filter(|o| !o.is_empty()) {
            sql.push(format!("ORDER BY {order}"));
        }
        if let Some(limit) = &self.limit {
            match Limit::from_value(limit)? {
                Limit::Count(n) => {
                    sql.push("LIMIT ?".to_owned());
                    args.push(Value::from(n));
                }
                Limit::Range(offset, count) => {
                    sql.push("LIMIT ?, ?".to_owned());
                    args.extend([Value::from(offset), Value::from(count)]);
                }
            }
        }
        Ok((sql.join(" "), args))
    }
}

// ── Db ────────────────────────────────────────────────────────────────────────

/// The query engine: the pool plus the schemas of every registered entity.
#[derive(Clone, Debug)]
pub struct Db {
    pool: Pool,
    registry: Arc<SchemaRegistry>,
}

impl Db {
    pub fn new(pool: Pool, registry: SchemaRegistry) -> Self {
        Self { pool, registry: Arc::new(registry) }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn schema<E: Entity>(&self) -> Result<Arc<EntitySchema>, Error> {
        self.registry.get::<E>()
    }

    /// Looks an entity up by primary key. No match is `Ok(None)`.
    pub async fn find<E: Entity>(&self, pk: impl Into<Value>) -> Result<Option<E>, Error> {
        let schema = self.schema::<E>()?;
        let sql = format!("{} WHERE {}=?", schema.select_sql(), quote(schema.primary_key().column_name()));
        let mut rows = self.pool.select(&sql, &[pk.into()], Some(1)).await?;
        match rows.pop() {
            Some(row) => Ok(Some(entity::from_row(&schema, row)?)),
            None => Ok(None),
        }
    }

    /// Every entity matching the optional clauses.
    ///
    /// A malformed limit fails before a connection is acquired.
    pub async fn find_all<E: Entity>(&self, query: FindAll) -> Result<Vec<E>, Error> {
        let schema = self.schema::<E>()?;
        let (sql, args) = query.to_sql(schema.select_sql())?;
        let rows = self.pool.select(&sql, &args, None).await?;
        rows.into_iter().map(|row| entity::from_row(&schema, row)).collect()
    }

    /// `SELECT <expr> AS _num_ FROM table [WHERE ...]`, first row only.
    ///
    /// No row and a `NULL` result are both `None`.
    pub async fn count<E: Entity>(&self, expr: &str, filter: Option<&str>, args: &[Value]) -> Result<Option<Value>, Error> {
        let schema = self.schema::<E>()?;
        let mut sql = format!("SELECT {expr} AS _num_ FROM {}", quote(schema.table()));
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        let mut rows = self.pool.select(&sql, args, Some(1)).await?;
        Ok(rows.pop().and_then(|mut row| row.remove("_num_")).filter(|v| !v.is_null()))
    }

    /// Inserts `entity`. Empty fields take their defaults, which are written
    /// back to `entity`.
    pub async fn save<E: Entity>(&self, entity: &mut E) -> Result<(), Error> {
        let schema = self.schema::<E>()?;
        let mut values = entity::to_values(entity)?;
        let mut args: Vec<Value> = schema.fields().iter().map(|f| entity::value_or_default(&mut values, f)).collect();
        args.push(entity::value_or_default(&mut values, schema.primary_key()));
        *entity = entity::from_values(values)?;

        let rows = self.pool.execute(schema.insert_sql(), &args).await?;
        if rows != 1 {
            warn!(entity = schema.entity(), affected = rows, "failed to insert record");
        }
        Ok(())
    }

    /// Writes every non-key field of `entity` to the row with its key.
    pub async fn update<E: Entity>(&self, entity: &E) -> Result<(), Error> {
        let schema = self.schema::<E>()?;
        if schema.update_sql().is_empty() {
            warn!(entity = schema.entity(), "nothing to update: entity has only a primary key");
            return Ok(());
        }
        let values = entity::to_values(entity)?;
        let mut args: Vec<Value> = schema.fields().iter().map(|f| entity::value_of(&values, f)).collect();
        args.push(entity::value_of(&values, schema.primary_key()));

        let rows = self.pool.execute(schema.update_sql(), &args).await?;
        if rows != 1 {
            warn!(entity = schema.entity(), affected = rows, "failed to update by primary key");
        }
        Ok(())
    }

    /// Deletes the row with `entity`'s key.
    pub async fn remove<E: Entity>(&self, entity: &E) -> Result<(), Error> {
        let schema = self.schema::<E>()?;
        let values = entity::to_values(entity)?;
        let args = [entity::value_of(&values, schema.primary_key())];

        let rows = self.pool.execute(schema.delete_sql(), &args).await?;
        if rows != 1 {
            warn!(entity = schema.entity(), affected = rows, "failed to remove by primary key");
        }
        Ok(())
    }

    /// Creates the table of `E` from its field DDL if it does not exist.
    pub async fn create_table<E: Entity>(&self) -> Result<(), Error> {
        let schema = self.schema::<E>()?;
        self.pool.execute(&schema.create_table_sql(), &[]).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
