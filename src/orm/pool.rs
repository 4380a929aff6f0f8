//! Connection pool and the two raw query primitives.
//!
//! Every statement acquires a pooled connection for its own duration. The
//! connection is held by a guard and goes back to the pool on every exit
//! path, errors included. There is no timeout on acquisition: a stalled pool
//! stalls the calling task.

use std::str::FromStr;

use futures_util::{StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::info;

use crate::config::DbConfig;
use crate::error::Error;

/// One result row, column name → value, in select order.
pub type Row = Map<String, Value>;

/// The process-wide connection pool.
///
/// Create it once at startup with [`Pool::connect`] and [`close`](Pool::close)
/// it after the server has stopped.
#[derive(Clone, Debug)]
pub struct Pool {
    inner: SqlitePool,
}

impl Pool {
    pub async fn connect(config: &DbConfig) -> Result<Self, Error> {
        info!(url = %config.url, min = config.min_connections, max = config.max_connections, "create database connection pool");
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let inner = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { inner })
    }

    /// Wraps an existing sqlx pool.
    pub fn from_sqlx(inner: SqlitePool) -> Self {
        Self { inner }
    }

    /// Runs `sql` and returns its rows, at most `limit` of them if given.
    pub async fn select(&self, sql: &str, args: &[Value], limit: Option<usize>) -> Result<Vec<Row>, Error> {
        info!(sql, "SQL");
        let sql = translate_placeholders(sql);
        let mut conn = self.inner.acquire().await?;
        let query = bind_all(sqlx::query(&sql), args);
        let rows: Vec<SqliteRow> = match limit {
            Some(n) => query.fetch(&mut *conn).take(n).try_collect().await?,
            None => query.fetch_all(&mut *conn).await?,
        };
        info!(rows = rows.len(), "rows returned");
        rows.iter().map(decode_row).collect()
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, Error> {
        info!(sql, "SQL");
        let sql = translate_placeholders(sql);
        let mut conn = self.inner.acquire().await?;
        let result = bind_all(sqlx::query(&sql), args).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// Waits for checked-out connections to return, then closes them all.
    pub async fn close(&self) {
        self.inner.close().await;
        info!("database connection pool closed");
    }

    pub fn size(&self) -> u32 {
        self.inner.size()
    }
}

/// Numbers `?` placeholders (`?1`, `?2`, …) outside quoted text.
pub(crate) fn translate_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;
    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"' | '`') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '?') => {
                n += 1;
                out.push('?');
                out.push_str(&n.to_string());
                continue;
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_all<'q>(mut query: SqliteQuery<'q>, args: &[Value]) -> SqliteQuery<'q> {
    for arg in args {
        query = bind_value(query, arg);
    }
    query
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Decodes by the storage class of each value, not the declared column type.
fn decode_row(row: &SqliteRow) -> Result<Row, Error> {
    let mut out = Row::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_owned();
            match storage.as_str() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Value::from(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                    Value::from(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::from(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        out.insert(column.name().to_owned(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn memory_pool() -> Pool {
        let config = DbConfig { url: "sqlite::memory:".into(), min_connections: 1, max_connections: 1 };
        Pool::connect(&config).await.unwrap()
    }

    #[test]
    fn placeholders_are_numbered_outside_quotes() {
        assert_eq!(translate_placeholders("SELECT * FROM `t` WHERE `a`=? AND `b`=?"), "SELECT * FROM `t` WHERE `a`=?1 AND `b`=?2");
        assert_eq!(translate_placeholders("SELECT '?' , ?"), "SELECT '?' , ?1");
        assert_eq!(translate_placeholders("SELECT `we?ird` FROM t"), "SELECT `we?ird` FROM t");
    }

    #[tokio::test]
    async fn execute_then_select_round_trip() {
        let pool = memory_pool().await;
        pool.execute("CREATE TABLE `t` (`id` varchar(10) PRIMARY KEY, `n` bigint, `x` real, `s` text)", &[])
            .await
            .unwrap();

        let affected = pool
            .execute("INSERT INTO `t` (`n`, `x`, `s`, `id`) VALUES (?, ?, ?, ?)", &[json!(3), json!(1.5), Value::Null, json!("a")])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        pool.execute("INSERT INTO `t` (`n`, `x`, `s`, `id`) VALUES (?, ?, ?, ?)", &[json!(4), json!(2.5), json!("hi"), json!("b")])
            .await
            .unwrap();

        let rows = pool.select("SELECT `id`, `n`, `x`, `s` FROM `t` ORDER BY `id`", &[], None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(Value::Object(rows[0].clone()), json!({"id": "a", "n": 3, "x": 1.5, "s": null}));
        assert_eq!(rows[1].keys().collect::<Vec<_>>(), ["id", "n", "x", "s"]);

        let limited = pool.select("SELECT `id` FROM `t` ORDER BY `id`", &[], Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn driver_errors_propagate_and_release_the_connection() {
        let pool = memory_pool().await;
        assert!(matches!(pool.select("SELECT * FROM `missing`", &[], None).await, Err(Error::Database(_))));
        // With a single connection, a leaked one would stall here.
        let rows = pool.select("SELECT 1 AS `one`", &[], None).await.unwrap();
        assert_eq!(rows[0]["one"], 1);
    }
}
