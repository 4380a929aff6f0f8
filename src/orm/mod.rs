//! Declarative object-relational mapping.
//!
//! An entity type lists its [`Field`]s once. At startup the
//! [`SchemaRegistry`] derives an [`EntitySchema`] per type, with its fixed
//! select/insert/update/delete templates. [`Db`] runs those templates, and
//! the few optional clauses [`FindAll`] allows, through the [`Pool`].
//!
//! ```rust,no_run
//! use awe::config::DbConfig;
//! use awe::orm::{Db, Pool, SchemaRegistry};
//! # use awe::orm::{Entity, Field};
//! # #[derive(serde::Serialize, serde::Deserialize)]
//! # struct User { id: String }
//! # impl Entity for User {
//! #     const NAME: &'static str = "User";
//! #     fn fields() -> Vec<Field> { vec![Field::string("id").primary_key()] }
//! # }
//!
//! # async fn run(config: DbConfig) -> Result<(), awe::Error> {
//! let registry = SchemaRegistry::new().with::<User>()?;
//! let db = Db::new(Pool::connect(&config).await?, registry);
//!
//! let user: Option<User> = db.find("0015").await?;
//! db.close().await;
//! # Ok(()) }
//! ```

mod entity;
mod field;
mod pool;
mod query;
mod schema;

pub use entity::{Entity, to_values};
pub use field::{ColumnType, Field, FieldDefault};
pub use pool::{Pool, Row};
pub use query::{Db, FindAll, Limit};
pub use schema::{EntitySchema, SchemaRegistry};
