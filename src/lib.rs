//! # awe
//!
//! A small web toolkit in two halves:
//!
//! - a **dispatcher** that turns plain async functions into HTTP endpoints
//!   from a declared parameter list, behind a fixed middleware chain, and
//! - a **mapper** that derives SQL from declared entity fields and binds
//!   rows back onto plain structs.
//!
//! What it leaves to others: TLS, templates (plug one in through
//! [`Templates`]), static file storage (mount one through
//! [`StaticFiles`]), session token formats, migrations.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use awe::{ApiError, App, Args, Endpoint, Router, Server, Signature};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), awe::Error> {
//!     let mut router = Router::new();
//!     router.scan([
//!         Endpoint::new("get_blog", Signature::new().required("id"), get_blog).get("/api/blogs/{id}"),
//!         Endpoint::new("create_blog", Signature::new().required("name").catch_all(), create_blog)
//!             .post("/api/blogs"),
//!     ])?;
//!
//!     Server::bind("127.0.0.1:9000")?.serve(App::new(router)).await
//! }
//!
//! async fn get_blog(args: Args) -> Result<Value, ApiError> {
//!     let id: i64 = args.parse("id")?;
//!     Ok(json!({ "id": id }))
//! }
//!
//! async fn create_blog(args: Args) -> Result<Value, ApiError> {
//!     let name = args.str("name").unwrap_or_default();
//!     if name.trim().is_empty() {
//!         return Err(ApiError::value_error("name", "name cannot be empty."));
//!     }
//!     Ok(json!({ "__template__": "blog.html", "name": name }))
//! }
//! ```

mod assets;
mod body;
mod error;
mod handler;
mod reply;
mod request;
mod response;
mod router;
mod server;
mod template;

pub mod config;
pub mod middleware;
pub mod orm;

pub use assets::StaticFiles;
pub use config::Config;
pub use error::{ApiError, Error};
pub use handler::{Adapter, Args, BoxFuture, Handler, HandlerResult, Param, REQUEST_PARAM, Signature};
pub use reply::{REDIRECT_PREFIX, Reply, TEMPLATE_KEY, USER_KEY};
pub use request::Request;
pub use response::{ContentType, Response, ResponseBuilder};
pub use router::{Endpoint, Router};
pub use server::{App, Server};
pub use template::Templates;
