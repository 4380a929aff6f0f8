//! Templating collaborator interface.
//!
//! awe does not ship a template engine. Plug one in by implementing
//! [`Templates`] and handing it to the pipeline:
//!
//! ```rust
//! use awe::{Error, Templates};
//! use serde_json::{Map, Value};
//!
//! struct Inline;
//!
//! impl Templates for Inline {
//!     fn render(&self, name: &str, vars: &Map<String, Value>) -> Result<String, Error> {
//!         Ok(format!("<!-- {name} --><pre>{}</pre>", Value::Object(vars.clone())))
//!     }
//! }
//! ```

use serde_json::{Map, Value};

use crate::error::Error;

/// Renders a named template with a mapping of variables.
///
/// The variables are the handler's mapping result with the current user
/// merged in under `__user__`.
pub trait Templates: Send + Sync + 'static {
    fn render(&self, name: &str, vars: &Map<String, Value>) -> Result<String, Error>;
}
