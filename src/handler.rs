//! Handler signatures, argument binding and type erasure.
//!
//! # From plain function to endpoint
//!
//! A handler declares its parameters once, next to the function, as a
//! [`Signature`]. At startup the signature is validated and turned into an
//! [`Adapter`]; at request time the adapter collects arguments from the body,
//! query string and path, and calls the handler with them.
//!
//! ```text
//! async fn get_blog(args: Args) -> Result<Reply, ApiError> { … }   ← user writes this
//!        ↓ Endpoint::new("get_blog", Signature::new().required("id"), get_blog)
//! get_blog.into_boxed_handler()                  ← Handler blanket impl
//!        ↓
//! Adapter::new(name, signature, handler)?        ← signature validated once
//!        ↓  stored in the route table as Arc<Adapter>
//! adapter.call(req)  at request time             ← args bound, handler invoked
//! ```
//!
//! Parameters fall into four kinds:
//!
//! | Kind | Declared with | Bound from |
//! |---|---|---|
//! | required named | [`Signature::required`] | body / query / path; `400` if absent |
//! | optional named | [`Signature::optional`] | same, else the declared default |
//! | request context | [`Signature::request`] | the [`Request`] itself |
//! | catch-all | [`Signature::catch_all`] | every other body / query key |
//!
//! The request parameter, if any, comes after every named parameter and
//! before the catch-all; the catch-all is always last.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::body::{parse_body, parse_query};
use crate::error::{ApiError, Error};
use crate::reply::Reply;
use crate::request::Request;
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler hands back: a raw result, or a domain error.
pub type HandlerResult = Result<Reply, ApiError>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, args: Args) -> BoxFuture<'static, HandlerResult>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler function.
///
/// Automatically satisfied for any function or closure of the shape
///
/// ```text
/// Fn(Args) -> impl Future<Output = Result<impl Into<Reply>, ApiError>>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging the typed handler to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
    fn call(&self, args: Args) -> BoxFuture<'static, HandlerResult> {
        let fut = (self.0)(args);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}

// ── Signature ─────────────────────────────────────────────────────────────────

/// Reserved argument name under which the request is injected.
pub const REQUEST_PARAM: &str = "request";

/// One declared handler parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    Required(String),
    Optional(String, Value),
    Request,
    CatchAll,
}

/// The ordered parameter list of a handler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.params.push(Param::Required(name.to_owned()));
        self
    }

    pub fn optional(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.params.push(Param::Optional(name.to_owned(), default.into()));
        self
    }

    /// Receive the [`Request`] through [`Args::request`].
    pub fn request(mut self) -> Self {
        self.params.push(Param::Request);
        self
    }

    /// Accept any extra named value.
    pub fn catch_all(mut self) -> Self {
        self.params.push(Param::CatchAll);
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

// ── Args ──────────────────────────────────────────────────────────────────────

/// The arguments bound for one handler invocation.
#[derive(Debug)]
pub struct Args {
    values: Map<String, Value>,
    request: Option<Request>,
}

impl Args {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// A string argument. Non-string values read as absent.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Deserializes an argument into `T`.
    ///
    /// Query, form and path values arrive as strings; if `T` does not accept
    /// the string itself, its content is tried as JSON (so `"5"` reads as `5i64`).
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ApiError::value_error(name, format!("missing argument: {name}")))?;
        serde_json::from_value(value.clone())
            .or_else(|e| match value {
                Value::String(s) => serde_json::from_str(s).map_err(|_| e),
                _ => Err(e),
            })
            .map_err(|e| ApiError::value_error(name, format!("invalid {name}: {e}")))
    }

    /// The request, for handlers declaring [`Signature::request`].
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }
}

// ── Adapter ───────────────────────────────────────────────────────────────────

/// A handler bound to its validated signature.
pub struct Adapter {
    name: String,
    handler: BoxedHandler,
    has_request: bool,
    has_catch_all: bool,
    named: Vec<String>,
    required: Vec<String>,
    defaults: Vec<(String, Value)>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name)
            .field("named", &self.named)
            .field("required", &self.required)
            .field("has_request", &self.has_request)
            .field("has_catch_all", &self.has_catch_all)
            .finish_non_exhaustive()
    }
}

impl Adapter {
    /// Classifies the signature's parameters.
    ///
    /// Fails if the request parameter is followed by a named parameter, if
    /// anything follows the catch-all, or if a name repeats or is reserved.
    pub fn new(name: &str, signature: &Signature, handler: BoxedHandler) -> Result<Self, Error> {
        let mut adapter = Self {
            name: name.to_owned(),
            handler,
            has_request: false,
            has_catch_all: false,
            named: Vec::new(),
            required: Vec::new(),
            defaults: Vec::new(),
        };
        let mut seen = HashSet::new();

        for param in signature.params() {
            if adapter.has_catch_all {
                return Err(Error::signature(name, "catch-all parameter must be the last parameter"));
            }
            match param {
                Param::Request if adapter.has_request => {
                    return Err(Error::signature(name, "request parameter declared twice"));
                }
                Param::Request => adapter.has_request = true,
                Param::CatchAll => adapter.has_catch_all = true,
                Param::Required(arg) | Param::Optional(arg, _) => {
                    if adapter.has_request {
                        return Err(Error::signature(
                            name,
                            format!("request parameter must be the last named parameter, found `{arg}` after it"),
                        ));
                    }
                    if arg == REQUEST_PARAM {
                        return Err(Error::signature(name, format!("`{REQUEST_PARAM}` is a reserved parameter name")));
                    }
                    if !seen.insert(arg.as_str()) {
                        return Err(Error::signature(name, format!("duplicate parameter `{arg}`")));
                    }
                    adapter.named.push(arg.clone());
                    match param {
                        Param::Optional(_, default) => adapter.defaults.push((arg.clone(), default.clone())),
                        _ => adapter.required.push(arg.clone()),
                    }
                }
            }
        }
        Ok(adapter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds arguments from `req`, invokes the handler and returns its raw result.
    ///
    /// Client errors (bad content type, missing argument) come back as a
    /// finished `400` response; an [`ApiError`] comes back as its mapping.
    ///
    /// Arguments always come from the raw body and query, never from
    /// [`Request::data`]: the adapter works without the data stage, at the
    /// cost of parsing a `POST` body twice when both run.
    pub async fn call(&self, req: Request) -> Reply {
        let mut parsed = None;
        if self.has_catch_all || !self.named.is_empty() {
            if req.method == Method::POST {
                match parse_body(&req).await {
                    Ok(map) => parsed = Some(map),
                    Err(e) => return Reply::Response(Response::bad_request(e.to_string())),
                }
            }
            if req.method == Method::GET {
                if let Some(query) = req.query_string().filter(|q| !q.is_empty()) {
                    parsed = Some(parse_query(query));
                }
            }
        }

        let mut values = match parsed {
            None => req.params.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect(),
            Some(mut values) => {
                if !self.has_catch_all && !self.named.is_empty() {
                    values.retain(|key, _| self.named.iter().any(|n| n == key));
                }
                for (key, value) in &req.params {
                    if values.contains_key(key) {
                        warn!(handler = %self.name, arg = %key, "duplicate arg name in named arg and path parameter");
                    }
                    values.insert(key.clone(), Value::String(value.clone()));
                }
                values
            }
        };

        if let Some(missing) = self.required.iter().find(|name| !values.contains_key(*name)) {
            return Reply::Response(Response::bad_request(format!("Missing argument: {missing}")));
        }
        for (name, default) in &self.defaults {
            values.entry(name.clone()).or_insert_with(|| default.clone());
        }

        debug!(handler = %self.name, args = %serde_json::Value::Object(values.clone()), "call with args");
        let args = Args { values, request: self.has_request.then_some(req) };

        match self.handler.call(args).await {
            Ok(reply) => reply,
            Err(e) => {
                info!(handler = %self.name, error = %e, "handler raised api error");
                Reply::from(e)
            }
        }
    }
}
