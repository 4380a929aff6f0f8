//! Route table and handler registration.
//!
//! One radix tree per HTTP method, O(path-length) lookup. A handler becomes
//! routable by carrying a routing annotation, `Endpoint::get` or
//! `Endpoint::post`; registration adapts it once and stores the adapter.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;
use tracing::{debug, info};

use crate::error::Error;
use crate::handler::{Adapter, BoxedHandler, Handler, Signature};

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A handler function with its signature and, once annotated, its route.
///
/// ```rust
/// use awe::{ApiError, Args, Endpoint, Signature};
/// use serde_json::{Value, json};
///
/// async fn get_blog(args: Args) -> Result<Value, ApiError> {
///     Ok(json!({ "id": args.str("id") }))
/// }
///
/// let endpoint = Endpoint::new("get_blog", Signature::new().required("id"), get_blog)
///     .get("/api/blogs/{id}");
/// assert_eq!(endpoint.annotation().map(|(_, path)| path), Some("/api/blogs/{id}"));
/// ```
pub struct Endpoint {
    name: String,
    signature: Signature,
    handler: BoxedHandler,
    route: Option<(Method, String)>,
}

impl Endpoint {
    pub fn new(name: &str, signature: Signature, handler: impl Handler) -> Self {
        Self { name: name.to_owned(), signature, handler: handler.into_boxed_handler(), route: None }
    }

    /// Annotates the handler for `GET path`.
    pub fn get(self, path: &str) -> Self {
        self.route(Method::GET, path)
    }

    /// Annotates the handler for `POST path`.
    pub fn post(self, path: &str) -> Self {
        self.route(Method::POST, path)
    }

    pub fn route(mut self, method: Method, path: &str) -> Self {
        self.route = Some((method, path.to_owned()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn annotation(&self) -> Option<(&Method, &str)> {
        self.route.as_ref().map(|(m, p)| (m, p.as_str()))
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application route table.
///
/// Build it once at startup and hand it to [`App::new`](crate::App::new).
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Adapter>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one annotated handler.
    ///
    /// Fails if the handler has no routing annotation, its signature is
    /// invalid, or the path conflicts with an existing route.
    pub fn add(&mut self, endpoint: Endpoint) -> Result<(), Error> {
        let Some((method, path)) = endpoint.route else {
            return Err(Error::Route {
                path: endpoint.name,
                reason: "handler has no method or path annotation".into(),
            });
        };
        let adapter = Adapter::new(&endpoint.name, &endpoint.signature, endpoint.handler)?;
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path.as_str(), Arc::new(adapter))
            .map_err(|e| Error::Route { path: path.clone(), reason: e.to_string() })?;
        info!(%method, %path, handler = %endpoint.name, "add route");
        Ok(())
    }

    /// Registers every annotated handler in `candidates`; the rest are skipped.
    pub fn scan(&mut self, candidates: impl IntoIterator<Item = Endpoint>) -> Result<(), Error> {
        for endpoint in candidates {
            if endpoint.route.is_none() {
                debug!(handler = %endpoint.name, "skipping unannotated handler");
                continue;
            }
            self.add(endpoint)?;
        }
        Ok(())
    }

    /// Chaining form of [`Router::add`].
    pub fn with(mut self, endpoint: Endpoint) -> Result<Self, Error> {
        self.add(endpoint)?;
        Ok(self)
    }

    /// Path parameter values come back percent-decoded. A value that does
    /// not decode to UTF-8 is passed through as matched.
    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(Arc<Adapter>, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let adapter = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| {
                let value = urlencoding::decode(v).map(|d| d.into_owned()).unwrap_or_else(|_| v.to_owned());
                (k.to_owned(), value)
            })
            .collect();
        Some((adapter, params))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::error::ApiError;
    use crate::handler::Args;

    async fn noop(_: Args) -> Result<Value, ApiError> {
        Ok(Value::Null)
    }

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::new(name, Signature::new(), noop)
    }

    #[test]
    fn lookup_extracts_path_params() {
        let mut router = Router::new();
        router.add(endpoint("get_blog").get("/api/blogs/{id}")).unwrap();
        let (adapter, params) = router.lookup(&Method::GET, "/api/blogs/42").unwrap();
        assert_eq!(adapter.name(), "get_blog");
        assert_eq!(params["id"], "42");
        assert!(router.lookup(&Method::POST, "/api/blogs/42").is_none());
        assert!(router.lookup(&Method::GET, "/api/users").is_none());
    }

    #[test]
    fn path_params_are_percent_decoded() {
        let mut router = Router::new();
        router.add(endpoint("tag").get("/tag/{name}")).unwrap();
        let (_, params) = router.lookup(&Method::GET, "/tag/hello%20world").unwrap();
        assert_eq!(params["name"], "hello world");
        let (_, params) = router.lookup(&Method::GET, "/tag/%FF").unwrap();
        assert_eq!(params["name"], "%FF");
    }

    #[test]
    fn unannotated_handler_cannot_be_added() {
        let err = Router::new().add(endpoint("helper")).unwrap_err();
        assert!(matches!(err, Error::Route { .. }));
    }

    #[test]
    fn scan_skips_unannotated_candidates() {
        let mut router = Router::new();
        router
            .scan([endpoint("index").get("/"), endpoint("helper"), endpoint("signin").post("/api/signin")])
            .unwrap();
        assert!(router.lookup(&Method::GET, "/").is_some());
        assert!(router.lookup(&Method::POST, "/api/signin").is_some());
    }

    #[test]
    fn invalid_signature_fails_registration() {
        let bad = Endpoint::new("bad", Signature::new().catch_all().required("x"), noop).get("/x");
        assert!(matches!(Router::new().add(bad), Err(Error::Signature { .. })));
    }

    #[test]
    fn conflicting_paths_fail_registration() {
        let mut router = Router::new();
        router.add(endpoint("a").get("/users/{id}")).unwrap();
        assert!(router.add(endpoint("b").get("/users/{name}")).is_err());
    }
}
