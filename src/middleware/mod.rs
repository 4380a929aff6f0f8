//! Middleware chain.
//!
//! Every request passes through an ordered onion of stages before the
//! adapter runs. Stages execute in declaration order on the way in and
//! unwind in reverse on the way out. Each stage receives the rest of the
//! chain as an explicit [`Next`] and must either run it exactly once or
//! short-circuit with its own reply.
//!
//! The standard chain, outer to inner:
//!
//! 1. [`RequestLogger`]: logs method and path
//! 2. [`ResponseNormalizer`]: turns the raw [`Reply`] into a finished response
//! 3. [`Authenticator`]: resolves the current user, guards the admin prefix
//! 4. [`BodyParser`]: fills the request-scoped data slot
//!
//! ```rust,ignore
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str { "timing" }
//!
//!     fn process<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Reply> {
//!         Box::pin(async move {
//!             let start = Instant::now();
//!             let reply = next.run(ctx, req).await;
//!             tracing::debug!(elapsed = ?start.elapsed());
//!             reply
//!         })
//!     }
//! }
//! ```

mod auth;
mod data;
mod logger;
mod response;

use std::sync::Arc;

use serde_json::{Map, Value};

pub use auth::{Authenticator, CurrentUser, SessionStore};
pub use data::BodyParser;
pub use logger::RequestLogger;
pub use response::ResponseNormalizer;

pub use crate::handler::BoxFuture;
use crate::config::Config;
use crate::reply::Reply;
use crate::request::Request;
use crate::template::Templates;

/// Request-scoped state shared by the stages of one request.
#[derive(Debug, Default)]
pub struct Context {
    /// Set by the authentication stage.
    pub user: Option<CurrentUser>,
    /// Set by the body parsing stage.
    pub data: Option<Map<String, Value>>,
}

/// One stage of the middleware chain.
pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn process<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Reply>;
}

// ── Next ──────────────────────────────────────────────────────────────────────

type Terminal<'a> = Box<dyn FnOnce(&mut Context, Request) -> BoxFuture<'static, Reply> + Send + 'a>;

/// The remainder of the chain, handed to each stage.
///
/// Consumed by [`Next::run`], so a stage cannot delegate twice.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain { middleware: &'a dyn Middleware, next: Box<Next<'a>> },
    Handler(Terminal<'a>),
}

impl<'a> Next<'a> {
    fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self { inner: NextInner::Chain { middleware, next: Box::new(next) } }
    }

    fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut Context, Request) -> BoxFuture<'static, Reply> + Send + 'a,
    {
        Self { inner: NextInner::Handler(Box::new(f)) }
    }

    pub async fn run(self, ctx: &mut Context, req: Request) -> Reply {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, req, *next).await,
            NextInner::Handler(handler) => handler(ctx, req).await,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// The composed chain. Built once at startup, shared by every request.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The standard chain: logging, response normalization, authentication
    /// (when a session store is given) and body parsing.
    pub fn standard(
        sessions: Option<Arc<dyn SessionStore>>,
        templates: Option<Arc<dyn Templates>>,
        config: &Config,
    ) -> Self {
        let normalizer = match templates {
            Some(templates) => ResponseNormalizer::with_templates(templates),
            None => ResponseNormalizer::new(),
        };
        let mut builder = Self::builder().stage(RequestLogger).stage(normalizer);
        if let Some(store) = sessions {
            builder = builder.stage(Authenticator::from_config(store, config));
        }
        builder.stage(BodyParser).build()
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|m| m.name()).collect()
    }

    /// Runs `req` through every stage and then `handler`.
    ///
    /// The context's user and data slots are copied onto the request just
    /// before `handler` sees it.
    pub async fn process<H>(&self, req: Request, handler: H) -> Reply
    where
        H: FnOnce(Request) -> BoxFuture<'static, Reply> + Send + 'static,
    {
        let mut next = Next::handler(move |ctx: &mut Context, mut req: Request| {
            req.user = ctx.user.clone();
            req.data = ctx.data.clone();
            handler(req)
        });
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        let mut ctx = Context::default();
        next.run(&mut ctx, req).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stage_names()).finish()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    /// Appends a stage inside every stage added so far.
    pub fn stage(mut self, middleware: impl Middleware) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline { stages: self.stages }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::request::test_request;
    use crate::response::Response;

    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Trace {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Reply> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{} in", self.name));
                let reply = next.run(ctx, req).await;
                self.log.lock().unwrap().push(format!("{} out", self.name));
                reply
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn process<'a>(&'a self, _: &'a mut Context, _: Request, _: Next<'a>) -> BoxFuture<'a, Reply> {
            Box::pin(async { Reply::Response(Response::redirect("/signin")) })
        }
    }

    #[tokio::test]
    async fn stages_run_as_an_onion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(Trace { name: "a", log: Arc::clone(&log) })
            .stage(Trace { name: "b", log: Arc::clone(&log) })
            .build();
        assert_eq!(pipeline.stage_names(), ["a", "b"]);

        let handler_log = Arc::clone(&log);
        let reply = pipeline
            .process(test_request("GET", "/", &[], ""), move |_req| {
                Box::pin(async move {
                    handler_log.lock().unwrap().push("handler".into());
                    Reply::Text("ok".into())
                })
            })
            .await;

        assert!(matches!(reply, Reply::Text(t) if t == "ok"));
        assert_eq!(*log.lock().unwrap(), ["a in", "b in", "handler", "b out", "a out"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(Trace { name: "outer", log: Arc::clone(&log) })
            .stage(Deny)
            .stage(Trace { name: "inner", log: Arc::clone(&log) })
            .build();

        let reply = pipeline
            .process(test_request("GET", "/", &[], ""), |_req| Box::pin(async { Reply::Status(200) }))
            .await;

        assert!(matches!(reply, Reply::Response(ref r) if r.header("location") == Some("/signin")));
        assert_eq!(*log.lock().unwrap(), ["outer in", "outer out"]);
    }
}
