//! HTTP server, request dispatch and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], so `main` can close the database pool
//!    and exit cleanly.

use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::assets::{self, StaticFiles};
use crate::config::Config;
use crate::error::Error;
use crate::middleware::Pipeline;
use crate::reply::Reply;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

// ── App ───────────────────────────────────────────────────────────────────────

/// A route table behind a middleware chain.
///
/// [`App::handle`] is the whole request path minus the socket, which makes
/// it the natural seam for tests.
pub struct App {
    router: Router,
    pipeline: Pipeline,
    statics: Option<(String, Arc<dyn StaticFiles>)>,
}

impl App {
    /// Serves `router` behind logging, response normalization and body
    /// parsing. Use [`App::with_pipeline`] to add authentication or templates.
    pub fn new(router: Router) -> Self {
        Self { router, pipeline: Pipeline::standard(None, None, &Config::default()), statics: None }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Mounts `files` under `prefix`, e.g. `/static/`. Routes still win over
    /// the mount; the mount is consulted before answering `404`.
    pub fn with_static(mut self, prefix: &str, files: impl StaticFiles) -> Self {
        let prefix = if prefix.ends_with('/') { prefix.to_owned() } else { format!("{prefix}/") };
        info!(%prefix, "add static");
        let files: Arc<dyn StaticFiles> = Arc::new(files);
        self.statics = Some((prefix, files));
        self
    }

    /// Routes one request through the chain and produces one response.
    ///
    /// Never fails: an unreadable body is a `400`, an unknown route a `404`
    /// unless the static mount has the path.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("failed to read request body: {e}");
                return Response::bad_request("Unreadable body.").into_inner();
            }
        };
        let mut req = Request::new(parts, body);

        let reply = match self.router.lookup(&req.method, req.path()) {
            Some((adapter, params)) => {
                req.params = params;
                self.pipeline
                    .process(req, move |req| Box::pin(async move { adapter.call(req).await }))
                    .await
            }
            None => {
                let mounted = self.statics.as_ref().and_then(|(prefix, files)| {
                    if req.method != Method::GET && req.method != Method::HEAD {
                        return None;
                    }
                    Some((assets::mounted_path(prefix, req.path())?, Arc::clone(files)))
                });
                self.pipeline
                    .process(req, move |_| {
                        Box::pin(async move {
                            let found = match mounted {
                                Some((path, files)) => files.serve(&path).await,
                                None => None,
                            };
                            Reply::Response(found.unwrap_or_else(|| Response::status(StatusCode::NOT_FOUND)))
                        })
                    })
                    .await
            }
        };

        match reply {
            Reply::Response(res) => res,
            raw => raw.normalize(None, None),
        }
        .into_inner()
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use awe::Server;
    /// assert!(Server::bind("127.0.0.1:9000").is_ok());
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse::<SocketAddr>().map_err(|e| Error::Config(format!("invalid socket address `{addr}`: {e}")))?;
        Ok(Self { addr })
    }

    /// Starts accepting connections and dispatching them through `app`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, app: App) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let app = Arc::new(app);

        info!(addr = %self.addr, "server started");

        // Tracks every connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first, so a SIGTERM stops accepting even if more
                // connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { Ok::<_, Infallible>(app.handle(req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("server stopped");
        Ok(())
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT. Only Ctrl-C on non-Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
