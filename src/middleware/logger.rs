use tracing::info;

use super::{BoxFuture, Context, Middleware, Next};
use crate::reply::Reply;
use crate::request::Request;

/// Logs method and path of every request, then delegates.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            info!(method = %req.method(), path = req.path(), "request");
            next.run(ctx, req).await
        })
    }
}
