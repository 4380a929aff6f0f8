use std::sync::Arc;

use tracing::debug;

use super::{BoxFuture, Context, Middleware, Next};
use crate::reply::Reply;
use crate::request::Request;
use crate::template::Templates;

/// Normalizes whatever the inner stages return into a finished response.
///
/// Sits outside the authentication stage so that template results see the
/// user it resolved.
#[derive(Clone, Default)]
pub struct ResponseNormalizer {
    templates: Option<Arc<dyn Templates>>,
}

impl ResponseNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: Arc<dyn Templates>) -> Self {
        Self { templates: Some(templates) }
    }
}

impl std::fmt::Debug for ResponseNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseNormalizer").field("templates", &self.templates.is_some()).finish()
    }
}

impl Middleware for ResponseNormalizer {
    fn name(&self) -> &'static str {
        "response"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            let reply = next.run(ctx, req).await;
            debug!(?reply, "normalize response");
            let templates = self.templates.as_deref();
            Reply::Response(reply.normalize(ctx.user.as_ref(), templates))
        })
    }
}
