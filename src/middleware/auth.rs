use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::{BoxFuture, Context, Middleware, Next};
use crate::config::Config;
use crate::reply::Reply;
use crate::request::Request;
use crate::response::Response;

/// The authenticated user bound to a request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub admin: bool,
}

/// Resolves a session token to a user.
///
/// Token format and signing belong to the application; the stage only
/// reads the cookie and asks.
pub trait SessionStore: Send + Sync + 'static {
    fn resolve<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<CurrentUser>>;
}

/// Binds the current user and guards the admin-only path prefix.
///
/// Requests under the protected prefix without an administrator are
/// redirected to the sign-in page; everything else is delegated.
pub struct Authenticator {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
    protected_prefix: String,
    signin_path: String,
}

impl Authenticator {
    /// Uses the `awesession` cookie and guards `/manage/`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::from_config(store, &Config::default())
    }

    pub fn from_config(store: Arc<dyn SessionStore>, config: &Config) -> Self {
        Self {
            store,
            cookie_name: config.session.cookie_name.clone(),
            protected_prefix: config.auth.protected_prefix.clone(),
            signin_path: config.auth.signin_path.clone(),
        }
    }
}

impl Middleware for Authenticator {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            info!(method = %req.method(), path = req.path(), "check user");
            ctx.user = None;
            if let Some(token) = req.cookie(&self.cookie_name).filter(|t| !t.is_empty()) {
                if let Some(user) = self.store.resolve(token).await {
                    info!(email = %user.email, "set current user");
                    ctx.user = Some(user);
                }
            }
            let is_admin = ctx.user.as_ref().is_some_and(|u| u.admin);
            if req.path().starts_with(&self.protected_prefix) && !is_admin {
                return Reply::Response(Response::redirect(&self.signin_path));
            }
            next.run(ctx, req).await
        })
    }
}
