//! Static-file collaborator interface.
//!
//! awe does not read files itself. An implementation of [`StaticFiles`] is
//! mounted once under a path prefix with [`App::with_static`](crate::App::with_static);
//! `GET` and `HEAD` requests under that prefix which match no route are
//! handed to it with the prefix stripped.
//!
//! ```rust
//! use awe::{BoxFuture, Response, StaticFiles};
//!
//! struct Robots;
//!
//! impl StaticFiles for Robots {
//!     fn serve<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Option<Response>> {
//!         Box::pin(async move { (path == "robots.txt").then(|| Response::text("User-agent: *")) })
//!     }
//! }
//! ```

use crate::handler::BoxFuture;
use crate::response::Response;

/// Resolves a path below the mount prefix to a response.
///
/// `None` means not found. The path is percent-decoded, has no leading
/// slash and never contains a `..` segment.
pub trait StaticFiles: Send + Sync + 'static {
    fn serve<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Option<Response>>;
}

/// Strips `prefix` from a raw request path and decodes what is left.
///
/// Paths outside the prefix, paths that do not decode, and paths that climb
/// with `..` resolve to nothing.
pub(crate) fn mounted_path(prefix: &str, path: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?;
    let rest = urlencoding::decode(rest).ok()?;
    if rest.split(['/', '\\']).any(|segment| segment == "..") {
        return None;
    }
    Some(rest.trim_start_matches('/').to_owned())
}
