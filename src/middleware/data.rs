use http::Method;
use tracing::{debug, info};

use super::{BoxFuture, Context, Middleware, Next};
use crate::body::{parse_body, parse_query};
use crate::reply::Reply;
use crate::request::Request;

/// Pre-parses the body of `POST` requests, or the query string of `GET`
/// requests, into [`Context::data`].
///
/// A body that cannot be parsed leaves the slot empty; the adapter reports
/// the client error when it binds arguments. The adapter parses the body
/// again on its own and does not read this slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyParser;

impl Middleware for BodyParser {
    fn name(&self) -> &'static str {
        "data"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            if req.method() == Method::POST {
                match parse_body(&req).await {
                    Ok(data) => {
                        info!(data = %serde_json::Value::Object(data.clone()), "request data");
                        ctx.data = Some(data);
                    }
                    Err(e) => debug!("body left unparsed: {e}"),
                }
            } else if req.method() == Method::GET {
                if let Some(query) = req.query_string().filter(|q| !q.is_empty()) {
                    ctx.data = Some(parse_query(query));
                }
            }
            next.run(ctx, req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::request::test_request;

    async fn seen_data(req: Request) -> Option<serde_json::Map<String, serde_json::Value>> {
        let reply = Pipeline::builder()
            .stage(BodyParser)
            .build()
            .process(req, |req| {
                Box::pin(async move {
                    Reply::Other(req.data().cloned().map(serde_json::Value::Object).unwrap_or_default())
                })
            })
            .await;
        match reply {
            Reply::Other(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    #[tokio::test]
    async fn json_body_lands_in_data_slot() {
        let req = test_request("POST", "/api/blogs", &[("content-type", "application/json")], r#"{"name":"x"}"#);
        let data = seen_data(req).await.unwrap();
        assert_eq!(data["name"], "x");
    }

    #[tokio::test]
    async fn query_lands_in_data_slot() {
        let data = seen_data(test_request("GET", "/api/blogs?page=2", &[], "")).await.unwrap();
        assert_eq!(data["page"], "2");
    }

    #[tokio::test]
    async fn bad_body_still_delegates() {
        let req = test_request("POST", "/api/blogs", &[("content-type", "text/csv")], "a,b");
        assert!(seen_data(req).await.is_none());
    }
}
