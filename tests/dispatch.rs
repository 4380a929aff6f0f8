use std::sync::Arc;

use awe::middleware::{BoxFuture, CurrentUser, Pipeline, SessionStore};
use awe::{ApiError, App, Args, Config, Endpoint, Error, Reply, Response, Router, Signature, StaticFiles, Templates};
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use serde_json::{Map, Value, json};

// ── Fixtures ──────────────────────────────────────────────────────────────────

async fn echo(args: Args) -> Result<Value, ApiError> {
    Ok(Value::Object(args.into_values()))
}

async fn get_blog(args: Args) -> Result<Value, ApiError> {
    let id: i64 = args.parse("id")?;
    if id == 404 {
        return Err(ApiError::not_found("blog", "blog not found"));
    }
    Ok(json!({ "id": id }))
}

async fn whoami(args: Args) -> Result<Value, ApiError> {
    let req = args.request().ok_or_else(|| ApiError::permission("no request"))?;
    Ok(json!({ "user": req.user().map(|u| u.name.clone()), "path": req.path() }))
}

async fn manage(_: Args) -> Result<Value, ApiError> {
    Ok(json!({ "__template__": "manage.html", "items": [1, 2] }))
}

async fn signout(_: Args) -> Result<Reply, ApiError> {
    Ok(Reply::redirect("/"))
}

async fn teapot(_: Args) -> Result<(u16, &'static str), ApiError> {
    Ok((418, "short and stout"))
}

struct Sessions;

impl SessionStore for Sessions {
    fn resolve<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<CurrentUser>> {
        Box::pin(async move {
            let admin = match token {
                "admin" => true,
                "reader" => false,
                _ => return None,
            };
            Some(CurrentUser { id: "001".into(), name: "Ann".into(), email: "ann@example.com".into(), admin })
        })
    }
}

struct Inline;

impl Templates for Inline {
    fn render(&self, name: &str, vars: &Map<String, Value>) -> Result<String, Error> {
        Ok(format!("{name}:{}:{}", vars["items"], vars["__user__"]["name"]))
    }
}

struct Files;

impl StaticFiles for Files {
    fn serve<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Option<Response>> {
        Box::pin(async move { (path == "css/site main.css").then(|| Response::text("body {}")) })
    }
}

fn app() -> App {
    let mut router = Router::new();
    router
        .scan([
            Endpoint::new("create_blog", Signature::new().required("name").optional("summary", ""), echo)
                .post("/api/blogs"),
            Endpoint::new("get_blog", Signature::new().required("id"), get_blog).get("/api/blogs/{id}"),
            Endpoint::new("search", Signature::new().required("q").catch_all(), echo).get("/api/search"),
            Endpoint::new("whoami", Signature::new().request(), whoami).get("/api/me"),
            Endpoint::new("manage", Signature::new(), manage).get("/manage/blogs"),
            Endpoint::new("signout", Signature::new(), signout).get("/signout"),
            Endpoint::new("teapot", Signature::new(), teapot).get("/teapot"),
            Endpoint::new("tag", Signature::new().required("name"), echo).get("/tag/{name}"),
            Endpoint::new("static_override", Signature::new(), teapot).get("/static/override.txt"),
            Endpoint::new("helper", Signature::new(), echo),
        ])
        .unwrap();
    let pipeline = Pipeline::standard(Some(Arc::new(Sessions)), Some(Arc::new(Inline)), &Config::default());
    App::new(router).with_pipeline(pipeline).with_static("/static", Files)
}

async fn send(method: &str, uri: &str, headers: &[(&str, &str)], body: &str) -> (StatusCode, http::HeaderMap, Bytes) {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(Full::new(Bytes::from(body.to_owned()))).unwrap();
    let res = app().handle(req).await;
    let (parts, body) = res.into_parts();
    (parts.status, parts.headers, body.collect().await.unwrap().to_bytes())
}

fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

// ── Argument binding ──────────────────────────────────────────────────────────

#[tokio::test]
async fn json_body_binds_named_parameters() {
    let (status, headers, body) =
        send("POST", "/api/blogs", &[("content-type", "application/json")], r#"{"name":"a","junk":1}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json;charset=utf-8");
    assert_eq!(json_body(&body), json!({"name": "a", "summary": ""}));
}

#[tokio::test]
async fn form_body_binds_named_parameters() {
    let (status, _, body) = send(
        "POST",
        "/api/blogs",
        &[("content-type", "application/x-www-form-urlencoded")],
        "name=hello+world&summary=s",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"name": "hello world", "summary": "s"}));
}

#[tokio::test]
async fn post_without_content_type_is_a_client_error() {
    let (status, _, body) = send("POST", "/api/blogs", &[], r#"{"name":"a"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Missing Content-Type.");
}

#[tokio::test]
async fn missing_required_argument_is_named() {
    let (status, _, body) = send("POST", "/api/blogs", &[("content-type", "application/json")], "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Missing argument: name");

    let (status, _, body) = send("GET", "/api/search", &[], "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Missing argument: q");
}

#[tokio::test]
async fn query_with_catch_all_keeps_every_key() {
    let (_, _, body) = send("GET", "/api/search?q=rust&page=2&q=ignored", &[], "").await;
    assert_eq!(json_body(&body), json!({"q": "rust", "page": "2"}));
}

#[tokio::test]
async fn path_parameter_binds_and_parses() {
    let (status, _, body) = send("GET", "/api/blogs/42", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"id": 42}));
}

#[tokio::test]
async fn api_error_becomes_structured_result() {
    let (status, _, body) = send("GET", "/api/blogs/404", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"error": "value:notfound", "data": "blog", "message": "blog not found"}));

    let (_, _, body) = send("GET", "/api/blogs/abc", &[], "").await;
    assert_eq!(json_body(&body)["error"], "value:invalid");
}

#[tokio::test]
async fn request_parameter_sees_current_user() {
    let (_, _, body) = send("GET", "/api/me", &[("cookie", "awesession=reader")], "").await;
    assert_eq!(json_body(&body), json!({"user": "Ann", "path": "/api/me"}));

    let (_, _, body) = send("GET", "/api/me", &[], "").await;
    assert_eq!(json_body(&body), json!({"user": null, "path": "/api/me"}));
}

#[tokio::test]
async fn path_parameter_is_percent_decoded() {
    let (status, _, body) = send("GET", "/tag/hello%20world", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"name": "hello world"}));
}

// ── Middleware and normalization ──────────────────────────────────────────────

#[tokio::test]
async fn manage_prefix_redirects_non_admins_to_signin() {
    for headers in [&[][..], &[("cookie", "awesession=reader")][..]] {
        let (status, headers, _) = send("GET", "/manage/blogs", headers, "").await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers["location"], "/signin");
    }
}

#[tokio::test]
async fn template_result_is_rendered_with_user() {
    let (status, headers, body) = send("GET", "/manage/blogs", &[("cookie", "awesession=admin")], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/html;charset=utf-8");
    assert_eq!(body, r#"manage.html:[1,2]:"Ann""#);
}

#[tokio::test]
async fn redirect_text_and_status_pairs() {
    let (status, headers, _) = send("GET", "/signout", &[], "").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers["location"], "/");

    let (status, _, body) = send("GET", "/teapot", &[], "").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body, "short and stout");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (status, _, _) = send("GET", "/nowhere", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Unannotated candidates were skipped, not mounted.
    let (status, _, _) = send("POST", "/api/search", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn static_mount_serves_before_not_found() {
    let (status, _, body) = send("GET", "/static/css/site%20main.css", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "body {}");

    let (status, _, _) = send("GET", "/static/missing.css", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send("GET", "/static/../tests/dispatch.rs", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send("POST", "/static/css/site%20main.css", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A route under the prefix wins over the mount.
    let (status, _, _) = send("GET", "/static/override.txt", &[], "").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
}

#[test]
fn standard_pipeline_order() {
    let pipeline = Pipeline::standard(Some(Arc::new(Sessions)), None, &Config::default());
    assert_eq!(pipeline.stage_names(), ["logger", "response", "auth", "data"]);
    let pipeline = Pipeline::standard(None, None, &Config::default());
    assert_eq!(pipeline.stage_names(), ["logger", "response", "data"]);
}
