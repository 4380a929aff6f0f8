//! A small blog API backed by SQLite.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example blog
//!
//! Try:
//!   curl -X POST http://localhost:9000/api/blogs \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"hello","summary":"first","content":"..."}'
//!   curl 'http://localhost:9000/api/blogs?page=1'
//!   curl http://localhost:9000/api/blogs/<id>
//!   curl -i http://localhost:9000/manage/blogs      # 302 to /signin

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use awe::config::ConfigLoader;
use awe::middleware::{BoxFuture, CurrentUser, Pipeline, SessionStore};
use awe::orm::{Db, Entity, Field, FindAll, Pool, SchemaRegistry};
use awe::{ApiError, App, Args, Endpoint, Router, Server, Signature};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

const PAGE_SIZE: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct Blog {
    id: Option<String>,
    user_id: String,
    name: String,
    summary: String,
    content: String,
    created_at: Option<f64>,
}

static SEQ: AtomicU64 = AtomicU64::new(0);

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0.0, |d| d.as_secs_f64())
}

fn next_id() -> Value {
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    json!(format!("{:015}{seq:04}", (now() * 1000.0) as u64))
}

fn created_at() -> Value {
    json!(now())
}

impl Entity for Blog {
    const NAME: &'static str = "Blog";

    fn table() -> Option<&'static str> {
        Some("blogs")
    }

    fn fields() -> Vec<Field> {
        vec![
            Field::string("id").primary_key().ddl("varchar(50)").default_with(next_id),
            Field::string("user_id").ddl("varchar(50)"),
            Field::string("name").ddl("varchar(50)"),
            Field::string("summary").ddl("varchar(200)"),
            Field::text("content"),
            Field::float("created_at").default_with(created_at),
        ]
    }
}

/// Accepts the configured secret as an admin token. Stand-in for real
/// signed session cookies.
struct SharedSecret(String);

impl SessionStore for SharedSecret {
    fn resolve<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<CurrentUser>> {
        Box::pin(async move {
            (token == self.0).then(|| CurrentUser {
                id: "admin".into(),
                name: "Admin".into(),
                email: "admin@example.com".into(),
                admin: true,
            })
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), awe::Error> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = ConfigLoader::new()
        .with_optional_file("config_override.toml")?
        .with_env_prefix("AWE")
        .load()?;

    let registry = SchemaRegistry::new().with::<Blog>()?;
    let db = Db::new(Pool::connect(&config.db).await?, registry);
    db.create_table::<Blog>().await?;

    let mut router = Router::new();
    router.scan([
        Endpoint::new("list_blogs", Signature::new().optional("page", 1), {
            let db = db.clone();
            move |args: Args| list_blogs(db.clone(), args)
        })
        .get("/api/blogs"),
        Endpoint::new("get_blog", Signature::new().required("id"), {
            let db = db.clone();
            move |args: Args| get_blog(db.clone(), args)
        })
        .get("/api/blogs/{id}"),
        Endpoint::new(
            "create_blog",
            Signature::new().required("name").required("summary").required("content").request(),
            {
                let db = db.clone();
                move |args: Args| create_blog(db.clone(), args)
            },
        )
        .post("/api/blogs"),
        Endpoint::new("manage_blogs", Signature::new(), manage_blogs).get("/manage/blogs"),
    ])?;

    let sessions: Arc<dyn SessionStore> = Arc::new(SharedSecret(config.session.secret.clone()));
    let pipeline = Pipeline::standard(Some(sessions), None, &config);
    let app = App::new(router).with_pipeline(pipeline);

    Server::bind(&config.server.addr)?.serve(app).await?;
    db.close().await;
    Ok(())
}

/// Row offset of a 1-based page; pages below 1 read as the first.
fn page_offset(page: i64) -> Result<i64, ApiError> {
    (page.max(1) - 1)
        .checked_mul(PAGE_SIZE)
        .ok_or_else(|| ApiError::value_error("page", "page is out of range."))
}

async fn list_blogs(db: Db, args: Args) -> Result<Value, ApiError> {
    let page: i64 = args.parse("page")?;
    let offset = page_offset(page)?;
    let total = db.count::<Blog>("count(id)", None, &[]).await.map_err(internal)?;
    let blogs: Vec<Blog> = db
        .find_all(FindAll::new().order_by("created_at desc").limit((offset, PAGE_SIZE)))
        .await
        .map_err(internal)?;
    Ok(json!({ "page": page, "total": total, "blogs": blogs }))
}

async fn get_blog(db: Db, args: Args) -> Result<Value, ApiError> {
    let id = args.str("id").unwrap_or_default().to_owned();
    match db.find::<Blog>(id).await.map_err(internal)? {
        Some(blog) => serde_json::to_value(blog).map_err(|e| ApiError::new("internal", Value::Null, e.to_string())),
        None => Err(ApiError::not_found("blog", "Blog not found.")),
    }
}

async fn create_blog(db: Db, args: Args) -> Result<Value, ApiError> {
    let user_id = args
        .request()
        .and_then(|req| req.user())
        .map(|user| user.id.clone())
        .ok_or_else(|| ApiError::permission("Please sign in first."))?;
    for field in ["name", "summary", "content"] {
        if args.str(field).unwrap_or_default().trim().is_empty() {
            return Err(ApiError::value_error(field, format!("{field} cannot be empty.")));
        }
    }
    let mut blog = Blog {
        id: None,
        user_id,
        name: args.parse("name")?,
        summary: args.parse("summary")?,
        content: args.parse("content")?,
        created_at: None,
    };
    db.save(&mut blog).await.map_err(internal)?;
    serde_json::to_value(blog).map_err(|e| ApiError::new("internal", Value::Null, e.to_string()))
}

async fn manage_blogs(_: Args) -> Result<&'static str, ApiError> {
    Ok("<h1>Manage blogs</h1>")
}

fn internal(e: awe::Error) -> ApiError {
    tracing::error!("{e}");
    ApiError::new("internal", Value::Null, "internal error")
}
