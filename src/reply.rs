//! Raw handler results and their normalization into responses.
//!
//! A handler may return almost anything; the response stage classifies the
//! value and turns it into a [`Response`]:
//!
//! | Returned value | Response |
//! |---|---|
//! | [`Response`] | passed through unchanged |
//! | bytes | `application/octet-stream` |
//! | text starting with `redirect:` | `302` to the remainder |
//! | other text | `text/html` |
//! | mapping with `__template__` | rendered template, `__user__` merged in |
//! | other mapping | JSON |
//! | status code 100–599 | empty response with that status |
//! | `(status, message)` | that status with the message as body |
//! | anything else | its string form as `text/plain` |

use bytes::Bytes;
use http::StatusCode;
use serde_json::{Map, Value};
use tracing::error;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::response::{ContentType, Response};
use crate::template::Templates;

/// Prefix marking a text result as a redirect target.
pub const REDIRECT_PREFIX: &str = "redirect:";
/// Key naming the template a mapping result should be rendered with.
pub const TEMPLATE_KEY: &str = "__template__";
/// Key under which the current user is merged into template variables.
pub const USER_KEY: &str = "__user__";

/// The raw value a handler produced, before normalization.
#[derive(Debug)]
pub enum Reply {
    Response(Response),
    Bytes(Bytes),
    Text(String),
    Data(Map<String, Value>),
    Status(u16),
    StatusMessage(u16, String),
    Other(Value),
}

impl Reply {
    /// Shorthand for a `redirect:` text result.
    pub fn redirect(location: &str) -> Self {
        Self::Text(format!("{REDIRECT_PREFIX}{location}"))
    }

    /// Converts this value into a response.
    ///
    /// `templates` is consulted only for mappings naming a template; without
    /// it such a result becomes a `500`.
    pub fn normalize(self, user: Option<&CurrentUser>, templates: Option<&dyn Templates>) -> Response {
        match self {
            Self::Response(res) => res,
            Self::Bytes(body) => Response::builder().bytes(ContentType::OctetStream, body),
            Self::Text(text) => match text.strip_prefix(REDIRECT_PREFIX) {
                Some(location) => Response::redirect(location),
                None => Response::html(text),
            },
            Self::Data(map) => match map.get(TEMPLATE_KEY).and_then(Value::as_str) {
                Some(name) => {
                    let name = name.to_owned();
                    render(&name, map, user, templates)
                }
                None => json(&map),
            },
            Self::Status(code) => match valid_status(i64::from(code)) {
                Some(status) => Response::status(status),
                None => Response::text(code.to_string()),
            },
            Self::StatusMessage(code, message) => match valid_status(i64::from(code)) {
                Some(status) => Response::builder().status(status).text(message),
                None => Response::text(format!("({code}, {message})")),
            },
            Self::Other(value) => match value {
                Value::String(s) => Response::text(s),
                other => Response::text(other.to_string()),
            },
        }
    }
}

fn valid_status(code: i64) -> Option<StatusCode> {
    if (100..600).contains(&code) {
        u16::try_from(code).ok().and_then(|c| StatusCode::from_u16(c).ok())
    } else {
        None
    }
}

fn json(map: &Map<String, Value>) -> Response {
    match serde_json::to_vec(map) {
        Ok(body) => Response::builder().bytes(ContentType::Json, body),
        Err(e) => {
            error!("failed to serialize result: {e}");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn render(
    name: &str,
    mut vars: Map<String, Value>,
    user: Option<&CurrentUser>,
    templates: Option<&dyn Templates>,
) -> Response {
    let Some(templates) = templates else {
        error!(template = name, "no templating collaborator configured");
        return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
    };
    let user = user.and_then(|u| serde_json::to_value(u).ok()).unwrap_or(Value::Null);
    vars.insert(USER_KEY.to_owned(), user);
    match templates.render(name, &vars) {
        Ok(html) => Response::html(html),
        Err(e) => {
            error!(template = name, "render failed: {e}");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<Response> for Reply {
    fn from(res: Response) -> Self { Self::Response(res) }
}

impl From<Bytes> for Reply {
    fn from(b: Bytes) -> Self { Self::Bytes(b) }
}

impl From<Vec<u8>> for Reply {
    fn from(b: Vec<u8>) -> Self { Self::Bytes(b.into()) }
}

impl From<String> for Reply {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<&'static str> for Reply {
    fn from(s: &'static str) -> Self { Self::Text(s.to_owned()) }
}

impl From<Map<String, Value>> for Reply {
    fn from(map: Map<String, Value>) -> Self { Self::Data(map) }
}

/// Objects become mappings, strings become text, in-range integers become
/// status codes; everything else is stringified.
impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Data(map),
            Value::String(s) => Self::Text(s),
            Value::Number(n) => match n.as_u64().and_then(|c| u16::try_from(c).ok()) {
                Some(code) if (100..600).contains(&code) => Self::Status(code),
                _ => Self::Other(Value::Number(n)),
            },
            other => Self::Other(other),
        }
    }
}

impl From<u16> for Reply {
    fn from(code: u16) -> Self { Self::Status(code) }
}

impl From<StatusCode> for Reply {
    fn from(code: StatusCode) -> Self { Self::Status(code.as_u16()) }
}

impl From<(u16, String)> for Reply {
    fn from((code, message): (u16, String)) -> Self { Self::StatusMessage(code, message) }
}

impl From<(u16, &'static str)> for Reply {
    fn from((code, message): (u16, &'static str)) -> Self {
        Self::StatusMessage(code, message.to_owned())
    }
}

impl From<ApiError> for Reply {
    fn from(e: ApiError) -> Self { Self::Data(e.into_map()) }
}
