//! Request body and query string parsing shared by the adapter and the data stage.

use std::fmt;

use bytes::Bytes;
use serde_json::{Map, Value, json};

use crate::request::Request;

/// Why a request body could not be turned into named values.
#[derive(Debug, PartialEq)]
pub(crate) enum BodyError {
    MissingContentType,
    NotAnObject,
    Unsupported(String),
    Malformed(String),
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingContentType => f.write_str("Missing Content-Type."),
            Self::NotAnObject => f.write_str("JSON body must be object."),
            Self::Unsupported(ct) => write!(f, "Unsupported Content-Type: {ct}"),
            Self::Malformed(reason) => write!(f, "Malformed body: {reason}"),
        }
    }
}

/// Parses a JSON, url-encoded or multipart body into a mapping.
pub(crate) async fn parse_body(req: &Request) -> Result<Map<String, Value>, BodyError> {
    let content_type = req.content_type().ok_or(BodyError::MissingContentType)?;
    let lower = content_type.to_ascii_lowercase();

    if lower.starts_with("application/json") {
        match serde_json::from_slice::<Value>(req.body()) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(BodyError::NotAnObject),
            Err(e) => Err(BodyError::Malformed(e.to_string())),
        }
    } else if lower.starts_with("application/x-www-form-urlencoded") {
        let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(req.body())
            .map_err(|e| BodyError::Malformed(e.to_string()))?;
        Ok(first_wins(pairs))
    } else if lower.starts_with("multipart/form-data") {
        parse_multipart(content_type, req.body.clone()).await
    } else {
        Err(BodyError::Unsupported(content_type.to_owned()))
    }
}

/// Parses a query string; the first value wins when a key repeats.
pub(crate) fn parse_query(query: &str) -> Map<String, Value> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default();
    first_wins(pairs)
}

fn first_wins(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.entry(key).or_insert(Value::String(value));
    }
    map
}

/// Text fields become strings. File fields become `{filename, content_type, size}`;
/// their content stays in the raw body.
async fn parse_multipart(content_type: &str, body: Bytes) -> Result<Map<String, Value>, BodyError> {
    let malformed = |e: multer::Error| BodyError::Malformed(e.to_string());

    let boundary = multer::parse_boundary(content_type).map_err(malformed)?;
    let stream = futures_util::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut map = Map::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_owned) else { continue };
        let value = match field.file_name().map(str::to_owned) {
            Some(filename) => {
                let content_type = field.content_type().map(ToString::to_string);
                let data = field.bytes().await.map_err(malformed)?;
                json!({ "filename": filename, "content_type": content_type, "size": data.len() })
            }
            None => Value::String(field.text().await.map_err(malformed)?),
        };
        map.entry(name).or_insert(value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_request;

    #[tokio::test]
    async fn json_object_is_accepted() {
        let req = test_request("POST", "/", &[("content-type", "application/json")], r#"{"name":"a","n":1}"#);
        let map = parse_body(&req).await.unwrap();
        assert_eq!(map["name"], "a");
        assert_eq!(map["n"], 1);
    }

    #[tokio::test]
    async fn json_array_is_rejected() {
        let req = test_request("POST", "/", &[("content-type", "application/json; charset=utf-8")], "[1]");
        assert_eq!(parse_body(&req).await.unwrap_err(), BodyError::NotAnObject);
    }

    #[tokio::test]
    async fn form_fields_are_strings() {
        let req = test_request(
            "POST",
            "/",
            &[("content-type", "application/x-www-form-urlencoded")],
            "email=a%40b.c&passwd=x+y&email=second",
        );
        let map = parse_body(&req).await.unwrap();
        assert_eq!(map["email"], "a@b.c");
        assert_eq!(map["passwd"], "x y");
    }

    #[tokio::test]
    async fn multipart_text_and_file_fields() {
        let body = "--XB\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            hello\r\n\
            --XB\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            abcd\r\n\
            --XB--\r\n";
        let req = test_request("POST", "/", &[("content-type", "multipart/form-data; boundary=XB")], body);
        let map = parse_body(&req).await.unwrap();
        assert_eq!(map["title"], "hello");
        assert_eq!(map["upload"]["filename"], "a.txt");
        assert_eq!(map["upload"]["size"], 4);
    }

    #[tokio::test]
    async fn unsupported_and_missing_content_types() {
        let req = test_request("POST", "/", &[("content-type", "text/xml")], "<a/>");
        assert_eq!(parse_body(&req).await.unwrap_err().to_string(), "Unsupported Content-Type: text/xml");

        let req = test_request("POST", "/", &[], "{}");
        assert_eq!(parse_body(&req).await.unwrap_err(), BodyError::MissingContentType);
    }

    #[test]
    fn query_first_value_wins() {
        let map = parse_query("page=2&page=3&q=rust+lang&flag");
        assert_eq!(map["page"], "2");
        assert_eq!(map["q"], "rust lang");
        assert_eq!(map["flag"], "");
    }
}
