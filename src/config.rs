//! Layered configuration.
//!
//! Built-in defaults are overlaid by an optional override file and then by
//! environment variables. Only keys that exist in the defaults are taken
//! from an override; tables merge recursively, everything else is replaced.
//!
//! ```rust
//! use awe::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_string("[db]\nmax_connections = 4")
//!     .unwrap()
//!     .load()
//!     .unwrap();
//!
//! assert_eq!(config.db.max_connections, 4);
//! assert_eq!(config.db.min_connections, 1);
//! ```
//!
//! Environment variables use `PREFIX__SECTION__KEY`, e.g.
//! `AWE__SERVER__ADDR=0.0.0.0:9000`.

use std::path::Path;

use serde::Deserialize;
use toml::Value;
use tracing::{debug, warn};

use crate::error::Error;

const DEFAULTS: &str = r#"
[server]
addr = "127.0.0.1:9000"

[db]
url = "sqlite://awesome.db"
min_connections = 1
max_connections = 10

[session]
cookie_name = "awesession"
secret = "awesome"

[auth]
protected_prefix = "/manage/"
signin_path = "/signin"
"#;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

/// Connection pool settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DbConfig {
    /// sqlx connection URL, e.g. `sqlite://awesome.db`.
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    /// Name of the cookie holding the session token.
    pub cookie_name: String,
    pub secret: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    /// Paths under this prefix require an authenticated administrator.
    pub protected_prefix: String,
    /// Where rejected requests are redirected.
    pub signin_path: String,
}

impl Default for Config {
    fn default() -> Self {
        ConfigLoader::new().load().expect("built-in defaults are valid")
    }
}

/// Builds a [`Config`] from defaults, override sources and the environment.
#[derive(Debug)]
pub struct ConfigLoader {
    value: Value,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        let value = parse_table(DEFAULTS).expect("built-in defaults are valid TOML");
        Self { value, env_prefix: None }
    }

    /// Overlay a TOML override file.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        debug!(path = %path.display(), "loading config override");
        self.with_string(&content)
    }

    /// Overlay a TOML override file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, Error> {
        if path.as_ref().exists() { self.with_file(path) } else { Ok(self) }
    }

    /// Overlay TOML text.
    pub fn with_string(mut self, content: &str) -> Result<Self, Error> {
        let overrides = parse_table(content)?;
        merge(&mut self.value, overrides, "");
        Ok(self)
    }

    /// Apply `PREFIX__SECTION__KEY` environment variables when loading.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    pub fn load(mut self) -> Result<Config, Error> {
        if let Some(prefix) = self.env_prefix.take() {
            let overrides = env_overrides(&prefix, std::env::vars());
            merge(&mut self.value, overrides, "");
        }

        let config: Config = self.value.try_into()?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    fn validate(&self) -> Result<(), Error> {
        if self.db.max_connections == 0 {
            return Err(Error::Config("db.max_connections must be at least 1".to_owned()));
        }
        if self.db.min_connections > self.db.max_connections {
            return Err(Error::Config(format!(
                "db.min_connections ({}) exceeds db.max_connections ({})",
                self.db.min_connections, self.db.max_connections,
            )));
        }
        Ok(())
    }
}

fn parse_table(content: &str) -> Result<Value, Error> {
    Ok(Value::Table(toml::from_str::<toml::Table>(content)?))
}

/// Deep-merges `overrides` into `base`. Keys unknown to `base` are dropped.
fn merge(base: &mut Value, overrides: Value, path: &str) {
    let (Value::Table(base), Value::Table(overrides)) = (base, overrides) else {
        return;
    };
    for (key, value) in overrides {
        let key_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
        match base.get_mut(&key) {
            Some(slot) if slot.is_table() => merge(slot, value, &key_path),
            Some(slot) => *slot = value,
            None => warn!(key = %key_path, "ignoring unknown config key"),
        }
    }
}

/// Collects `PREFIX__SECTION__KEY=value` pairs into a TOML table.
fn env_overrides(prefix: &str, vars: impl Iterator<Item = (String, String)>) -> Value {
    let marker = format!("{prefix}__");
    let mut root = toml::Table::new();
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(&marker) else { continue };
        let Some((section, key)) = rest.split_once("__") else { continue };
        let section = root
            .entry(section.to_lowercase())
            .or_insert_with(|| Value::Table(toml::Table::new()));
        if let Value::Table(section) = section {
            section.insert(key.to_lowercase(), parse_env_value(&raw));
        }
    }
    Value::Table(root)
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(b) = raw.parse::<bool>() {
        Value::Boolean(b)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::String(raw.to_owned())
    }
}
