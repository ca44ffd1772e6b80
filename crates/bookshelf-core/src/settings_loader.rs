//! Loading [`Settings`] from TOML files and the environment.
//!
//! A TOML file only needs the keys it changes: it is converted to JSON and
//! deep-merged over the serialized defaults before deserializing.
//! Environment variables are then applied on top:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `BOOKSHELF_DEBUG` | `debug` |
//! | `BOOKSHELF_SECRET_KEY` | `secret_key` |
//! | `BOOKSHELF_ALLOWED_HOSTS` | `allowed_hosts` (comma-separated) |
//! | `BOOKSHELF_BIND_ADDRESS` | `bind_address` |
//! | `BOOKSHELF_LOG_LEVEL` | `log_level` |
//! | `BOOKSHELF_DATABASE` | `database.name` |
//! | `BOOKSHELF_SECURE_SSL_REDIRECT` | `secure_ssl_redirect` |
//! | `BOOKSHELF_SECURE_PROXY_SSL_HEADER` | `secure_proxy_ssl_header` (`Header:value`, empty disables) |
//! | `BOOKSHELF_SECURE_HSTS_SECONDS` | `secure_hsts_seconds` |
//! | `BOOKSHELF_SESSION_COOKIE_SECURE` | `session_cookie_secure` |
//! | `BOOKSHELF_CSRF_COOKIE_SECURE` | `csrf_cookie_secure` |
//! | `BOOKSHELF_CSRF_TRUSTED_ORIGINS` | `csrf_trusted_origins` (comma-separated) |
//! | `BOOKSHELF_TLS_CERTIFICATE` | `tls.certificate_path` |
//! | `BOOKSHELF_TLS_CERTIFICATE_KEY` | `tls.certificate_key_path` |
//! | `BOOKSHELF_TLS_SERVER_NAME` | `tls.server_name` |

use std::path::{Path, PathBuf};

use crate::error::BookshelfError;
use crate::settings::Settings;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "BOOKSHELF_";

/// Loads settings from a TOML string, keeping defaults for missing keys.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, BookshelfError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| BookshelfError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        BookshelfError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, toml_to_json(toml_value));
    serde_json::from_value(merged).map_err(|e| {
        BookshelfError::ConfigurationError(format!("Invalid settings: {e}"))
    })
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, BookshelfError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        BookshelfError::ConfigurationError(format!(
            "Failed to read settings file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and applies environment overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, BookshelfError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

/// Loads settings from defaults plus environment overrides.
pub fn from_env() -> Result<Settings, BookshelfError> {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

/// Applies `BOOKSHELF_*` overrides read through `lookup`.
///
/// `lookup` receives the full variable name; tests pass a closure over a
/// map instead of touching the process environment. Booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`; anything else is an
/// error rather than a silent default.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<(), BookshelfError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(val) = var("DEBUG") {
        settings.debug = parse_bool("DEBUG", &val)?;
    }
    if let Some(val) = var("SECRET_KEY") {
        settings.secret_key = val;
    }
    if let Some(val) = var("ALLOWED_HOSTS") {
        settings.allowed_hosts = split_list(&val);
    }
    if let Some(val) = var("BIND_ADDRESS") {
        settings.bind_address = val;
    }
    if let Some(val) = var("LOG_LEVEL") {
        settings.log_level = val;
    }
    if let Some(val) = var("DATABASE") {
        settings.database.name = val;
    }
    if let Some(val) = var("SECURE_SSL_REDIRECT") {
        settings.secure_ssl_redirect = parse_bool("SECURE_SSL_REDIRECT", &val)?;
    }
    if let Some(val) = var("SECURE_PROXY_SSL_HEADER") {
        settings.secure_proxy_ssl_header = parse_header_pair(&val)?;
    }
    if let Some(val) = var("SECURE_HSTS_SECONDS") {
        settings.secure_hsts_seconds = val.trim().parse().map_err(|_| {
            BookshelfError::ConfigurationError(format!(
                "{ENV_PREFIX}SECURE_HSTS_SECONDS must be a non-negative integer, got '{val}'"
            ))
        })?;
    }
    if let Some(val) = var("SESSION_COOKIE_SECURE") {
        settings.session_cookie_secure = parse_bool("SESSION_COOKIE_SECURE", &val)?;
    }
    if let Some(val) = var("CSRF_COOKIE_SECURE") {
        settings.csrf_cookie_secure = parse_bool("CSRF_COOKIE_SECURE", &val)?;
    }
    if let Some(val) = var("CSRF_TRUSTED_ORIGINS") {
        settings.csrf_trusted_origins = split_list(&val);
    }
    if let Some(val) = var("TLS_CERTIFICATE") {
        settings.tls.certificate_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("TLS_CERTIFICATE_KEY") {
        settings.tls.certificate_key_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("TLS_SERVER_NAME") {
        settings.tls.server_name = val;
    }

    Ok(())
}

// ============================================================
// Helpers
// ============================================================

fn parse_bool(name: &str, value: &str) -> Result<bool, BookshelfError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(BookshelfError::ConfigurationError(format!(
            "{ENV_PREFIX}{name} must be a boolean, got '{other}'"
        ))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_header_pair(value: &str) -> Result<Option<(String, String)>, BookshelfError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.split_once(':') {
        Some((name, expected)) if !name.trim().is_empty() && !expected.trim().is_empty() => {
            Ok(Some((name.trim().to_string(), expected.trim().to_string())))
        }
        _ => Err(BookshelfError::ConfigurationError(format!(
            "{ENV_PREFIX}SECURE_PROXY_SSL_HEADER must look like 'X-Forwarded-Proto:https', got '{value}'"
        ))),
    }
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges `override_val` into `base`; scalars and arrays are replaced.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
