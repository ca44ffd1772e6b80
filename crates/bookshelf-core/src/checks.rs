//! System checks over [`Settings`].
//!
//! Checks are plain functions registered under tags. The `security` tag
//! holds checks that always run; the `deploy` tag holds the stricter set
//! run by `check --deploy` before going live, including the TLS files the
//! reverse proxy will load.
//!
//! ```
//! use bookshelf_core::checks::{CheckLevel, CheckRegistry};
//! use bookshelf_core::settings::Settings;
//!
//! let registry = CheckRegistry::with_builtins();
//! let messages = registry.run_checks(Some(&["deploy"]), &Settings::development());
//! assert!(messages.iter().any(|m| m.level >= CheckLevel::Warning));
//! ```

use crate::settings::Settings;

/// Severity of a check message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckLevel {
    /// Informational.
    Info = 1,
    /// A likely problem.
    Warning = 2,
    /// A definite problem; the command exits non-zero.
    Error = 3,
}

impl std::fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A diagnostic produced by a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckMessage {
    /// Severity.
    pub level: CheckLevel,
    /// What is wrong.
    pub msg: String,
    /// How to fix it.
    pub hint: Option<String>,
    /// Identifier such as `security.W004`.
    pub id: String,
}

impl CheckMessage {
    fn new(level: CheckLevel, id: &str, msg: impl Into<String>, hint: Option<&str>) -> Self {
        Self {
            level,
            msg: msg.into(),
            hint: hint.map(String::from),
            id: id.to_string(),
        }
    }

    /// Creates a warning.
    pub fn warning(id: &str, msg: impl Into<String>, hint: Option<&str>) -> Self {
        Self::new(CheckLevel::Warning, id, msg, hint)
    }

    /// Creates an error.
    pub fn error(id: &str, msg: impl Into<String>, hint: Option<&str>) -> Self {
        Self::new(CheckLevel::Error, id, msg, hint)
    }

    /// Returns `true` for errors.
    pub fn is_error(&self) -> bool {
        self.level >= CheckLevel::Error
    }
}

impl std::fmt::Display for CheckMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}: {}", self.id, self.level, self.msg)?;
        if let Some(ref hint) = self.hint {
            write!(f, "\n\tHINT: {hint}")?;
        }
        Ok(())
    }
}

/// A check function.
pub type CheckFn = fn(&Settings) -> Vec<CheckMessage>;

struct RegisteredCheck {
    func: CheckFn,
    tags: Vec<&'static str>,
}

/// Registry of check functions with tag-based filtering.
pub struct CheckRegistry {
    checks: Vec<RegisteredCheck>,
}

impl CheckRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Creates a registry holding the built-in security and deploy checks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(check_secret_key, &["security", "deploy"]);
        registry.register(check_allowed_hosts, &["security", "deploy"]);
        registry.register(check_x_frame_options, &["security", "deploy"]);
        registry.register(check_debug, &["deploy"]);
        registry.register(check_ssl_redirect, &["deploy"]);
        registry.register(check_hsts, &["deploy"]);
        registry.register(check_content_type_nosniff, &["deploy"]);
        registry.register(check_secure_cookies, &["deploy"]);
        registry.register(check_tls_files, &["deploy"]);
        registry
    }

    /// Registers `func` under `tags`.
    pub fn register(&mut self, func: CheckFn, tags: &[&'static str]) {
        self.checks.push(RegisteredCheck {
            func,
            tags: tags.to_vec(),
        });
    }

    /// Runs every check, or only those carrying one of `tags`.
    pub fn run_checks(&self, tags: Option<&[&str]>, settings: &Settings) -> Vec<CheckMessage> {
        self.checks
            .iter()
            .filter(|check| {
                tags.map_or(true, |wanted| {
                    wanted.iter().any(|t| check.tags.iter().any(|tag| tag == t))
                })
            })
            .flat_map(|check| (check.func)(settings))
            .collect()
    }

    /// Returns the number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Returns `true` if no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Built-in checks
// ============================================================

fn check_secret_key(settings: &Settings) -> Vec<CheckMessage> {
    let key = &settings.secret_key;
    let unique_chars = key.chars().collect::<std::collections::HashSet<_>>().len();
    if key.len() < 50 || unique_chars < 5 {
        vec![CheckMessage::warning(
            "security.W009",
            "SECRET_KEY has fewer than 50 characters or fewer than 5 unique characters.",
            Some("Generate a long random secret_key and keep it out of version control."),
        )]
    } else {
        Vec::new()
    }
}

fn check_allowed_hosts(settings: &Settings) -> Vec<CheckMessage> {
    if !settings.debug && settings.allowed_hosts.is_empty() {
        vec![CheckMessage::error(
            "security.W020",
            "ALLOWED_HOSTS must not be empty when DEBUG is off.",
            Some("List the host names the application is served under."),
        )]
    } else {
        Vec::new()
    }
}

fn check_x_frame_options(settings: &Settings) -> Vec<CheckMessage> {
    match settings.x_frame_options.as_str() {
        "DENY" => Vec::new(),
        "SAMEORIGIN" => vec![CheckMessage::warning(
            "security.W019",
            "X_FRAME_OPTIONS is SAMEORIGIN; pages can be framed by this origin.",
            Some("Use DENY unless the site frames itself."),
        )],
        other => vec![CheckMessage::error(
            "security.E019",
            format!("X_FRAME_OPTIONS has unsupported value '{other}'."),
            Some("Use DENY or SAMEORIGIN."),
        )],
    }
}

fn check_debug(settings: &Settings) -> Vec<CheckMessage> {
    if settings.debug {
        vec![CheckMessage::warning(
            "security.W018",
            "DEBUG must not be enabled in deployment.",
            None,
        )]
    } else {
        Vec::new()
    }
}

fn check_ssl_redirect(settings: &Settings) -> Vec<CheckMessage> {
    if settings.secure_ssl_redirect {
        Vec::new()
    } else {
        vec![CheckMessage::warning(
            "security.W008",
            "SECURE_SSL_REDIRECT is off; plain-HTTP requests are served as-is.",
            Some("Enable it unless the proxy already redirects every HTTP request."),
        )]
    }
}

fn check_hsts(settings: &Settings) -> Vec<CheckMessage> {
    let mut messages = Vec::new();
    if settings.secure_hsts_seconds == 0 {
        messages.push(CheckMessage::warning(
            "security.W004",
            "SECURE_HSTS_SECONDS is not set; browsers will not pin HTTPS.",
            Some("Start with a short max-age and raise it once HTTPS is confirmed."),
        ));
        return messages;
    }
    if !settings.secure_hsts_include_subdomains {
        messages.push(CheckMessage::warning(
            "security.W005",
            "SECURE_HSTS_INCLUDE_SUBDOMAINS is off.",
            None,
        ));
    }
    if !settings.secure_hsts_preload {
        messages.push(CheckMessage::warning(
            "security.W021",
            "SECURE_HSTS_PRELOAD is off; the site cannot join browser preload lists.",
            None,
        ));
    }
    messages
}

fn check_content_type_nosniff(settings: &Settings) -> Vec<CheckMessage> {
    if settings.secure_content_type_nosniff {
        Vec::new()
    } else {
        vec![CheckMessage::warning(
            "security.W006",
            "SECURE_CONTENT_TYPE_NOSNIFF is off.",
            None,
        )]
    }
}

fn check_secure_cookies(settings: &Settings) -> Vec<CheckMessage> {
    let mut messages = Vec::new();
    if !settings.session_cookie_secure {
        messages.push(CheckMessage::warning(
            "security.W012",
            "SESSION_COOKIE_SECURE is off; session cookies may travel over HTTP.",
            None,
        ));
    }
    if !settings.session_cookie_httponly {
        messages.push(CheckMessage::warning(
            "security.W013",
            "SESSION_COOKIE_HTTPONLY is off; scripts can read the session cookie.",
            None,
        ));
    }
    if !settings.csrf_cookie_secure {
        messages.push(CheckMessage::warning(
            "security.W016",
            "CSRF_COOKIE_SECURE is off; the CSRF cookie may travel over HTTP.",
            None,
        ));
    }
    messages
}

fn check_tls_files(settings: &Settings) -> Vec<CheckMessage> {
    let tls = &settings.tls;
    let mut messages = Vec::new();
    for (id, label, path) in [
        ("bookshelf.E001", "certificate", &tls.certificate_path),
        ("bookshelf.E002", "certificate key", &tls.certificate_key_path),
    ] {
        match path {
            None => messages.push(CheckMessage::error(
                id,
                format!("TLS {label} path is not configured."),
                Some("Set it in the [tls] section of the settings file."),
            )),
            Some(p) if !p.is_file() => messages.push(CheckMessage::error(
                id,
                format!("TLS {label} '{}' does not exist.", p.display()),
                None,
            )),
            Some(_) => {}
        }
    }
    if tls.ciphers.is_empty() {
        messages.push(CheckMessage::error(
            "bookshelf.E003",
            "TLS cipher list is empty.",
            None,
        ));
    }
    if tls
        .protocols
        .iter()
        .any(|p| matches!(p.as_str(), "SSLv3" | "TLSv1" | "TLSv1.1"))
    {
        messages.push(CheckMessage::warning(
            "bookshelf.W004",
            "TLS protocol list enables a deprecated protocol version.",
            Some("Only allow TLSv1.2 and TLSv1.3."),
        ));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(messages: &[CheckMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    fn production() -> Settings {
        let dir = std::env::temp_dir();
        let cert = dir.join(format!("bookshelf-check-cert-{}.pem", std::process::id()));
        let key = dir.join(format!("bookshelf-check-key-{}.pem", std::process::id()));
        std::fs::write(&cert, "cert").unwrap();
        std::fs::write(&key, "key").unwrap();
        let mut s = Settings::default();
        s.secret_key = "k".repeat(20) + &"abcdefghij".repeat(4);
        s.allowed_hosts = vec!["books.example.com".to_string()];
        s.tls.certificate_path = Some(cert);
        s.tls.certificate_key_path = Some(key);
        s
    }

    #[test]
    fn test_check_level_ordering() {
        assert!(CheckLevel::Info < CheckLevel::Warning);
        assert!(CheckLevel::Warning < CheckLevel::Error);
    }

    #[test]
    fn test_production_settings_pass_deploy() {
        let registry = CheckRegistry::with_builtins();
        let messages = registry.run_checks(Some(&["deploy"]), &production());
        assert!(messages.is_empty(), "unexpected: {messages:?}");
    }

    #[test]
    fn test_development_settings_fail_deploy() {
        let registry = CheckRegistry::with_builtins();
        let messages = registry.run_checks(Some(&["deploy"]), &Settings::development());
        let ids = ids(&messages);
        assert!(ids.contains(&"security.W018"));
        assert!(ids.contains(&"security.W008"));
        assert!(ids.contains(&"security.W004"));
        assert!(ids.contains(&"security.W012"));
        assert!(ids.contains(&"security.W016"));
        assert!(ids.contains(&"bookshelf.E001"));
        assert!(ids.contains(&"bookshelf.E002"));
        assert!(messages.iter().any(CheckMessage::is_error));
    }

    #[test]
    fn test_security_tag_skips_deploy_only_checks() {
        let registry = CheckRegistry::with_builtins();
        let messages = registry.run_checks(Some(&["security"]), &Settings::development());
        let ids = ids(&messages);
        assert!(!ids.contains(&"security.W018"));
        assert!(!ids.contains(&"bookshelf.E001"));
    }

    #[test]
    fn test_missing_certificate_file() {
        let mut s = production();
        s.tls.certificate_path = Some("/nonexistent/cert.pem".into());
        let messages = check_tls_files(&s);
        assert_eq!(ids(&messages), vec!["bookshelf.E001"]);
        assert!(messages[0].msg.contains("/nonexistent/cert.pem"));
    }

    #[test]
    fn test_deprecated_protocol_warns() {
        let mut s = production();
        s.tls.protocols.push("TLSv1".to_string());
        assert_eq!(ids(&check_tls_files(&s)), vec!["bookshelf.W004"]);
    }

    #[test]
    fn test_hsts_partial() {
        let mut s = production();
        s.secure_hsts_preload = false;
        assert_eq!(ids(&check_hsts(&s)), vec!["security.W021"]);
    }

    #[test]
    fn test_x_frame_options_values() {
        let mut s = production();
        s.x_frame_options = "SAMEORIGIN".to_string();
        assert_eq!(ids(&check_x_frame_options(&s)), vec!["security.W019"]);
        s.x_frame_options = "ALLOW-FROM x".to_string();
        assert_eq!(ids(&check_x_frame_options(&s)), vec!["security.E019"]);
    }

    #[test]
    fn test_empty_allowed_hosts_is_error() {
        let mut s = production();
        s.allowed_hosts.clear();
        let messages = check_allowed_hosts(&s);
        assert!(messages[0].is_error());
    }

    #[test]
    fn test_message_display() {
        let m = CheckMessage::warning("security.W004", "No HSTS.", Some("Set it."));
        assert_eq!(m.to_string(), "(security.W004) WARNING: No HSTS.\n\tHINT: Set it.");
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = CheckRegistry::new();
        assert!(registry.is_empty());
        registry.register(|_| vec![CheckMessage::warning("app.W001", "x", None)], &["app"]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.run_checks(None, &Settings::default()).len(), 1);
        assert!(registry.run_checks(Some(&["deploy"]), &Settings::default()).is_empty());
    }
}
