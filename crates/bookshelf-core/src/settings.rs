//! Application settings.
//!
//! [`Settings`] holds every configurable value with hardened defaults: the
//! security block defaults to what a production deployment behind a TLS
//! terminating proxy wants (HSTS for a year with subdomains and preload,
//! `DENY` framing, nosniff, secure cookies). Development setups flip
//! `debug` on and `secure_ssl_redirect` off through the TOML file or
//! `BOOKSHELF_*` environment variables; see
//! [`settings_loader`](crate::settings_loader).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The Content-Security-Policy sent with every response unless overridden.
pub const DEFAULT_CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
script-src 'self' 'unsafe-inline'; \
style-src 'self' 'unsafe-inline'; \
img-src 'self' data:; \
font-src 'self'; \
connect-src 'self'; \
frame-ancestors 'none';";

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine. Only `sqlite3` is supported.
    pub engine: String,
    /// File path of the database, or `:memory:`.
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite3".to_string(),
            name: "db.sqlite3".to_string(),
        }
    }
}

/// Reverse proxy TLS termination settings, consumed by the `proxyconf`
/// and `check --deploy` commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Public host name served by the proxy.
    pub server_name: String,
    /// Address of the application server the proxy forwards to.
    pub upstream: String,
    /// HTTPS listen port.
    pub https_port: u16,
    /// HTTP listen port (only used to redirect to HTTPS).
    pub http_port: u16,
    /// PEM certificate chain.
    pub certificate_path: Option<PathBuf>,
    /// PEM private key.
    pub certificate_key_path: Option<PathBuf>,
    /// Accepted protocol versions.
    pub protocols: Vec<String>,
    /// OpenSSL cipher suite list.
    pub ciphers: Vec<String>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            upstream: "127.0.0.1:8000".to_string(),
            https_port: 443,
            http_port: 80,
            certificate_path: None,
            certificate_key_path: None,
            protocols: vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()],
            ciphers: vec![
                "ECDHE-ECDSA-AES128-GCM-SHA256".to_string(),
                "ECDHE-RSA-AES128-GCM-SHA256".to_string(),
                "ECDHE-ECDSA-AES256-GCM-SHA384".to_string(),
                "ECDHE-RSA-AES256-GCM-SHA384".to_string(),
                "ECDHE-ECDSA-CHACHA20-POLY1305".to_string(),
                "ECDHE-RSA-CHACHA20-POLY1305".to_string(),
            ],
        }
    }
}

/// The complete set of application settings.
///
/// # Examples
///
/// ```
/// use bookshelf_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(!settings.debug);
/// assert!(settings.secure_ssl_redirect);
/// assert_eq!(settings.x_frame_options, "DENY");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,
    /// Key used to derive token digests and CSRF secrets.
    pub secret_key: String,
    /// Host names this application may serve.
    pub allowed_hosts: Vec<String>,
    /// Address `runserver` binds when none is given.
    pub bind_address: String,
    /// Log filter directive (e.g. "info", "bookshelf_views=debug").
    pub log_level: String,

    // ── Database ─────────────────────────────────────────────────────

    /// The application database.
    pub database: DatabaseSettings,

    // ── Media ────────────────────────────────────────────────────────

    /// URL prefix for uploaded media (profile photos).
    pub media_url: String,
    /// Directory holding uploaded media.
    pub media_root: PathBuf,

    // ── Authentication ───────────────────────────────────────────────

    /// URL of the login page.
    pub login_url: String,
    /// Where to send users after logging in.
    pub login_redirect_url: String,
    /// Where to send users after logging out.
    pub logout_redirect_url: String,
    /// Minimum password length enforced at registration.
    pub password_min_length: usize,

    // ── Transport security ───────────────────────────────────────────

    /// Redirect every plain-HTTP request to HTTPS.
    pub secure_ssl_redirect: bool,
    /// Host to redirect to; the request host when `None`.
    pub secure_ssl_host: Option<String>,
    /// Path regexes exempt from the HTTPS redirect (leading slash stripped).
    pub secure_redirect_exempt: Vec<String>,
    /// `(header, value)` that marks a request as secure when set by the
    /// TLS terminating proxy, e.g. `("X-Forwarded-Proto", "https")`.
    pub secure_proxy_ssl_header: Option<(String, String)>,
    /// HSTS `max-age`. Zero disables the header.
    pub secure_hsts_seconds: u64,
    /// Add `includeSubDomains` to HSTS.
    pub secure_hsts_include_subdomains: bool,
    /// Add `preload` to HSTS.
    pub secure_hsts_preload: bool,

    // ── Response headers ─────────────────────────────────────────────

    /// Send `X-Content-Type-Options: nosniff`.
    pub secure_content_type_nosniff: bool,
    /// Send `X-XSS-Protection: 1; mode=block`.
    pub secure_browser_xss_filter: bool,
    /// `X-Frame-Options` value (`DENY` or `SAMEORIGIN`); empty disables it.
    pub x_frame_options: String,
    /// `Referrer-Policy` value; empty disables it.
    pub secure_referrer_policy: String,
    /// `Cross-Origin-Opener-Policy` value; empty disables it.
    pub secure_cross_origin_opener_policy: String,
    /// `Content-Security-Policy` value; empty disables it.
    pub content_security_policy: String,

    // ── Sessions ─────────────────────────────────────────────────────

    /// Session cookie name.
    pub session_cookie_name: String,
    /// Session lifetime in seconds.
    pub session_cookie_age: u64,
    /// Only send the session cookie over HTTPS.
    pub session_cookie_secure: bool,
    /// Hide the session cookie from scripts.
    pub session_cookie_httponly: bool,
    /// `SameSite` attribute for the session cookie.
    pub session_cookie_samesite: String,

    // ── CSRF ─────────────────────────────────────────────────────────

    /// CSRF cookie name.
    pub csrf_cookie_name: String,
    /// Header carrying the CSRF token on AJAX requests.
    pub csrf_header_name: String,
    /// Only send the CSRF cookie over HTTPS.
    pub csrf_cookie_secure: bool,
    /// Hide the CSRF cookie from scripts.
    pub csrf_cookie_httponly: bool,
    /// `SameSite` attribute for the CSRF cookie.
    pub csrf_cookie_samesite: String,
    /// Origins (scheme and host) trusted for unsafe requests.
    pub csrf_trusted_origins: Vec<String>,

    // ── Reverse proxy ────────────────────────────────────────────────

    /// TLS termination settings for the reverse proxy.
    pub tls: TlsSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            secret_key: String::new(),
            allowed_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            bind_address: "127.0.0.1:8000".to_string(),
            log_level: "info".to_string(),

            database: DatabaseSettings::default(),

            media_url: "/media/".to_string(),
            media_root: PathBuf::from("media"),

            login_url: "/accounts/login/".to_string(),
            login_redirect_url: "/bookshelf/".to_string(),
            logout_redirect_url: "/accounts/login/".to_string(),
            password_min_length: 8,

            secure_ssl_redirect: true,
            secure_ssl_host: None,
            secure_redirect_exempt: Vec::new(),
            secure_proxy_ssl_header: Some((
                "X-Forwarded-Proto".to_string(),
                "https".to_string(),
            )),
            secure_hsts_seconds: 31_536_000,
            secure_hsts_include_subdomains: true,
            secure_hsts_preload: true,

            secure_content_type_nosniff: true,
            secure_browser_xss_filter: true,
            x_frame_options: "DENY".to_string(),
            secure_referrer_policy: "same-origin".to_string(),
            secure_cross_origin_opener_policy: "same-origin".to_string(),
            content_security_policy: DEFAULT_CONTENT_SECURITY_POLICY.to_string(),

            session_cookie_name: "sessionid".to_string(),
            session_cookie_age: 1_209_600,
            session_cookie_secure: true,
            session_cookie_httponly: true,
            session_cookie_samesite: "Lax".to_string(),

            csrf_cookie_name: "csrftoken".to_string(),
            csrf_header_name: "X-CSRFToken".to_string(),
            csrf_cookie_secure: true,
            csrf_cookie_httponly: false,
            csrf_cookie_samesite: "Lax".to_string(),
            csrf_trusted_origins: Vec::new(),

            tls: TlsSettings::default(),
        }
    }
}

impl Settings {
    /// Settings for local development: debug on, no HTTPS redirect, no
    /// HSTS, cookies allowed over plain HTTP.
    pub fn development() -> Self {
        Self {
            debug: true,
            secret_key: "development-only-secret-key-do-not-use-in-production".to_string(),
            log_level: "debug".to_string(),
            secure_ssl_redirect: false,
            secure_hsts_seconds: 0,
            session_cookie_secure: false,
            csrf_cookie_secure: false,
            ..Self::default()
        }
    }

    /// Returns the `Strict-Transport-Security` value, or `None` when HSTS
    /// is disabled.
    pub fn hsts_header_value(&self) -> Option<String> {
        if self.secure_hsts_seconds == 0 {
            return None;
        }
        let mut value = format!("max-age={}", self.secure_hsts_seconds);
        if self.secure_hsts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.secure_hsts_preload {
            value.push_str("; preload");
        }
        Some(value)
    }
}
