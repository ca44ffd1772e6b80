//! Transport security: static response headers, host validation and the
//! HTTPS redirect.

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};
use regex::Regex;

use bookshelf_core::{BookshelfError, Settings};
use bookshelf_http::{HttpRequest, HttpResponse, HttpResponsePermanentRedirect};

use super::Middleware;

// ── SecurityHeadersMiddleware ───────────────────────────────────────────

/// Appends a fixed set of security headers to every response.
///
/// The set is computed once from [`Settings`]; headers whose setting is
/// empty or disabled are left out. Values already set by a view are
/// replaced.
#[derive(Debug, Clone)]
pub struct SecurityHeadersMiddleware {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeadersMiddleware {
    /// Builds the header set from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, BookshelfError> {
        let mut candidates: Vec<(&'static str, Option<String>)> = vec![
            (
                "content-security-policy",
                non_empty(&settings.content_security_policy),
            ),
            ("strict-transport-security", settings.hsts_header_value()),
            ("x-frame-options", non_empty(&settings.x_frame_options)),
            ("referrer-policy", non_empty(&settings.secure_referrer_policy)),
            (
                "cross-origin-opener-policy",
                non_empty(&settings.secure_cross_origin_opener_policy),
            ),
        ];
        if settings.secure_content_type_nosniff {
            candidates.push(("x-content-type-options", Some("nosniff".to_string())));
        }
        if settings.secure_browser_xss_filter {
            candidates.push(("x-xss-protection", Some("1; mode=block".to_string())));
        }

        let mut headers = Vec::new();
        for (name, value) in candidates {
            let Some(value) = value else { continue };
            let value = HeaderValue::from_str(&value).map_err(|_| {
                BookshelfError::ImproperlyConfigured(format!(
                    "invalid value for the {name} header: {value:?}"
                ))
            })?;
            headers.push((HeaderName::from_static(name), value));
        }
        Ok(Self { headers })
    }

    /// The headers added to each response.
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[async_trait]
impl Middleware for SecurityHeadersMiddleware {
    async fn process_response(
        &self,
        _request: &HttpRequest,
        mut response: HttpResponse,
    ) -> HttpResponse {
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        response
    }
}

// ── SecurityMiddleware ──────────────────────────────────────────────────

/// Rejects requests for hosts not in `allowed_hosts` and redirects plain
/// HTTP requests to HTTPS.
#[derive(Debug, Clone)]
pub struct SecurityMiddleware {
    allowed_hosts: Vec<String>,
    ssl_redirect: bool,
    ssl_host: Option<String>,
    redirect_exempt: Vec<Regex>,
}

impl SecurityMiddleware {
    /// Builds the middleware from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, BookshelfError> {
        let redirect_exempt = settings
            .secure_redirect_exempt
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    BookshelfError::ImproperlyConfigured(format!(
                        "invalid secure_redirect_exempt pattern '{pattern}': {e}"
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let mut allowed_hosts: Vec<String> = settings
            .allowed_hosts
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        if allowed_hosts.is_empty() && settings.debug {
            allowed_hosts = vec![".localhost".into(), "127.0.0.1".into(), "[::1]".into()];
        }

        Ok(Self {
            allowed_hosts,
            ssl_redirect: settings.secure_ssl_redirect,
            ssl_host: settings.secure_ssl_host.clone().filter(|h| !h.is_empty()),
            redirect_exempt,
        })
    }

    fn is_exempt(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        self.redirect_exempt.iter().any(|re| re.is_match(path))
    }
}

/// Splits the port off a `Host` header value, keeping IPv6 brackets.
pub fn split_host_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.rsplit_once(':').map_or(host, |(domain, _)| domain)
}

/// Returns `true` if `host` (port already stripped) matches one of the
/// allowed patterns: `*`, an exact name, or `.example.com` for the domain
/// and its subdomains.
///
/// ```
/// use bookshelf_views::middleware::security::is_host_allowed;
///
/// let allowed = vec![".example.com".to_string(), "localhost".to_string()];
/// assert!(is_host_allowed("books.example.com", &allowed));
/// assert!(is_host_allowed("example.com", &allowed));
/// assert!(!is_host_allowed("example.com.evil.net", &allowed));
/// ```
pub fn is_host_allowed(host: &str, allowed: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    allowed.iter().any(|pattern| {
        if pattern == "*" {
            return true;
        }
        pattern.strip_prefix('.').map_or_else(
            || *pattern == host,
            |domain| host == domain || host.ends_with(pattern.as_str()),
        )
    })
}

#[async_trait]
impl Middleware for SecurityMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        let host = split_host_port(request.get_host()).to_string();
        if !is_host_allowed(&host, &self.allowed_hosts) {
            tracing::warn!(host = %host, "invalid HTTP_HOST header");
            return Some(HttpResponse::bad_request("<h1>Bad Request (400)</h1>"));
        }

        if self.ssl_redirect && !request.is_secure() && !self.is_exempt(request.path()) {
            let target_host = self
                .ssl_host
                .clone()
                .unwrap_or_else(|| request.get_host().to_string());
            let location = format!("https://{target_host}{}", request.get_full_path());
            tracing::info!(location = %location, "redirecting to HTTPS");
            return Some(HttpResponsePermanentRedirect::new(&location));
        }
        None
    }
}
