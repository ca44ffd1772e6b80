//! CSRF protection for cookie-authenticated requests.
//!
//! Every request gets a [`CsrfToken`] extension holding the cookie secret
//! (a new one when the cookie is missing or malformed); templates embed a
//! masked copy via [`CsrfToken::masked`]. Unsafe methods must send the
//! token back in the `X-CSRFToken` header or the `csrfmiddlewaretoken`
//! form field. Secure requests additionally need an `Origin` (or, failing
//! that, a `Referer`) matching the host or a trusted origin.
//!
//! API paths are exempt unless the caller authenticated with a session
//! cookie: token clients send no cookies, and the token endpoint itself is
//! reached anonymously.

use std::str::FromStr;

use async_trait::async_trait;

use bookshelf_auth::csrf::{
    generate_secret, is_valid_secret, mask_secret, tokens_match, CSRF_FORM_FIELD,
};
use bookshelf_auth::AuthMethod;
use bookshelf_core::Settings;
use bookshelf_http::cookies::{Cookie, SameSite};
use bookshelf_http::{HttpRequest, HttpResponse};

use super::auth::current_user;
use super::Middleware;

/// One year, the lifetime of the CSRF cookie.
pub const CSRF_COOKIE_AGE: u64 = 31_449_600;

/// The CSRF secret for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    secret: String,
    needs_cookie: bool,
}

impl CsrfToken {
    /// Returns a freshly masked token for embedding in a page.
    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }

    /// Returns the raw secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

/// Returns a masked CSRF token for `request`, or `""` outside the pipeline.
pub fn get_token(request: &HttpRequest) -> String {
    request
        .extensions()
        .get::<CsrfToken>()
        .map(CsrfToken::masked)
        .unwrap_or_default()
}

/// CSRF middleware.
#[derive(Debug, Clone)]
pub struct CsrfMiddleware {
    cookie_name: String,
    header_name: String,
    cookie_secure: bool,
    cookie_httponly: bool,
    cookie_samesite: SameSite,
    trusted_origins: Vec<String>,
    exempt_prefixes: Vec<String>,
}

impl CsrfMiddleware {
    /// Builds the middleware from `settings`. Paths under `/api/` are
    /// exempt for non-session clients.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cookie_name: settings.csrf_cookie_name.clone(),
            header_name: settings.csrf_header_name.to_ascii_lowercase(),
            cookie_secure: settings.csrf_cookie_secure,
            cookie_httponly: settings.csrf_cookie_httponly,
            cookie_samesite: SameSite::from_str(&settings.csrf_cookie_samesite)
                .unwrap_or(SameSite::Lax),
            trusted_origins: settings
                .csrf_trusted_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
            exempt_prefixes: vec!["/api/".to_string()],
        }
    }

    const fn is_safe_method(method: &http::Method) -> bool {
        matches!(
            *method,
            http::Method::GET | http::Method::HEAD | http::Method::OPTIONS | http::Method::TRACE
        )
    }

    fn is_exempt(&self, request: &HttpRequest) -> bool {
        let session_user = current_user(request)
            .is_some_and(|u| matches!(u.method, AuthMethod::Session(_)));
        if session_user {
            return false;
        }
        current_user(request).is_some_and(|u| u.is_token_authenticated())
            || self
                .exempt_prefixes
                .iter()
                .any(|prefix| request.path().starts_with(prefix.as_str()))
    }

    fn is_trusted_origin(&self, origin: &str, request: &HttpRequest) -> bool {
        let origin = origin.trim_end_matches('/').to_ascii_lowercase();
        let own = format!("{}://{}", request.scheme(), request.get_host()).to_ascii_lowercase();
        if origin == own {
            return true;
        }
        self.trusted_origins.iter().any(|trusted| {
            if let Some((scheme, rest)) = trusted.split_once("://*") {
                origin.starts_with(&format!("{scheme}://")) && origin.ends_with(rest)
            } else {
                *trusted == origin
            }
        })
    }

    fn check_origin(&self, request: &HttpRequest) -> Result<(), String> {
        if let Some(origin) = request.header("origin") {
            if self.is_trusted_origin(origin, request) {
                return Ok(());
            }
            return Err(format!(
                "Origin checking failed - {origin} does not match any trusted origins."
            ));
        }
        if !request.is_secure() {
            return Ok(());
        }
        let Some(referer) = request.header("referer") else {
            return Err("Referer checking failed - no Referer.".into());
        };
        let Ok(parsed) = url::Url::parse(referer) else {
            return Err("Referer checking failed - Referer is malformed.".into());
        };
        if parsed.scheme() != "https" {
            return Err("Referer checking failed - Referer is insecure while host is secure."
                .into());
        }
        let referer_origin = parsed.origin().ascii_serialization();
        if self.is_trusted_origin(&referer_origin, request) {
            Ok(())
        } else {
            Err(format!(
                "Referer checking failed - {referer} does not match any trusted origins."
            ))
        }
    }

    fn check_token(&self, request: &HttpRequest) -> Result<(), String> {
        let Some(secret) = request
            .cookie(&self.cookie_name)
            .filter(|s| is_valid_secret(s))
        else {
            return Err("CSRF cookie not set.".into());
        };
        let submitted = request
            .header(&self.header_name)
            .or_else(|| request.post().get(CSRF_FORM_FIELD));
        let Some(submitted) = submitted else {
            return Err("CSRF token missing.".into());
        };
        if tokens_match(submitted.trim(), secret) {
            Ok(())
        } else {
            Err("CSRF token invalid.".into())
        }
    }

    fn build_cookie(&self, secret: &str) -> Cookie {
        Cookie::new(&self.cookie_name, secret)
            .max_age(CSRF_COOKIE_AGE)
            .path("/")
            .secure(self.cookie_secure)
            .httponly(self.cookie_httponly)
            .samesite(self.cookie_samesite)
    }
}

fn rejection(reason: &str) -> HttpResponse {
    HttpResponse::forbidden(format!(
        "<h1>Forbidden (403)</h1><p>CSRF verification failed. Request aborted.</p><p>{reason}</p>"
    ))
}

#[async_trait]
impl Middleware for CsrfMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        let existing = request
            .cookie(&self.cookie_name)
            .filter(|s| is_valid_secret(s))
            .map(str::to_string);
        let token = existing.map_or_else(
            || CsrfToken {
                secret: generate_secret(),
                needs_cookie: true,
            },
            |secret| CsrfToken {
                secret,
                needs_cookie: false,
            },
        );
        request.extensions_mut().insert(token);

        if Self::is_safe_method(request.method()) || self.is_exempt(request) {
            return None;
        }

        if let Err(reason) = self
            .check_origin(request)
            .and_then(|()| self.check_token(request))
        {
            tracing::warn!(
                path = %request.path(),
                reason = %reason,
                "CSRF verification failed"
            );
            return Some(rejection(&reason));
        }
        None
    }

    async fn process_response(
        &self,
        request: &HttpRequest,
        mut response: HttpResponse,
    ) -> HttpResponse {
        if let Some(token) = request.extensions().get::<CsrfToken>() {
            if token.needs_cookie && !self.is_exempt(request) {
                response.set_cookie(&self.build_cookie(&token.secret));
            }
        }
        response
    }
}
