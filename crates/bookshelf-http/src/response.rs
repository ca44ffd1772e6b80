//! HTTP response types.
//!
//! [`HttpResponse`] is a fully buffered response. The helper structs
//! ([`JsonResponse`], [`HttpResponseRedirect`], ...) only construct
//! `HttpResponse` values with the right status and content type.

use axum::response::IntoResponse;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

use bookshelf_core::BookshelfError;

use crate::cookies::Cookie;

/// A buffered HTTP response.
///
/// # Examples
///
/// ```
/// use bookshelf_http::HttpResponse;
///
/// let response = HttpResponse::ok("<h1>Books</h1>");
/// assert_eq!(response.status(), http::StatusCode::OK);
/// assert_eq!(response.content_type(), "text/html; charset=utf-8");
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    content_type: String,
}

impl HttpResponse {
    /// Creates an HTML response.
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into().into_bytes(),
            content_type: "text/html; charset=utf-8".to_string(),
        }
    }

    /// 200 OK.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// 400 Bad Request.
    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, body)
    }

    /// 403 Forbidden.
    pub fn forbidden(body: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, body)
    }

    /// 404 Not Found.
    pub fn not_found(body: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, body)
    }

    /// 500 Internal Server Error.
    pub fn server_error(body: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, body)
    }

    /// 405 Method Not Allowed with an `Allow` header.
    pub fn not_allowed(permitted_methods: &[&str]) -> Self {
        let allow = permitted_methods.join(", ");
        let mut response = Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("<h1>Method Not Allowed</h1><p>Allowed: {allow}</p>"),
        );
        response.set_header(http::header::ALLOW, &allow);
        response
    }

    /// Builds the response for an error, using its status code.
    ///
    /// Server-side failures never leak their message to the client.
    pub fn from_error(err: &BookshelfError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = if status.is_server_error() {
            "<h1>Server Error (500)</h1>".to_string()
        } else {
            format!(
                "<h1>{} {}</h1>",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Error")
            )
        };
        Self::new(status, body)
    }

    /// Returns the status code.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the headers (without `Content-Type`, which is tracked separately).
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header, replacing any existing value. Values that are not
    /// valid header text are dropped with a warning.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => tracing::warn!(header = %name, "dropping invalid header value"),
        }
    }

    /// Returns the `Content-Type`.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Sets the `Content-Type`.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// Returns the body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&mut self, cookie: &Cookie) {
        if let Ok(value) = HeaderValue::from_str(&cookie.to_set_cookie_header()) {
            self.headers.append(http::header::SET_COOKIE, value);
        }
    }

    /// Appends a `Set-Cookie` header that expires `name`.
    pub fn delete_cookie(&mut self, name: &str) {
        self.set_cookie(&Cookie::removal(name));
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status, self.body).into_response();
        let headers = response.headers_mut();
        if let Ok(ct) = HeaderValue::from_str(&self.content_type) {
            headers.insert(http::header::CONTENT_TYPE, ct);
        }
        let mut last_name = None;
        for (name, value) in self.headers {
            // HeaderMap's owning iterator yields `None` for repeated values
            // of the previous name.
            if let Some(name) = name {
                last_name = Some(name);
            }
            if let Some(name) = &last_name {
                headers.append(name.clone(), value);
            }
        }
        response
    }
}

/// JSON responses.
pub struct JsonResponse;

impl JsonResponse {
    /// 200 OK with `data` serialized as JSON.
    pub fn new<T: serde::Serialize>(data: &T) -> HttpResponse {
        Self::with_status(StatusCode::OK, data)
    }

    /// `status` with `data` serialized as JSON.
    pub fn with_status<T: serde::Serialize>(status: StatusCode, data: &T) -> HttpResponse {
        match serde_json::to_string(data) {
            Ok(json) => {
                let mut response = HttpResponse::new(status, json);
                response.set_content_type("application/json");
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize JSON response");
                HttpResponse::server_error("<h1>Server Error (500)</h1>")
            }
        }
    }

    /// `{"detail": message}` with the error's status code.
    pub fn from_error(err: &BookshelfError) -> HttpResponse {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match err {
            BookshelfError::ValidationError(v) => Self::with_status(status, &v.to_json()),
            _ if status.is_server_error() => Self::with_status(
                status,
                &serde_json::json!({"detail": "A server error occurred."}),
            ),
            BookshelfError::BadRequest(m)
            | BookshelfError::Unauthorized(m)
            | BookshelfError::PermissionDenied(m)
            | BookshelfError::NotFound(m)
            | BookshelfError::MethodNotAllowed(m) => {
                Self::with_status(status, &serde_json::json!({"detail": m}))
            }
            other => Self::with_status(status, &serde_json::json!({"detail": other.to_string()})),
        }
    }
}

/// 302 Found.
pub struct HttpResponseRedirect;

impl HttpResponseRedirect {
    /// Redirects to `url`.
    pub fn new(url: &str) -> HttpResponse {
        let mut response = HttpResponse::new(StatusCode::FOUND, "");
        response.set_header(http::header::LOCATION, url);
        response
    }
}

/// 301 Moved Permanently.
pub struct HttpResponsePermanentRedirect;

impl HttpResponsePermanentRedirect {
    /// Redirects permanently to `url`.
    pub fn new(url: &str) -> HttpResponse {
        let mut response = HttpResponse::new(StatusCode::MOVED_PERMANENTLY, "");
        response.set_header(http::header::LOCATION, url);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_core::ValidationError;

    #[test]
    fn test_not_allowed_sets_allow() {
        let response = HttpResponse::not_allowed(&["GET", "POST"]);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header("allow"), Some("GET, POST"));
    }

    #[test]
    fn test_redirects() {
        let found = HttpResponseRedirect::new("/bookshelf/");
        assert_eq!(found.status(), StatusCode::FOUND);
        assert_eq!(found.header("location"), Some("/bookshelf/"));

        let moved = HttpResponsePermanentRedirect::new("https://books.example.com/");
        assert_eq!(moved.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(moved.header("location"), Some("https://books.example.com/"));
    }

    #[test]
    fn test_from_error_hides_server_details() {
        let response =
            HttpResponse::from_error(&BookshelfError::DatabaseError("disk I/O at /secret".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.text().contains("secret"));

        let response =
            HttpResponse::from_error(&BookshelfError::PermissionDenied("nope".into()));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.text().contains("403 Forbidden"));
    }

    #[test]
    fn test_json_from_validation_error() {
        let err = BookshelfError::ValidationError(ValidationError::for_field("title", "Required."));
        let response = JsonResponse::from_error(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.content_type(), "application/json");
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["title"][0], "Required.");
    }

    #[test]
    fn test_json_from_unauthorized() {
        let err = BookshelfError::Unauthorized("Authentication credentials were not provided.".into());
        let response = JsonResponse::from_error(&err);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.text().contains("credentials were not provided"));
    }

    #[test]
    fn test_cookies_append() {
        let mut response = HttpResponse::ok("");
        response.set_cookie(&Cookie::new("a", "1"));
        response.delete_cookie("b");
        let cookies: Vec<_> = response
            .headers()
            .get_all(http::header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, vec!["a=1; Path=/", "b=; Max-Age=0; Path=/"]);
    }

    #[test]
    fn test_set_header_rejects_invalid_value() {
        let mut response = HttpResponse::ok("");
        response.set_header(http::header::LOCATION, "bad\nvalue");
        assert!(response.header("location").is_none());
    }

    #[test]
    fn test_into_response_keeps_repeated_headers() {
        let mut response = HttpResponse::ok("body");
        response.set_cookie(&Cookie::new("a", "1"));
        response.set_cookie(&Cookie::new("b", "2"));
        let axum_response = response.into_response();
        assert_eq!(
            axum_response.headers().get_all(http::header::SET_COOKIE).iter().count(),
            2
        );
        assert_eq!(
            axum_response.headers()[http::header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }
}
