//! An in-process HTTP client for end-to-end tests.
//!
//! [`TestClient`] drives the axum router with `tower::ServiceExt::oneshot`,
//! so requests go through the full middleware pipeline without opening a
//! socket. It keeps a cookie jar, sends a `Host` header, and can mark
//! requests as coming through the TLS proxy.
//!
//! ```rust,no_run
//! use bookshelf_test::client::TestClient;
//! use axum::routing::get;
//!
//! async fn example() {
//!     let app = axum::Router::new().route("/hello", get(|| async { "Hello" }));
//!     let mut client = TestClient::new(app);
//!     let response = client.get("/hello").await;
//!     assert_eq!(response.status_code(), 200);
//! }
//! ```

use std::collections::BTreeMap;

use axum::Router;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use bookshelf_core::BookshelfError;
use bookshelf_http::QueryDict;

/// Simulates a browser or API client against a router.
pub struct TestClient {
    app: Router,
    cookies: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    host: String,
    secure: bool,
}

impl TestClient {
    /// Creates a client for `app` using host `localhost` over plain HTTP.
    pub fn new(app: Router) -> Self {
        Self {
            app,
            cookies: BTreeMap::new(),
            headers: Vec::new(),
            host: "localhost".to_string(),
            secure: false,
        }
    }

    /// Sets the `Host` header sent with every request.
    pub fn set_host(&mut self, host: &str) {
        self.host = host.to_string();
    }

    /// When `true`, requests carry `X-Forwarded-Proto: https` as if they
    /// came through the TLS proxy.
    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    /// Adds a header sent with every following request.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Sends `Authorization: Token <key>` from now on.
    pub fn set_token(&mut self, key: &str) {
        self.set_header("authorization", &format!("Token {key}"));
    }

    /// Sets a cookie in the jar.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    /// Returns a cookie from the jar.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Empties the cookie jar.
    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.host)
    }

    /// GET `path` (which may carry a query string).
    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.request(Method::GET, path, Vec::new(), None, &[]).await
    }

    /// POSTs a form, sending the CSRF cookie value back in the
    /// `X-CSRFToken` header when the jar has one.
    pub async fn post_form(&mut self, path: &str, pairs: &[(&str, &str)]) -> TestResponse {
        let token = self.cookie("csrftoken").map(str::to_string);
        let headers: Vec<(&str, &str)> = token
            .as_deref()
            .map(|t| vec![("x-csrftoken", t)])
            .unwrap_or_default();
        self.send_form(Method::POST, path, pairs, &headers).await
    }

    /// POSTs a form without any CSRF token.
    pub async fn post_form_without_csrf(
        &mut self,
        path: &str,
        pairs: &[(&str, &str)],
    ) -> TestResponse {
        self.send_form(Method::POST, path, pairs, &[]).await
    }

    async fn send_form(
        &mut self,
        method: Method,
        path: &str,
        pairs: &[(&str, &str)],
        extra: &[(&str, &str)],
    ) -> TestResponse {
        let body = QueryDict::from_pairs(pairs.iter().copied()).urlencode();
        self.request(
            method,
            path,
            body.into_bytes(),
            Some("application/x-www-form-urlencoded"),
            extra,
        )
        .await
    }

    /// Sends a JSON body with `method`.
    pub async fn send_json(
        &mut self,
        method: Method,
        path: &str,
        value: &serde_json::Value,
    ) -> TestResponse {
        self.request(
            method,
            path,
            value.to_string().into_bytes(),
            Some("application/json"),
            &[],
        )
        .await
    }

    /// POSTs JSON.
    pub async fn post_json(&mut self, path: &str, value: &serde_json::Value) -> TestResponse {
        self.send_json(Method::POST, path, value).await
    }

    /// PUTs JSON.
    pub async fn put_json(&mut self, path: &str, value: &serde_json::Value) -> TestResponse {
        self.send_json(Method::PUT, path, value).await
    }

    /// PATCHes JSON.
    pub async fn patch_json(&mut self, path: &str, value: &serde_json::Value) -> TestResponse {
        self.send_json(Method::PATCH, path, value).await
    }

    /// DELETE `path`.
    pub async fn delete(&mut self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, Vec::new(), None, &[]).await
    }

    /// Sends a request with an arbitrary body.
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        let unsafe_method = !matches!(method, Method::GET | Method::HEAD | Method::OPTIONS);
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", &self.host);

        if self.secure {
            builder = builder.header("x-forwarded-proto", "https");
        }
        if unsafe_method {
            builder = builder.header("origin", self.origin());
        }
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        if !self.cookies.is_empty() {
            let jar = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header("cookie", jar);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }

        let req = builder
            .body(axum::body::Body::from(body))
            .expect("request builder should not fail");
        self.send(req).await
    }

    async fn send(&mut self, req: Request<axum::body::Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(req)
            .await
            .expect("router should not error");

        let status = response.status();
        let headers = response.headers().clone();

        let mut response_cookies = BTreeMap::new();
        for value in headers.get_all(http::header::SET_COOKIE) {
            let Ok(cookie) = value.to_str() else { continue };
            let mut attributes = cookie.split(';').map(str::trim);
            let Some((name, val)) = attributes.next().and_then(|p| p.split_once('=')) else {
                continue;
            };
            let expired = attributes.any(|a| a.eq_ignore_ascii_case("max-age=0"));
            if expired {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), val.to_string());
            }
            response_cookies.insert(name.to_string(), val.to_string());
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_or_else(|_| Bytes::new(), http_body_util::Collected::to_bytes);

        TestResponse {
            status,
            headers,
            body: body.to_vec(),
            cookies: response_cookies,
        }
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("host", &self.host)
            .field("secure", &self.secure)
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A response received by [`TestClient`].
#[derive(Debug)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Vec<u8>,
    /// Cookies set by this response.
    pub cookies: BTreeMap<String, String>,
}

impl TestResponse {
    /// The body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parses the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, BookshelfError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BookshelfError::SerializationError(e.to_string()))
    }

    /// The numeric status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// A header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    /// Returns `true` if the body contains `text`.
    pub fn contains(&self, text: &str) -> bool {
        self.text().contains(text)
    }
}
