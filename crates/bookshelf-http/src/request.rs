//! The HTTP request type handed to middleware and views.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;

use http::{Extensions, HeaderMap, Method};
use serde::de::DeserializeOwned;

use bookshelf_core::{BookshelfError, BookshelfResult};

use crate::cookies;
use crate::querydict::QueryDict;

/// An incoming HTTP request.
///
/// Middleware attach typed data (the authenticated user, the CSRF token)
/// through [`extensions_mut`](Self::extensions_mut); URL resolution fills
/// in the route name and captured path parameters.
///
/// # Examples
///
/// ```
/// use bookshelf_http::HttpRequest;
///
/// let request = HttpRequest::builder()
///     .method(http::Method::GET)
///     .path("/bookshelf/")
///     .query_string("q=dune")
///     .header("host", "books.example.com")
///     .build();
///
/// assert_eq!(request.get().get("q"), Some("dune"));
/// assert_eq!(request.get_host(), "books.example.com");
/// assert_eq!(request.get_full_path(), "/bookshelf/?q=dune");
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    query_string: String,
    content_type: Option<String>,
    get: QueryDict,
    post: QueryDict,
    headers: HeaderMap,
    body: Vec<u8>,
    scheme: String,
    url_name: Option<String>,
    kwargs: HashMap<String, String>,
    extensions: Extensions,
    cached_cookies: OnceLock<HashMap<String, String>>,
}

impl HttpRequest {
    /// Creates a builder, mostly for tests.
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Creates a request from the parts and collected body of an axum request.
    ///
    /// The scheme starts as the URI scheme (plain HTTP when absent, which is
    /// the normal case behind a proxy); the server upgrades it when the
    /// configured proxy header says the client connection was secure.
    pub fn from_axum(parts: http::request::Parts, body: Vec<u8>) -> Self {
        let scheme = parts
            .uri
            .scheme_str()
            .unwrap_or("http")
            .to_ascii_lowercase();
        let path = parts.uri.path().to_string();
        let query_string = parts.uri.query().unwrap_or("").to_string();
        Self::assemble(parts.method, path, query_string, parts.headers, body, scheme)
    }

    fn assemble(
        method: Method,
        path: String,
        query_string: String,
        headers: HeaderMap,
        body: Vec<u8>,
        scheme: String,
    ) -> Self {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let get = QueryDict::parse(&query_string);
        let post = if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        {
            QueryDict::parse(&String::from_utf8_lossy(&body))
        } else {
            QueryDict::new()
        };

        Self {
            method,
            path,
            query_string,
            content_type,
            get,
            post,
            headers,
            body,
            scheme,
            url_name: None,
            kwargs: HashMap::new(),
            extensions: Extensions::new(),
            cached_cookies: OnceLock::new(),
        }
    }

    /// Returns the HTTP method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Returns the `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the query parameters.
    pub const fn get(&self) -> &QueryDict {
        &self.get
    }

    /// Returns the form-encoded body parameters.
    pub const fn post(&self) -> &QueryDict {
        &self.post
    }

    /// Returns the request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns `true` if the body is declared as JSON.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }

    /// Deserializes the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> BookshelfResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BookshelfError::BadRequest(format!("JSON parse error - {e}")))
    }

    /// Returns `"http"` or `"https"`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Overrides the scheme.
    pub fn set_scheme(&mut self, scheme: &str) {
        self.scheme = scheme.to_ascii_lowercase();
    }

    /// Returns `true` if the client connection was HTTPS.
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Returns the `Host` header, or `localhost` when absent.
    pub fn get_host(&self) -> &str {
        self.header("host").unwrap_or("localhost")
    }

    /// Returns the path plus query string.
    pub fn get_full_path(&self) -> String {
        if self.query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string)
        }
    }

    /// Builds an absolute URI for `location`, or for this request when `None`.
    pub fn build_absolute_uri(&self, location: Option<&str>) -> String {
        match location {
            Some(loc) if loc.starts_with("http://") || loc.starts_with("https://") => {
                loc.to_string()
            }
            Some(loc) => {
                let sep = if loc.starts_with('/') { "" } else { "/" };
                format!("{}://{}{sep}{loc}", self.scheme, self.get_host())
            }
            None => format!(
                "{}://{}{}",
                self.scheme,
                self.get_host(),
                self.get_full_path()
            ),
        }
    }

    /// Returns the parsed `Cookie` header.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cached_cookies.get_or_init(|| {
            self.header("cookie")
                .map_or_else(HashMap::new, cookies::parse_cookie_header)
        })
    }

    /// Returns a cookie value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    /// Records the matched route name and captured path parameters.
    pub fn set_resolved(&mut self, url_name: Option<String>, kwargs: HashMap<String, String>) {
        self.url_name = url_name;
        self.kwargs = kwargs;
    }

    /// Returns the name of the matched route.
    pub fn url_name(&self) -> Option<&str> {
        self.url_name.as_deref()
    }

    /// Returns a captured path parameter.
    pub fn kwarg(&self, name: &str) -> Option<&str> {
        self.kwargs.get(name).map(String::as_str)
    }

    /// Parses a captured path parameter, failing with 404 when it is
    /// missing or malformed.
    pub fn kwarg_as<T: FromStr>(&self, name: &str) -> BookshelfResult<T> {
        self.kwarg(name)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| BookshelfError::NotFound(format!("invalid path parameter '{name}'")))
    }

    /// Returns typed per-request data attached by middleware.
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns mutable typed per-request data.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// Builder for [`HttpRequest`].
#[derive(Debug)]
pub struct HttpRequestBuilder {
    method: Method,
    path: String,
    query_string: String,
    headers: HeaderMap,
    body: Vec<u8>,
    scheme: String,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query_string: String::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            scheme: "http".to_string(),
        }
    }
}

impl HttpRequestBuilder {
    /// Sets the method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Sets the query string.
    #[must_use]
    pub fn query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    /// Adds a header; invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets a form-encoded body and its content type.
    #[must_use]
    pub fn form(self, form: &QueryDict) -> Self {
        self.header("content-type", "application/x-www-form-urlencoded")
            .body(form.urlencode().into_bytes())
    }

    /// Sets a JSON body and its content type.
    #[must_use]
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string().into_bytes())
    }

    /// Sets the raw body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Sets the scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Builds the request.
    pub fn build(self) -> HttpRequest {
        HttpRequest::assemble(
            self.method,
            self.path,
            self.query_string,
            self.headers,
            self.body,
            self.scheme,
        )
    }
}
