//! Named URL routing.
//!
//! Routes are written as `bookshelf/<int:pk>/edit/` (no leading slash).
//! Each `<converter:name>` placeholder becomes a regex capture; `int`
//! matches digits and `str` matches a non-empty segment without `/`. A
//! [`URLResolver`] resolves incoming paths to handlers and reverses route
//! names back to paths.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;

use bookshelf_core::{BookshelfError, BookshelfResult};

use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// The future returned by every handler.
pub type BoxFuture = Pin<Box<dyn Future<Output = HttpResponse> + Send>>;

/// A shareable async request handler.
pub type RouteHandler = Arc<dyn Fn(HttpRequest) -> BoxFuture + Send + Sync>;

/// Path parameter converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// One or more ASCII digits.
    Int,
    /// Any non-empty run of characters other than `/`.
    Str,
}

impl Converter {
    fn from_name(name: &str) -> BookshelfResult<Self> {
        match name {
            "int" => Ok(Self::Int),
            "str" => Ok(Self::Str),
            other => Err(BookshelfError::ImproperlyConfigured(format!(
                "unknown path converter '{other}'"
            ))),
        }
    }

    const fn regex(self) -> &'static str {
        match self {
            Self::Int => "[0-9]+",
            Self::Str => "[^/]+",
        }
    }

    fn accepts(self, value: &str) -> bool {
        match self {
            Self::Int => !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()),
            Self::Str => !value.is_empty() && !value.contains('/'),
        }
    }
}

/// One segment of a parsed route.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String, Converter),
}

/// A route bound to a handler.
pub struct URLPattern {
    route: String,
    name: Option<String>,
    regex: Regex,
    segments: Vec<Segment>,
    handler: RouteHandler,
}

impl fmt::Debug for URLPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("URLPattern")
            .field("route", &self.route)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl URLPattern {
    /// Returns the route string.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Returns the route name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let mut kwargs = HashMap::new();
        for segment in &self.segments {
            if let Segment::Param(name, _) = segment {
                let value = captures.name(name)?.as_str();
                kwargs.insert(name.clone(), value.to_string());
            }
        }
        Some(kwargs)
    }
}

/// Creates a named route.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bookshelf_http::urls::{path, BoxFuture, URLResolver};
/// use bookshelf_http::{HttpRequest, HttpResponse};
///
/// let handler = Arc::new(|_req: HttpRequest| -> BoxFuture {
///     Box::pin(async { HttpResponse::ok("edit") })
/// });
/// let resolver = URLResolver::new(vec![
///     path("bookshelf/<int:pk>/edit/", handler, "book_edit").unwrap(),
/// ]);
///
/// let resolved = resolver.resolve("/bookshelf/7/edit/").unwrap();
/// assert_eq!(resolved.kwargs["pk"], "7");
/// assert_eq!(
///     resolver.reverse("book_edit", &[("pk", "7")]).unwrap(),
///     "/bookshelf/7/edit/"
/// );
/// ```
pub fn path(route: &str, handler: RouteHandler, name: &str) -> BookshelfResult<URLPattern> {
    let segments = parse_route(route)?;
    let mut pattern = String::from("^");
    for segment in &segments {
        match segment {
            Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
            Segment::Param(param, converter) => {
                write!(pattern, "(?P<{param}>{})", converter.regex()).ok();
            }
        }
    }
    pattern.push('$');
    let regex = Regex::new(&pattern).map_err(|e| {
        BookshelfError::ImproperlyConfigured(format!("invalid route '{route}': {e}"))
    })?;

    Ok(URLPattern {
        route: route.to_string(),
        name: (!name.is_empty()).then(|| name.to_string()),
        regex,
        segments,
        handler,
    })
}

fn parse_route(route: &str) -> BookshelfResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = route;
    while let Some(start) = rest.find('<') {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let end = rest[start..].find('>').ok_or_else(|| {
            BookshelfError::ImproperlyConfigured(format!("unclosed '<' in route '{route}'"))
        })? + start;
        let inner = &rest[start + 1..end];
        let (converter, name) = inner.split_once(':').unwrap_or(("str", inner));
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BookshelfError::ImproperlyConfigured(format!(
                "invalid parameter name '{name}' in route '{route}'"
            )));
        }
        segments.push(Segment::Param(
            name.to_string(),
            Converter::from_name(converter)?,
        ));
        rest = &rest[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

/// A resolved route.
#[derive(Clone)]
pub struct ResolverMatch {
    /// The handler to call.
    pub handler: RouteHandler,
    /// Captured path parameters.
    pub kwargs: HashMap<String, String>,
    /// The route name.
    pub url_name: Option<String>,
    /// The route string that matched.
    pub route: String,
}

impl fmt::Debug for ResolverMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverMatch")
            .field("kwargs", &self.kwargs)
            .field("url_name", &self.url_name)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

/// An ordered list of routes; the first match wins.
#[derive(Debug, Default)]
pub struct URLResolver {
    patterns: Vec<URLPattern>,
}

impl URLResolver {
    /// Creates a resolver over `patterns`.
    pub const fn new(patterns: Vec<URLPattern>) -> Self {
        Self { patterns }
    }

    /// Returns the registered patterns.
    pub fn patterns(&self) -> &[URLPattern] {
        &self.patterns
    }

    /// Resolves an absolute request path.
    pub fn resolve(&self, path: &str) -> BookshelfResult<ResolverMatch> {
        let relative = path.strip_prefix('/').unwrap_or(path);
        self.patterns
            .iter()
            .find_map(|pattern| {
                pattern.matches(relative).map(|kwargs| ResolverMatch {
                    handler: Arc::clone(&pattern.handler),
                    kwargs,
                    url_name: pattern.name.clone(),
                    route: pattern.route.clone(),
                })
            })
            .ok_or_else(|| BookshelfError::NotFound(format!("no route matches '{path}'")))
    }

    /// Builds the absolute path for route `name` with `kwargs` substituted.
    pub fn reverse(&self, name: &str, kwargs: &[(&str, &str)]) -> BookshelfResult<String> {
        let pattern = self
            .patterns
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .ok_or_else(|| {
                BookshelfError::NotFound(format!("no route named '{name}'"))
            })?;
        substitute(name, &pattern.segments, kwargs)
    }
}

/// Builds the absolute path for a route string with `kwargs` substituted.
///
/// ```
/// use bookshelf_http::urls::reverse_route;
///
/// assert_eq!(
///     reverse_route("bookshelf/<int:pk>/delete/", &[("pk", "4")]).unwrap(),
///     "/bookshelf/4/delete/"
/// );
/// ```
pub fn reverse_route(route: &str, kwargs: &[(&str, &str)]) -> BookshelfResult<String> {
    substitute(route, &parse_route(route)?, kwargs)
}

fn substitute(name: &str, segments: &[Segment], kwargs: &[(&str, &str)]) -> BookshelfResult<String> {
    let mut out = String::from("/");
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Param(param, converter) => {
                let value = kwargs
                    .iter()
                    .find(|(k, _)| k == param)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| {
                        BookshelfError::ImproperlyConfigured(format!(
                            "reverse('{name}') is missing '{param}'"
                        ))
                    })?;
                if !converter.accepts(value) {
                    return Err(BookshelfError::ImproperlyConfigured(format!(
                        "reverse('{name}'): '{value}' is not a valid {param}"
                    )));
                }
                out.push_str(value);
            }
        }
    }
    Ok(out)
}
