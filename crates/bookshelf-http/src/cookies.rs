//! Cookie parsing and `Set-Cookie` construction.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Only sent on same-site requests.
    Strict,
    /// Also sent on top-level navigations.
    Lax,
    /// Sent on all requests (requires `Secure`).
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            other => Err(format!("invalid SameSite value '{other}'")),
        }
    }
}

/// A cookie to set on a response.
///
/// # Examples
///
/// ```
/// use bookshelf_http::cookies::{Cookie, SameSite};
///
/// let cookie = Cookie::new("sessionid", "abc")
///     .max_age(3600)
///     .secure(true)
///     .httponly(true)
///     .samesite(SameSite::Lax);
/// assert_eq!(
///     cookie.to_set_cookie_header(),
///     "sessionid=abc; Max-Age=3600; Path=/; Secure; HttpOnly; SameSite=Lax"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Lifetime in seconds; `None` for a browser-session cookie.
    pub max_age: Option<u64>,
    /// Path scope.
    pub path: String,
    /// Only send over HTTPS.
    pub secure: bool,
    /// Hide from scripts.
    pub httponly: bool,
    /// `SameSite` attribute.
    pub samesite: Option<SameSite>,
}

impl Cookie {
    /// Creates a cookie scoped to `/` with no flags.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: "/".to_string(),
            secure: false,
            httponly: false,
            samesite: None,
        }
    }

    /// Creates a cookie that tells the browser to drop `name`.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }

    /// Sets the lifetime.
    #[must_use]
    pub const fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Sets the path scope.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets `Secure`.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets `HttpOnly`.
    #[must_use]
    pub const fn httponly(mut self, httponly: bool) -> Self {
        self.httponly = httponly;
        self
    }

    /// Sets `SameSite`.
    #[must_use]
    pub const fn samesite(mut self, samesite: SameSite) -> Self {
        self.samesite = Some(samesite);
        self
    }

    /// Renders the `Set-Cookie` header value.
    pub fn to_set_cookie_header(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={max_age}"));
        }
        parts.push(format!("Path={}", self.path));
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.httponly {
            parts.push("HttpOnly".to_string());
        }
        if let Some(samesite) = self.samesite {
            parts.push(format!("SameSite={samesite}"));
        }
        parts.join("; ")
    }
}

/// Parses a `Cookie` request header (`a=1; b=2`) into a map.
///
/// Malformed segments are skipped; for repeated names the first wins.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for segment in header.split(';') {
        if let Some((name, value)) = segment.split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                cookies
                    .entry(name.to_string())
                    .or_insert_with(|| value.trim().trim_matches('"').to_string());
            }
        }
    }
    cookies
}
