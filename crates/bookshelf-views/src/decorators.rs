//! View decorators.
//!
//! Each decorator takes a [`RouteHandler`] and returns a new one that runs
//! a check before delegating. Checks that fail answer directly: 405 for a
//! method the view does not accept, a redirect to the login page for
//! anonymous users of a personal page, 403 for a missing permission on
//! HTML pages, 401 or 403 as JSON on the API.

use std::sync::Arc;

use http::{Method, StatusCode};

use bookshelf_auth::Permission;
use bookshelf_http::{
    BoxFuture, HttpRequest, HttpResponse, HttpResponseRedirect, JsonResponse, RouteHandler,
};

use crate::middleware::auth::{current_user, AuthFailure};

/// Rejects methods not in `methods` with 405 and an `Allow` header.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bookshelf_http::{BoxFuture, HttpRequest, HttpResponse};
/// use bookshelf_views::decorators::require_http_methods;
///
/// let view = Arc::new(|_req: HttpRequest| -> BoxFuture {
///     Box::pin(async { HttpResponse::ok("form") })
/// });
/// let view = require_http_methods(&[http::Method::GET, http::Method::POST], view);
/// ```
pub fn require_http_methods(methods: &[Method], view: RouteHandler) -> RouteHandler {
    let allowed: Arc<[Method]> = methods.into();
    Arc::new(move |request: HttpRequest| -> BoxFuture {
        let allowed = Arc::clone(&allowed);
        let view = Arc::clone(&view);
        Box::pin(async move {
            if allowed.contains(request.method()) {
                view(request).await
            } else {
                tracing::info!(method = %request.method(), path = %request.path(), "method not allowed");
                let names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                HttpResponse::not_allowed(&names)
            }
        })
    })
}

/// Lets only users holding `perm` through; everyone else, anonymous users
/// included, gets 403.
pub fn permission_required(perm: Permission, view: RouteHandler) -> RouteHandler {
    Arc::new(move |request: HttpRequest| -> BoxFuture {
        let view = Arc::clone(&view);
        Box::pin(async move {
            if current_user(&request).is_some_and(|u| u.has_perm(perm)) {
                return view(request).await;
            }
            tracing::warn!(
                user = %current_user(&request).map_or("<anonymous>", |u| u.user.username.as_str()),
                permission = %perm.full_codename(),
                path = %request.path(),
                "permission denied"
            );
            HttpResponse::forbidden("<h1>403 Forbidden</h1>")
        })
    })
}

/// Sends anonymous users to `login_url` with the requested path as
/// `next`.
pub fn login_required(login_url: &str, view: RouteHandler) -> RouteHandler {
    let login_url: Arc<str> = login_url.into();
    Arc::new(move |request: HttpRequest| -> BoxFuture {
        let view = Arc::clone(&view);
        let login_url = Arc::clone(&login_url);
        Box::pin(async move {
            if current_user(&request).is_some() {
                return view(request).await;
            }
            let next: String =
                url::form_urlencoded::byte_serialize(request.get_full_path().as_bytes()).collect();
            HttpResponseRedirect::new(&format!("{login_url}?next={next}"))
        })
    })
}

/// The 401 answer for API requests without valid credentials.
pub fn api_unauthorized(detail: &str) -> HttpResponse {
    let mut response = JsonResponse::with_status(
        StatusCode::UNAUTHORIZED,
        &serde_json::json!({ "detail": detail }),
    );
    response.set_header(http::header::WWW_AUTHENTICATE, "Token");
    response
}

/// Requires an authenticated user on an API view; answers 401 with
/// `WWW-Authenticate: Token` otherwise.
pub fn api_login_required(view: RouteHandler) -> RouteHandler {
    Arc::new(move |request: HttpRequest| -> BoxFuture {
        let view = Arc::clone(&view);
        Box::pin(async move {
            if current_user(&request).is_some() {
                return view(request).await;
            }
            let detail = request.extensions().get::<AuthFailure>().map_or(
                "Authentication credentials were not provided.",
                |failure| failure.0.as_str(),
            );
            api_unauthorized(detail)
        })
    })
}

/// Requires `perm` for the listed methods of an API view. Other methods
/// pass through; run this inside [`api_login_required`].
pub fn api_permissions(rules: &[(Method, Permission)], view: RouteHandler) -> RouteHandler {
    let rules: Arc<[(Method, Permission)]> = rules.into();
    Arc::new(move |request: HttpRequest| -> BoxFuture {
        let rules = Arc::clone(&rules);
        let view = Arc::clone(&view);
        Box::pin(async move {
            let required = rules
                .iter()
                .find(|(method, _)| method == request.method())
                .map(|(_, perm)| *perm);
            let Some(perm) = required else {
                return view(request).await;
            };
            if current_user(&request).is_some_and(|u| u.has_perm(perm)) {
                return view(request).await;
            }
            tracing::warn!(
                permission = %perm.full_codename(),
                method = %request.method(),
                path = %request.path(),
                "API permission denied"
            );
            JsonResponse::with_status(
                StatusCode::FORBIDDEN,
                &serde_json::json!({
                    "detail": "You do not have permission to perform this action."
                }),
            )
        })
    })
}
