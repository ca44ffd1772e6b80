//! The route table.
//!
//! Routes are declared once in [`ROUTES`]; [`url_patterns`] attaches each
//! name to its view and access rules, and [`reverse`] builds paths from the
//! same table so views never hard-code URLs.

use std::collections::BTreeMap;

use http::Method;

use bookshelf_auth::Permission;
use bookshelf_core::{BookshelfError, BookshelfResult};
use bookshelf_http::urls::{path, reverse_route, URLResolver};
use bookshelf_http::RouteHandler;

use crate::decorators::{
    api_login_required, api_permissions, login_required, permission_required,
    require_http_methods,
};
use crate::state::AppState;
use crate::views::{accounts, api, books, api_view, view};

/// `(route, name)` pairs in resolution order.
pub const ROUTES: &[(&str, &str)] = &[
    ("", "home"),
    ("bookshelf/", "book_list"),
    ("bookshelf/create/", "book_create"),
    ("bookshelf/<int:pk>/edit/", "book_edit"),
    ("bookshelf/<int:pk>/delete/", "book_delete"),
    ("bookshelf/form-example/", "form_example"),
    ("accounts/register/", "register"),
    ("accounts/login/", "login"),
    ("accounts/logout/", "logout"),
    ("accounts/profile/", "profile"),
    ("api/api-token-auth/", "api_token_auth"),
    ("api/books/", "api_book_list"),
    ("api/books_all/", "api_book_collection"),
    ("api/books_all/<int:pk>/", "api_book_detail"),
];

/// Builds the path of the route called `name`.
///
/// ```
/// use bookshelf_views::urls::reverse;
///
/// assert_eq!(reverse("book_edit", &[("pk", "3")]).unwrap(), "/bookshelf/3/edit/");
/// assert_eq!(reverse("login", &[]).unwrap(), "/accounts/login/");
/// ```
pub fn reverse(name: &str, kwargs: &[(&str, &str)]) -> BookshelfResult<String> {
    let (route, _) = ROUTES
        .iter()
        .find(|(_, n)| *n == name)
        .ok_or_else(|| BookshelfError::NotFound(format!("no route named '{name}'")))?;
    reverse_route(route, kwargs)
}

/// Paths of every route without parameters, keyed by name.
pub fn static_urls() -> BTreeMap<&'static str, String> {
    ROUTES
        .iter()
        .filter_map(|(route, name)| reverse_route(route, &[]).ok().map(|url| (*name, url)))
        .collect()
}

fn html(methods: &[Method], perm: Option<Permission>, handler: RouteHandler) -> RouteHandler {
    let handler = match perm {
        Some(perm) => permission_required(perm, handler),
        None => handler,
    };
    require_http_methods(methods, handler)
}

fn api_resource(methods: &[Method], handler: RouteHandler) -> RouteHandler {
    let rules = [
        (Method::POST, Permission::CanCreate),
        (Method::PUT, Permission::CanEdit),
        (Method::PATCH, Permission::CanEdit),
        (Method::DELETE, Permission::CanDelete),
    ];
    require_http_methods(methods, api_login_required(api_permissions(&rules, handler)))
}

fn handler_for(name: &str, state: &AppState) -> BookshelfResult<RouteHandler> {
    use Method as M;
    let handler = match name {
        "home" => html(&[M::GET], None, view(state, books::home)),
        "book_list" => html(&[M::GET], Some(Permission::CanView), view(state, books::book_list)),
        "book_create" => html(
            &[M::GET, M::POST],
            Some(Permission::CanCreate),
            view(state, books::book_create),
        ),
        "book_edit" => html(
            &[M::GET, M::POST],
            Some(Permission::CanEdit),
            view(state, books::book_edit),
        ),
        "book_delete" => html(
            &[M::GET, M::POST],
            Some(Permission::CanDelete),
            view(state, books::book_delete),
        ),
        "form_example" => html(&[M::GET, M::POST], None, view(state, books::form_example)),
        "register" => html(&[M::GET, M::POST], None, view(state, accounts::register)),
        "login" => html(&[M::GET, M::POST], None, view(state, accounts::login)),
        "logout" => html(&[M::POST], None, view(state, accounts::logout)),
        "profile" => require_http_methods(
            &[M::GET, M::POST],
            login_required(&state.settings.login_url, view(state, accounts::profile)),
        ),
        "api_token_auth" => require_http_methods(&[M::POST], api_view(state, api::obtain_token)),
        "api_book_list" => api_resource(&[M::GET], api_view(state, api::book_list)),
        "api_book_collection" => {
            api_resource(&[M::GET, M::POST], api_view(state, api::book_collection))
        }
        "api_book_detail" => api_resource(
            &[M::GET, M::PUT, M::PATCH, M::DELETE],
            api_view(state, api::book_detail),
        ),
        other => {
            return Err(BookshelfError::ImproperlyConfigured(format!(
                "no view registered for route '{other}'"
            )))
        }
    };
    Ok(handler)
}

/// Builds the resolver for every route in [`ROUTES`].
pub fn url_patterns(state: &AppState) -> BookshelfResult<URLResolver> {
    let patterns = ROUTES
        .iter()
        .map(|(route, name)| path(route, handler_for(name, state)?, name))
        .collect::<BookshelfResult<Vec<_>>>()?;
    Ok(URLResolver::new(patterns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_core::Settings;
    use bookshelf_db::SqliteStore;

    #[test]
    fn test_reverse() {
        assert_eq!(reverse("home", &[]).unwrap(), "/");
        assert_eq!(
            reverse("api_book_detail", &[("pk", "12")]).unwrap(),
            "/api/books_all/12/"
        );
        assert!(reverse("book_edit", &[]).is_err());
        assert!(reverse("book_edit", &[("pk", "x")]).is_err());
        assert!(reverse("nope", &[]).is_err());
    }

    #[test]
    fn test_static_urls_skip_parameterised_routes() {
        let urls = static_urls();
        assert_eq!(urls["book_list"], "/bookshelf/");
        assert_eq!(urls["logout"], "/accounts/logout/");
        assert_eq!(urls["profile"], "/accounts/profile/");
        assert!(!urls.contains_key("book_edit"));
    }

    #[test]
    fn test_every_route_has_a_view() {
        let state = AppState::new(Settings::development(), SqliteStore::memory().unwrap()).unwrap();
        let resolver = url_patterns(&state).unwrap();
        assert_eq!(resolver.patterns().len(), ROUTES.len());

        let matched = resolver.resolve("/bookshelf/7/delete/").unwrap();
        assert_eq!(matched.url_name.as_deref(), Some("book_delete"));
        assert_eq!(matched.kwargs["pk"], "7");
        assert!(resolver.resolve("/bookshelf/abc/delete/").is_err());
    }
}
