//! Views.
//!
//! A view is an async function taking the shared [`AppState`] and the
//! request and returning `BookshelfResult<HttpResponse>`. [`view`] and
//! [`api_view`] adapt one into a [`RouteHandler`], turning errors into an
//! HTML or JSON error response.

pub mod accounts;
pub mod api;
pub mod books;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tera::Context;

use bookshelf_auth::Permission;
use bookshelf_core::{BookshelfError, BookshelfResult};
use bookshelf_forms::BaseForm;
use bookshelf_http::{BoxFuture, HttpRequest, HttpResponse, JsonResponse, RouteHandler};

use crate::middleware::auth::current_user;
use crate::middleware::csrf::get_token;
use crate::state::AppState;
use crate::urls::static_urls;

/// The result every view returns.
pub type ViewResult = BookshelfResult<HttpResponse>;

fn log_failure(path: &str, err: &BookshelfError) {
    if err.is_client_error() {
        tracing::info!(path = %path, error = %err, "request failed");
    } else {
        tracing::error!(path = %path, error = %err, "view failed");
    }
}

fn adapt<F, Fut>(
    state: &AppState,
    f: F,
    on_error: fn(&BookshelfError) -> HttpResponse,
) -> RouteHandler
where
    F: Fn(AppState, HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ViewResult> + Send + 'static,
{
    let state = state.clone();
    let f = Arc::new(f);
    Arc::new(move |request: HttpRequest| -> BoxFuture {
        let state = state.clone();
        let f = Arc::clone(&f);
        Box::pin(async move {
            let path = request.path().to_string();
            match f(state, request).await {
                Ok(response) => response,
                Err(err) => {
                    log_failure(&path, &err);
                    on_error(&err)
                }
            }
        })
    })
}

/// Adapts an HTML view; errors become HTML error pages.
pub fn view<F, Fut>(state: &AppState, f: F) -> RouteHandler
where
    F: Fn(AppState, HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ViewResult> + Send + 'static,
{
    adapt(state, f, HttpResponse::from_error)
}

/// Adapts an API view; errors become `{"detail": ...}` or field maps.
pub fn api_view<F, Fut>(state: &AppState, f: F) -> RouteHandler
where
    F: Fn(AppState, HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ViewResult> + Send + 'static,
{
    adapt(state, f, JsonResponse::from_error)
}

#[derive(Debug, Serialize)]
struct Perms {
    can_view: bool,
    can_create: bool,
    can_edit: bool,
    can_delete: bool,
}

/// The context every page gets: the user, their book permissions, the
/// CSRF token and the route map.
pub fn base_context(request: &HttpRequest) -> Context {
    let user = current_user(request);
    let allowed = |perm| user.is_some_and(|u| u.has_perm(perm));
    let mut context = Context::new();
    context.insert("user", &user.map(|u| &u.user));
    context.insert(
        "perms",
        &Perms {
            can_view: allowed(Permission::CanView),
            can_create: allowed(Permission::CanCreate),
            can_edit: allowed(Permission::CanEdit),
            can_delete: allowed(Permission::CanDelete),
        },
    );
    context.insert("csrf_token", &get_token(request));
    context.insert("urls", &static_urls());
    context
}

/// Adds a form's fields and non-field errors to `context`.
pub fn insert_form(context: &mut Context, form: &BaseForm) {
    context.insert("fields", &form.bound_fields());
    context.insert("non_field_errors", form.non_field_errors());
}

/// Renders `template` as a 200 HTML response.
pub fn render(state: &AppState, template: &str, context: &Context) -> ViewResult {
    Ok(HttpResponse::ok(state.templates.render(template, context)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_auth::{AuthMethod, AuthenticatedUser, DefaultGroup, User};
    use bookshelf_core::Settings;
    use bookshelf_db::SqliteStore;
    use http::StatusCode;

    fn state() -> AppState {
        AppState::new(Settings::development(), SqliteStore::memory().unwrap()).unwrap()
    }

    #[test]
    fn test_base_context_anonymous() {
        let context = base_context(&HttpRequest::builder().build()).into_json();
        assert!(context["user"].is_null());
        assert_eq!(context["perms"]["can_view"], false);
        assert_eq!(context["urls"]["login"], "/accounts/login/");
    }

    #[test]
    fn test_base_context_editor() {
        let mut request = HttpRequest::builder().build();
        request.extensions_mut().insert(AuthenticatedUser {
            user: User::new("ed"),
            groups: vec![DefaultGroup::Editors.to_group()],
            method: AuthMethod::Session("k".into()),
        });
        let context = base_context(&request).into_json();
        assert_eq!(context["user"]["username"], "ed");
        assert!(context["user"].get("password").is_none());
        assert_eq!(context["perms"]["can_edit"], true);
        assert_eq!(context["perms"]["can_delete"], false);
    }

    #[tokio::test]
    async fn test_errors_become_responses() {
        let html = view(&state(), |_state, _req| async {
            Err(BookshelfError::DoesNotExist("Book matching query does not exist.".into()))
        });
        let response = html(HttpRequest::builder().build()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.content_type().starts_with("text/html"));

        let json = api_view(&state(), |_state, _req| async {
            Err(BookshelfError::DatabaseError("disk I/O error".into()))
        });
        let response = json(HttpRequest::builder().build()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.text().contains("disk"));
    }
}
