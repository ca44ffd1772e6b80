//! Request authentication.
//!
//! An `Authorization: Token <key>` header takes precedence over the
//! session cookie. The resolved [`AuthenticatedUser`] is stored in the
//! request extensions; anonymous requests carry none. A token header that
//! is malformed or unknown leaves the request anonymous and records an
//! [`AuthFailure`] so API views can answer with the reason.

use std::sync::Arc;

use async_trait::async_trait;

use bookshelf_auth::backends::{user_from_session, user_from_token};
use bookshelf_auth::tokens::{parse_token_header, TOKEN_KEYWORD};
use bookshelf_auth::{AuthStore, AuthenticatedUser};
use bookshelf_core::Settings;
use bookshelf_http::{HttpRequest, HttpResponse};

use super::Middleware;

/// Why a supplied credential was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure(pub String);

/// Resolves the acting user from a token header or session cookie.
pub struct AuthenticationMiddleware {
    store: Arc<dyn AuthStore>,
    secret_key: String,
    session_cookie_name: String,
}

impl std::fmt::Debug for AuthenticationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationMiddleware")
            .field("session_cookie_name", &self.session_cookie_name)
            .finish_non_exhaustive()
    }
}

impl AuthenticationMiddleware {
    /// Creates the middleware over `store`.
    pub fn new(store: Arc<dyn AuthStore>, settings: &Settings) -> Self {
        Self {
            store,
            secret_key: settings.secret_key.clone(),
            session_cookie_name: settings.session_cookie_name.clone(),
        }
    }

    async fn from_header(&self, header: &str) -> Result<AuthenticatedUser, AuthFailure> {
        let Some(key) = parse_token_header(header) else {
            let reason = if header.split_whitespace().count() < 2 {
                "Invalid token header. No credentials provided."
            } else {
                "Invalid token header. Token string should not contain spaces."
            };
            return Err(AuthFailure(reason.into()));
        };
        match user_from_token(self.store.as_ref(), key).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(AuthFailure("Invalid token.".into())),
            Err(e) => {
                tracing::error!(error = %e, "token lookup failed");
                Err(AuthFailure("Invalid token.".into()))
            }
        }
    }
}

/// Returns the authenticated user of a request, if any.
pub fn current_user(request: &HttpRequest) -> Option<&AuthenticatedUser> {
    request.extensions().get::<AuthenticatedUser>()
}

#[async_trait]
impl Middleware for AuthenticationMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        let header = request
            .header("authorization")
            .filter(|h| {
                h.split_whitespace()
                    .next()
                    .is_some_and(|kw| kw.eq_ignore_ascii_case(TOKEN_KEYWORD))
            })
            .map(str::to_string);

        if let Some(header) = header {
            match self.from_header(&header).await {
                Ok(user) => {
                    tracing::debug!(username = %user.user.username, "token authenticated");
                    request.extensions_mut().insert(user);
                }
                Err(failure) => {
                    tracing::info!(reason = %failure.0, "token authentication failed");
                    request.extensions_mut().insert(failure);
                }
            }
            return None;
        }

        let session_key = request.cookie(&self.session_cookie_name).map(str::to_string);
        if let Some(key) = session_key {
            match user_from_session(self.store.as_ref(), &self.secret_key, &key).await {
                Ok(Some(user)) => {
                    request.extensions_mut().insert(user);
                }
                Ok(None) => tracing::debug!("stale session cookie ignored"),
                Err(e) => {
                    tracing::error!(error = %e, "session lookup failed");
                    return Some(HttpResponse::from_error(&e));
                }
            }
        }
        None
    }
}
