//! Authentication: checking credentials and resolving request users.
//!
//! Three paths lead to an [`AuthenticatedUser`]:
//!
//! - [`authenticate`] checks a username and password against a list of
//!   [`AuthBackend`]s ([`ModelBackend`] in practice).
//! - [`user_from_token`] resolves an `Authorization: Token <key>` header.
//! - [`user_from_session`] resolves a session cookie created by [`login`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use bookshelf_core::BookshelfError;

use crate::hashers;
use crate::store::AuthStore;
use crate::tokens;
use crate::user::{AuthMethod, AuthenticatedUser, User};

/// A username and password.
#[derive(Clone)]
pub struct Credentials {
    /// The username.
    pub username: String,
    /// The raw password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A source that can verify credentials.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Returns the user if the credentials are valid, `Ok(None)` if they are
    /// not, and `Err` only on backend failure.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<User>, BookshelfError>;
}

/// Checks credentials against the users in an [`AuthStore`].
pub struct ModelBackend {
    store: Arc<dyn AuthStore>,
}

impl ModelBackend {
    /// Creates a backend over `store`.
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthBackend for ModelBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<User>, BookshelfError> {
        let Some(user) = self.store.get_user_by_username(&credentials.username).await? else {
            // Hash anyway so unknown usernames take as long as wrong passwords.
            let _ = hashers::make_password(&credentials.password).await?;
            return Ok(None);
        };
        if !user.check_password(&credentials.password).await? {
            return Ok(None);
        }
        if !user.is_active {
            tracing::info!(username = %user.username, "rejected login for inactive user");
            return Ok(None);
        }
        Ok(Some(user))
    }
}

/// Tries each backend in order and returns the first user accepted.
pub async fn authenticate(
    credentials: &Credentials,
    backends: &[Box<dyn AuthBackend>],
) -> Result<Option<User>, BookshelfError> {
    for backend in backends {
        if let Some(user) = backend.authenticate(credentials).await? {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

async fn resolve(
    store: &dyn AuthStore,
    user: Option<User>,
    method: AuthMethod,
) -> Result<Option<AuthenticatedUser>, BookshelfError> {
    let Some(user) = user.filter(|u| u.is_active) else {
        return Ok(None);
    };
    let groups = store.groups_for_user(user.id).await?;
    Ok(Some(AuthenticatedUser {
        user,
        groups,
        method,
    }))
}

/// Resolves an API token key to its active owner.
pub async fn user_from_token(
    store: &dyn AuthStore,
    key: &str,
) -> Result<Option<AuthenticatedUser>, BookshelfError> {
    let user = store.user_for_token(key).await?;
    resolve(store, user, AuthMethod::Token).await
}

/// Resolves a session key to its active, unexpired owner.
pub async fn user_from_session(
    store: &dyn AuthStore,
    secret: &str,
    session_key: &str,
) -> Result<Option<AuthenticatedUser>, BookshelfError> {
    let digest = tokens::session_digest(secret, session_key);
    let user = store.user_for_session(&digest).await?;
    resolve(store, user, AuthMethod::Session(session_key.to_string())).await
}

/// Starts a session for `user` lasting `max_age_secs` and returns the
/// session key to send in the cookie.
pub async fn login(
    store: &dyn AuthStore,
    secret: &str,
    user: &User,
    max_age_secs: u64,
) -> Result<String, BookshelfError> {
    let key = tokens::generate_session_key();
    let max_age = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
    let expires_at = Utc::now() + chrono::Duration::seconds(max_age.min(10 * 365 * 86_400));
    store
        .create_session(&tokens::session_digest(secret, &key), user.id, expires_at)
        .await?;
    store.touch_last_login(user.id).await?;
    tracing::info!(username = %user.username, user_id = user.id, "user logged in");
    Ok(key)
}

/// Ends the session identified by `session_key`.
pub async fn logout(
    store: &dyn AuthStore,
    secret: &str,
    session_key: &str,
) -> Result<(), BookshelfError> {
    store
        .delete_session(&tokens::session_digest(secret, session_key))
        .await
}
