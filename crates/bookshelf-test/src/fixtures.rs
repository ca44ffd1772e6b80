//! Ready-made applications, users and books for end-to-end tests.

use bookshelf_auth::setup::setup_groups;
use bookshelf_auth::user::{prepare_user, NewUser};
use bookshelf_auth::{AuthStore, DefaultGroup, User};
use bookshelf_core::{BookshelfError, Settings};
use bookshelf_db::{Book, BookData, SqliteStore};
use bookshelf_views::BookshelfApp;

use crate::client::TestClient;

/// Password given to every fixture user.
pub const PASSWORD: &str = "correct horse battery";

/// Secret key used by the fixture settings.
pub const SECRET_KEY: &str = "test-secret-key-0123456789-abcdefghijklmnopqrstuvwxyz";

/// Production defaults (HTTPS redirect, HSTS, secure cookies) with a
/// fixed secret key.
pub fn hardened_settings() -> Settings {
    Settings {
        secret_key: SECRET_KEY.to_string(),
        ..Settings::default()
    }
}

/// Development settings: plain HTTP is served directly.
pub fn development_settings() -> Settings {
    Settings {
        secret_key: SECRET_KEY.to_string(),
        ..Settings::development()
    }
}

/// A migrated in-memory database with the default groups, plus the
/// settings the application is built with.
#[derive(Debug, Clone)]
pub struct TestApp {
    /// The shared store.
    pub store: SqliteStore,
    /// Settings for every client built from this app.
    pub settings: Settings,
}

impl TestApp {
    /// Migrates a fresh in-memory database and seeds the groups.
    pub async fn new(settings: Settings) -> Result<Self, BookshelfError> {
        let store = SqliteStore::memory()?;
        bookshelf_db::migrate(&store).await?;
        setup_groups(&store).await?;
        Ok(Self { store, settings })
    }

    /// Builds the router over this app's store.
    pub fn router(&self) -> Result<axum::Router, BookshelfError> {
        Ok(BookshelfApp::new(self.settings.clone(), self.store.clone())?.into_axum_router())
    }

    /// A fresh client with an empty cookie jar. Under hardened settings it
    /// sends requests as if through the TLS proxy.
    pub fn client(&self) -> Result<TestClient, BookshelfError> {
        let mut client = TestClient::new(self.router()?);
        client.set_secure(self.settings.secure_ssl_redirect);
        Ok(client)
    }

    /// Creates a user with [`PASSWORD`] in `groups`.
    pub async fn create_user(
        &self,
        username: &str,
        groups: &[DefaultGroup],
    ) -> Result<User, BookshelfError> {
        let mut user = prepare_user(NewUser::new(username, PASSWORD)).await?;
        user.groups = groups.iter().map(|g| g.name().to_string()).collect();
        self.store.insert_user(&user).await
    }

    /// Creates a user in `groups` and returns a client logged in as them.
    pub async fn login_as(
        &self,
        username: &str,
        groups: &[DefaultGroup],
    ) -> Result<TestClient, BookshelfError> {
        self.create_user(username, groups).await?;
        let mut client = self.client()?;
        login(&mut client, username, PASSWORD).await?;
        Ok(client)
    }

    /// Returns the API token for `user`, creating it if needed.
    pub async fn token_for(&self, user: &User) -> Result<String, BookshelfError> {
        self.store.get_or_create_token(user.id).await
    }

    /// Stores a book.
    pub async fn create_book(
        &self,
        title: &str,
        author: &str,
        publication_year: i32,
    ) -> Result<Book, BookshelfError> {
        self.store
            .create_book(&BookData {
                title: title.to_string(),
                author: author.to_string(),
                publication_year,
            })
            .await
    }
}

/// Fetches the login page for a CSRF cookie, then submits credentials.
pub async fn login(
    client: &mut TestClient,
    username: &str,
    password: &str,
) -> Result<(), BookshelfError> {
    client.get("/accounts/login/").await;
    let response = client
        .post_form("/accounts/login/", &[("username", username), ("password", password)])
        .await;
    if response.status_code() == 302 {
        Ok(())
    } else {
        Err(BookshelfError::PermissionDenied(format!(
            "login as '{username}' failed with status {}",
            response.status_code()
        )))
    }
}
