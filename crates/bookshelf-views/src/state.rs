//! State shared by every view.

use std::sync::Arc;

use bookshelf_auth::AuthStore;
use bookshelf_core::{BookshelfError, Settings};
use bookshelf_db::SqliteStore;

use crate::templates::Templates;

/// Settings, the database and the templates, cloned into each handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application settings.
    pub settings: Arc<Settings>,
    /// The database.
    pub store: SqliteStore,
    /// Compiled templates.
    pub templates: Arc<Templates>,
}

impl AppState {
    /// Bundles `settings` and `store` with freshly parsed templates.
    pub fn new(settings: Settings, store: SqliteStore) -> Result<Self, BookshelfError> {
        Ok(Self {
            settings: Arc::new(settings),
            store,
            templates: Arc::new(Templates::new()?),
        })
    }

    /// The store as an [`AuthStore`] trait object.
    pub fn auth_store(&self) -> Arc<dyn AuthStore> {
        Arc::new(self.store.clone())
    }
}
