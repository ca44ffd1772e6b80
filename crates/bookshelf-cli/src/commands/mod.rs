//! Built-in management commands. Each implements
//! [`ManagementCommand`](crate::command::ManagementCommand).

mod accounts;
pub mod adduser;
pub mod check;
pub mod createsuperuser;
pub mod migrate;
pub mod proxyconf;
pub mod runserver;
pub mod setup_groups;

pub use adduser::AdduserCommand;
pub use check::CheckCommand;
pub use createsuperuser::CreatesuperuserCommand;
pub use migrate::MigrateCommand;
pub use proxyconf::ProxyconfCommand;
pub use runserver::RunserverCommand;
pub use setup_groups::SetupGroupsCommand;

use bookshelf_core::{BookshelfError, Settings};
use bookshelf_db::SqliteStore;

use crate::command::CommandRegistry;

/// Registers every built-in command.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(MigrateCommand));
    registry.register(Box::new(SetupGroupsCommand));
    registry.register(Box::new(CreatesuperuserCommand));
    registry.register(Box::new(AdduserCommand));
    registry.register(Box::new(CheckCommand));
    registry.register(Box::new(ProxyconfCommand));
    registry.register(Box::new(RunserverCommand));
}

/// Opens the configured database without migrating it.
pub(crate) fn open_store(settings: &Settings) -> Result<SqliteStore, BookshelfError> {
    if settings.database.engine != "sqlite3" {
        return Err(BookshelfError::ImproperlyConfigured(format!(
            "Unsupported database engine '{}'; only sqlite3 is available.",
            settings.database.engine
        )));
    }
    SqliteStore::open(&settings.database.name)
}

/// Opens the configured database and fails unless every migration has
/// been applied.
pub(crate) async fn open_migrated_store(settings: &Settings) -> Result<SqliteStore, BookshelfError> {
    let store = open_store(settings)?;
    let pending: Vec<&str> = bookshelf_db::migrations::show_migrations(&store)
        .await?
        .into_iter()
        .filter_map(|(name, applied)| (!applied).then_some(name))
        .collect();
    if !pending.is_empty() {
        return Err(BookshelfError::ConfigurationError(format!(
            "Unapplied migrations: {}. Run `bookshelf migrate` first.",
            pending.join(", ")
        )));
    }
    Ok(store)
}
