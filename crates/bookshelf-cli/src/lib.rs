//! # bookshelf-cli
//!
//! The management commands behind the `bookshelf` binary.
//!
//! - [`command`] - the [`ManagementCommand`] trait and [`CommandRegistry`]
//! - [`commands`] - `migrate`, `setup_groups`, `createsuperuser`, `adduser`,
//!   `check`, `proxyconf` and `runserver`
//!
//! ```rust
//! use bookshelf_cli::command::CommandRegistry;
//! use bookshelf_cli::commands::register_builtin_commands;
//!
//! let mut registry = CommandRegistry::new();
//! register_builtin_commands(&mut registry);
//! assert!(registry.list_commands().contains(&"setup_groups"));
//! ```

// Command handlers keep async signatures even when they do no I/O.
#![allow(clippy::unused_async)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod commands;

pub use command::{CommandRegistry, ManagementCommand};
pub use commands::register_builtin_commands;

/// Loads settings from `path` (or defaults) plus `BOOKSHELF_*` overrides.
pub fn load_settings(path: Option<&str>) -> Result<bookshelf_core::Settings, bookshelf_core::BookshelfError> {
    use bookshelf_core::settings_loader::{from_env, from_toml_file_with_env};
    match path {
        Some(path) => from_toml_file_with_env(path),
        None => from_env(),
    }
}
