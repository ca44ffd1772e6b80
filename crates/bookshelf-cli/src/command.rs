//! The management command framework.
//!
//! [`ManagementCommand`] defines one subcommand of the `bookshelf` binary
//! and [`CommandRegistry`] collects them into a clap CLI and dispatches the
//! parsed arguments.
//!
//! ## Defining a command
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use bookshelf_cli::command::ManagementCommand;
//! use bookshelf_core::{BookshelfError, Settings};
//!
//! struct PingCommand;
//!
//! #[async_trait]
//! impl ManagementCommand for PingCommand {
//!     fn name(&self) -> &str { "ping" }
//!     fn help(&self) -> &str { "Print pong" }
//!
//!     async fn handle(
//!         &self,
//!         _matches: &clap::ArgMatches,
//!         _settings: &Settings,
//!     ) -> Result<(), BookshelfError> {
//!         println!("pong");
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use bookshelf_core::{BookshelfError, Settings};

/// A subcommand of the `bookshelf` binary.
#[async_trait]
pub trait ManagementCommand: Send + Sync {
    /// The name used on the command line.
    fn name(&self) -> &str;

    /// One-line help text.
    fn help(&self) -> &str;

    /// Adds the command's arguments. The default adds none.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// Runs the command.
    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError>;
}

/// The registered management commands, keyed by name.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn ManagementCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers `command`, replacing any command with the same name.
    pub fn register(&mut self, command: Box<dyn ManagementCommand>) {
        let name = command.name().to_string();
        self.commands.insert(name, command);
    }

    /// Looks a command up by name.
    pub fn get(&self, name: &str) -> Option<&dyn ManagementCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Returns the command names, sorted.
    pub fn list_commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Builds the top-level clap command with one subcommand per entry.
    ///
    /// The global `--settings` option names a TOML settings file.
    pub fn build_cli(&self) -> clap::Command {
        let mut app = clap::Command::new("bookshelf")
            .about("bookshelf management utility")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                clap::Arg::new("settings")
                    .long("settings")
                    .global(true)
                    .value_name("PATH")
                    .help("TOML settings file (BOOKSHELF_* variables still apply)"),
            );

        let mut entries: Vec<_> = self.commands.iter().collect();
        entries.sort_by_key(|(name, _)| (*name).clone());

        for (name, cmd) in entries {
            // clap wants 'static names; commands are registered once at startup.
            let static_name: &'static str = Box::leak(name.clone().into_boxed_str());
            let subcmd = clap::Command::new(static_name).about(cmd.help().to_string());
            app = app.subcommand(cmd.add_arguments(subcmd));
        }

        app
    }

    /// Dispatches the parsed subcommand.
    pub async fn execute(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        let (name, sub_matches) = matches.subcommand().ok_or_else(|| {
            BookshelfError::ConfigurationError("No subcommand specified".to_string())
        })?;

        let cmd = self.get(name).ok_or_else(|| {
            BookshelfError::ConfigurationError(format!("Unknown command: {name}"))
        })?;

        tracing::debug!(command = name, "running management command");
        cmd.handle(sub_matches, settings).await
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.list_commands())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCommand {
        cmd_name: String,
    }

    impl TestCommand {
        fn new(name: &str) -> Self {
            Self {
                cmd_name: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl ManagementCommand for TestCommand {
        fn name(&self) -> &str {
            &self.cmd_name
        }

        fn help(&self) -> &'static str {
            "A test command"
        }

        fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
            cmd.arg(
                clap::Arg::new("verbose")
                    .long("verbose")
                    .action(clap::ArgAction::SetTrue),
            )
        }

        async fn handle(
            &self,
            _matches: &clap::ArgMatches,
            _settings: &Settings,
        ) -> Result<(), BookshelfError> {
            Ok(())
        }
    }

    struct FailingCommand;

    #[async_trait]
    impl ManagementCommand for FailingCommand {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn help(&self) -> &'static str {
            "Always fails"
        }

        async fn handle(
            &self,
            _matches: &clap::ArgMatches,
            _settings: &Settings,
        ) -> Result<(), BookshelfError> {
            Err(BookshelfError::ConfigurationError("deliberate failure".to_string()))
        }
    }

    // ── Registry ────────────────────────────────────────────────────────

    #[test]
    fn test_registry_new_is_empty() {
        let registry = CommandRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_get_and_replace() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        registry.register(Box::new(TestCommand::new("test")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("test").unwrap().help(), "A test command");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_list_commands_sorted() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("zebra")));
        registry.register(Box::new(TestCommand::new("alpha")));
        registry.register(Box::new(TestCommand::new("middle")));
        assert_eq!(registry.list_commands(), vec!["alpha", "middle", "zebra"]);
    }

    // ── CLI ─────────────────────────────────────────────────────────────

    #[test]
    fn test_build_cli_with_arguments() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));

        let matches = registry
            .build_cli()
            .try_get_matches_from(["bookshelf", "test", "--verbose", "--settings", "x.toml"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("settings").unwrap(), "x.toml");
        let (name, sub_matches) = matches.subcommand().unwrap();
        assert_eq!(name, "test");
        assert!(sub_matches.get_flag("verbose"));
    }

    #[test]
    fn test_build_cli_requires_subcommand() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        assert!(registry.build_cli().try_get_matches_from(["bookshelf"]).is_err());
        assert!(registry
            .build_cli()
            .try_get_matches_from(["bookshelf", "nope"])
            .is_err());
    }

    #[tokio::test]
    async fn test_execute() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        registry.register(Box::new(FailingCommand));
        let settings = Settings::default();

        let ok = registry
            .build_cli()
            .try_get_matches_from(["bookshelf", "test"])
            .unwrap();
        assert!(registry.execute(&ok, &settings).await.is_ok());

        let failing = registry
            .build_cli()
            .try_get_matches_from(["bookshelf", "fail"])
            .unwrap();
        assert!(registry.execute(&failing, &settings).await.is_err());
    }
}
