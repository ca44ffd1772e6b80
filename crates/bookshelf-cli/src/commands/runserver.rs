//! The `runserver` management command.

use async_trait::async_trait;
use bookshelf_core::{BookshelfError, Settings};
use bookshelf_views::BookshelfApp;

use super::open_store;
use crate::command::ManagementCommand;

/// Migrates the database and serves the application until shut down.
pub struct RunserverCommand;

/// Returns the listen address: the positional argument, or
/// `bind_address` from the settings.
pub fn listen_address(matches: &clap::ArgMatches, settings: &Settings) -> String {
    matches
        .get_one::<String>("addrport")
        .cloned()
        .unwrap_or_else(|| settings.bind_address.clone())
}

#[async_trait]
impl ManagementCommand for RunserverCommand {
    fn name(&self) -> &'static str {
        "runserver"
    }

    fn help(&self) -> &'static str {
        "Serve the application"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("addrport")
                .required(false)
                .value_name("ADDR:PORT")
                .help("Address to bind (defaults to bind_address)"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        let addr = listen_address(matches, settings);

        let store = open_store(settings)?;
        let applied = bookshelf_db::migrate(&store).await?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "applied pending migrations");
        }
        let removed = store.clear_expired_sessions().await?;
        if removed > 0 {
            tracing::info!(removed, "cleared expired sessions");
        }

        let app = BookshelfApp::new(settings.clone(), store)?;
        app.run(&addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> clap::ArgMatches {
        RunserverCommand
            .add_arguments(clap::Command::new("runserver"))
            .try_get_matches_from(args)
            .unwrap()
    }

    #[test]
    fn test_listen_address() {
        let settings = Settings::development();
        assert_eq!(listen_address(&matches(&["runserver"]), &settings), "127.0.0.1:8000");
        assert_eq!(
            listen_address(&matches(&["runserver", "0.0.0.0:9000"]), &settings),
            "0.0.0.0:9000"
        );
    }
}
