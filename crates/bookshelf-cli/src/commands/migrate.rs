//! The `migrate` management command.
//!
//! Creates the schema and the four book permissions. Already-applied
//! migrations are skipped, so running it twice is harmless.

use async_trait::async_trait;
use bookshelf_core::{BookshelfError, Settings};
use bookshelf_db::migrations::show_migrations;

use super::open_store;
use crate::command::ManagementCommand;

/// Applies pending migrations, or lists them with `--list`.
pub struct MigrateCommand;

/// Formats the `--list` output: `[X]` for applied, `[ ]` for pending.
pub fn format_plan(plan: &[(&str, bool)]) -> Vec<String> {
    plan.iter()
        .map(|(name, applied)| format!(" [{}] {name}", if *applied { "X" } else { " " }))
        .collect()
}

#[async_trait]
impl ManagementCommand for MigrateCommand {
    fn name(&self) -> &'static str {
        "migrate"
    }

    fn help(&self) -> &'static str {
        "Create or update the database schema"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("list")
                .long("list")
                .action(clap::ArgAction::SetTrue)
                .help("Show migrations and whether they are applied"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        let store = open_store(settings)?;

        if matches.get_flag("list") {
            for line in format_plan(&show_migrations(&store).await?) {
                println!("{line}");
            }
            return Ok(());
        }

        tracing::info!(database = %settings.database.name, "running migrations");
        let applied = bookshelf_db::migrate(&store).await?;
        if applied.is_empty() {
            println!("No migrations to apply.");
        } else {
            for name in applied {
                println!("  Applying {name}... OK");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plan() {
        let lines = format_plan(&[("0001_initial", true), ("0002_permissions", false)]);
        assert_eq!(lines, vec![" [X] 0001_initial", " [ ] 0002_permissions"]);
    }
}
