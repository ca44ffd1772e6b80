//! The `adduser` management command.

use async_trait::async_trait;
use bookshelf_auth::DefaultGroup;
use bookshelf_core::{BookshelfError, Settings};

use super::accounts::{create_account, request_from_matches};
use super::createsuperuser::account_arguments;
use super::open_migrated_store;
use crate::command::ManagementCommand;

/// Read when `--password` is not given.
pub const PASSWORD_ENV: &str = "BOOKSHELF_USER_PASSWORD";

/// Creates a regular account, optionally in one or more default groups.
pub struct AdduserCommand;

/// Resolves `--group` values to default groups, rejecting unknown names.
pub fn parse_groups<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<DefaultGroup>, BookshelfError> {
    let mut groups = Vec::new();
    for name in names {
        let group = DefaultGroup::from_name(name).ok_or_else(|| {
            let known: Vec<&str> = DefaultGroup::ALL.iter().map(|g| g.name()).collect();
            BookshelfError::ConfigurationError(format!(
                "Unknown group '{name}'. Choose from: {}.",
                known.join(", ")
            ))
        })?;
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    Ok(groups)
}

#[async_trait]
impl ManagementCommand for AdduserCommand {
    fn name(&self) -> &'static str {
        "adduser"
    }

    fn help(&self) -> &'static str {
        "Create a user account"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        account_arguments(cmd).arg(
            clap::Arg::new("group")
                .long("group")
                .action(clap::ArgAction::Append)
                .help("Add the user to Viewers, Editors or Admins (repeatable)"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        let mut request = request_from_matches(matches, PASSWORD_ENV, |k| std::env::var(k).ok())?;
        request.groups = parse_groups(
            matches
                .get_many::<String>("group")
                .into_iter()
                .flatten()
                .map(String::as_str),
        )?;
        let store = open_migrated_store(settings).await?;
        let user = create_account(&store, settings, request).await?;
        if user.groups.is_empty() {
            println!("User '{}' created.", user.username);
        } else {
            println!("User '{}' created in {}.", user.username, user.groups.join(", "));
        }
        Ok(())
    }
}
