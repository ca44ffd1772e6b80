//! The `createsuperuser` management command.

use async_trait::async_trait;
use bookshelf_core::{BookshelfError, Settings};

use super::accounts::{create_account, request_from_matches};
use super::open_migrated_store;
use crate::command::ManagementCommand;

/// Read when `--password` is not given.
pub const PASSWORD_ENV: &str = "BOOKSHELF_SUPERUSER_PASSWORD";

/// Creates a staff superuser holding every permission.
pub struct CreatesuperuserCommand;

pub(crate) fn account_arguments(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        clap::Arg::new("username")
            .long("username")
            .required(true)
            .help("Login name"),
    )
    .arg(
        clap::Arg::new("email")
            .long("email")
            .help("Email address"),
    )
    .arg(
        clap::Arg::new("password")
            .long("password")
            .help("Password; prefer the environment variable on shared hosts"),
    )
}

#[async_trait]
impl ManagementCommand for CreatesuperuserCommand {
    fn name(&self) -> &'static str {
        "createsuperuser"
    }

    fn help(&self) -> &'static str {
        "Create a superuser account"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        account_arguments(cmd)
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        let mut request = request_from_matches(matches, PASSWORD_ENV, |k| std::env::var(k).ok())?;
        request.superuser = true;
        let store = open_migrated_store(settings).await?;
        let user = create_account(&store, settings, request).await?;
        println!("Superuser '{}' created successfully.", user.username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn matches(args: &[&str]) -> clap::ArgMatches {
        let cmd = CreatesuperuserCommand.add_arguments(clap::Command::new("createsuperuser"));
        cmd.try_get_matches_from(args).unwrap()
    }

    #[test]
    fn test_password_from_environment() {
        let env: HashMap<&str, &str> = [(PASSWORD_ENV, "from-env-secret")].into_iter().collect();
        let lookup = |k: &str| env.get(k).map(ToString::to_string);

        let m = matches(&["createsuperuser", "--username", " root "]);
        let request = request_from_matches(&m, PASSWORD_ENV, lookup).unwrap();
        assert_eq!(request.username, "root");
        assert_eq!(request.password, "from-env-secret");

        let m = matches(&["createsuperuser", "--username", "root", "--password", "flag-secret"]);
        let request = request_from_matches(&m, PASSWORD_ENV, lookup).unwrap();
        assert_eq!(request.password, "flag-secret");
    }

    #[test]
    fn test_password_required() {
        let m = matches(&["createsuperuser", "--username", "root"]);
        let err = request_from_matches(&m, PASSWORD_ENV, |_| None).unwrap_err();
        assert!(err.to_string().contains(PASSWORD_ENV));
    }

    #[test]
    fn test_username_required() {
        let cmd = CreatesuperuserCommand.add_arguments(clap::Command::new("createsuperuser"));
        assert!(cmd.try_get_matches_from(["createsuperuser"]).is_err());
    }
}
