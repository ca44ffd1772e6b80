//! The `setup_groups` management command.

use async_trait::async_trait;
use bookshelf_auth::setup::{setup_groups, GroupOutcome, SetupReport};
use bookshelf_auth::AuthStore;
use bookshelf_core::{BookshelfError, Settings};

use super::open_migrated_store;
use crate::command::ManagementCommand;

/// Gets or creates Viewers, Editors and Admins with their permissions.
pub struct SetupGroupsCommand;

/// Runs the seeding and returns the lines to print: one per group, then
/// the summary.
pub async fn run(store: &dyn AuthStore) -> Result<(SetupReport, Vec<String>), BookshelfError> {
    let report = setup_groups(store).await?;
    let mut lines: Vec<String> = report.groups.iter().map(GroupOutcome::message).collect();
    lines.push(report.summary());
    Ok((report, lines))
}

#[async_trait]
impl ManagementCommand for SetupGroupsCommand {
    fn name(&self) -> &'static str {
        "setup_groups"
    }

    fn help(&self) -> &'static str {
        "Create the default groups and assign their permissions"
    }

    async fn handle(
        &self,
        _matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        let store = open_migrated_store(settings).await?;
        let (_, lines) = run(&store).await?;
        for line in lines {
            println!("{line}");
        }
        Ok(())
    }
}
