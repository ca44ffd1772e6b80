//! The `check` management command.
//!
//! Always runs the `security` checks; `--deploy` adds the deployment set
//! (HSTS, SSL redirect, cookie flags, debug, TLS files). Any error-level
//! finding makes the command fail so scripts can gate a release on it.

use async_trait::async_trait;
use bookshelf_core::checks::{CheckLevel, CheckMessage, CheckRegistry};
use bookshelf_core::{BookshelfError, Settings};

use crate::command::ManagementCommand;

/// Runs the system checks.
pub struct CheckCommand;

/// Runs the checks for the requested tags.
pub fn run(settings: &Settings, deploy: bool) -> Vec<CheckMessage> {
    let tags: &[&str] = if deploy {
        &["security", "deploy"]
    } else {
        &["security"]
    };
    CheckRegistry::with_builtins().run_checks(Some(tags), settings)
}

/// Logs every finding and fails if any is an error.
pub fn report(messages: &[CheckMessage]) -> Result<(), BookshelfError> {
    if messages.is_empty() {
        println!("System check identified no issues.");
        return Ok(());
    }

    let errors = messages.iter().filter(|m| m.is_error()).count();
    let warnings = messages
        .iter()
        .filter(|m| m.level == CheckLevel::Warning)
        .count();

    for msg in messages {
        let hint = msg
            .hint
            .as_ref()
            .map_or(String::new(), |h| format!("\n\tHINT: {h}"));
        if msg.is_error() {
            tracing::error!(id = %msg.id, "{}", msg.msg);
        } else {
            tracing::warn!(id = %msg.id, "{}", msg.msg);
        }
        println!("{} ({}): {}{hint}", msg.level, msg.id, msg.msg);
    }

    println!(
        "System check identified {} issue(s) ({errors} error(s), {warnings} warning(s)).",
        messages.len()
    );

    if errors > 0 {
        return Err(BookshelfError::ImproperlyConfigured(format!(
            "System check found {errors} error(s)"
        )));
    }
    Ok(())
}

#[async_trait]
impl ManagementCommand for CheckCommand {
    fn name(&self) -> &'static str {
        "check"
    }

    fn help(&self) -> &'static str {
        "Run security and deployment checks"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("deploy")
                .long("deploy")
                .action(clap::ArgAction::SetTrue)
                .help("Also run the deployment checks"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        report(&run(settings, matches.get_flag("deploy")))
    }
}
