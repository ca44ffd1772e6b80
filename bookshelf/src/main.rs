//! The `bookshelf` management binary.

use std::process::ExitCode;

use bookshelf_cli::{load_settings, register_builtin_commands, CommandRegistry};
use bookshelf_core::logging::setup_logging;
use bookshelf_core::BookshelfError;

async fn run() -> Result<(), BookshelfError> {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);

    let matches = registry.build_cli().get_matches();
    let settings = load_settings(matches.get_one::<String>("settings").map(String::as_str))?;
    setup_logging(&settings);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "bookshelf starting");

    registry.execute(&matches, &settings).await
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
