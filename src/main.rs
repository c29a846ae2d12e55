//! Pagewright CLI entry point.
//!
//! Parses arguments, executes the selected command, and renders failures as
//! user-friendly errors with suggestions.

use anyhow::Result;
use clap::Parser;
use pagewright::cli;
use pagewright::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(err) => {
            let ctx = user_friendly_error(err);
            ctx.display();
            std::process::exit(1);
        }
    }
}
