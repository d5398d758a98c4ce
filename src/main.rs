//! relock - per-host secret rekeying for age-encrypted deployments.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relock::cli::output;
use relock::cli::{execute, Cli, Command};
use relock::error::Error;

fn main() {
    let cli = Cli::parse();
    let is_check = matches!(cli.command, Command::Check { .. });

    // Initialize tracing subscriber with env-filter support
    let filter = EnvFilter::try_from_env("RELOCK_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("relock=debug")
        } else {
            EnvFilter::new("relock=warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .init();

    if let Err(e) = execute(cli.command, cli.manifest) {
        // `relock check` already is the full diagnosis; pointing back at it
        // from its own failure would be circular.
        let hint = match &e {
            Error::Config(_) if !is_check => Some("run: relock check"),
            Error::MissingCiphertext { .. } => Some("run: relock generate"),
            _ => None,
        };

        output::error(&e.to_string());
        if let Some(hint) = hint {
            output::hint(hint);
        }
        std::process::exit(1);
    }
}
