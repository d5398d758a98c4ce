//! Command-line interface.

pub mod check;
pub mod generate;
pub mod output;
pub mod rekey;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// relock - per-host secret rekeying for age-encrypted deployments.
#[derive(Parser)]
#[command(
    name = "relock",
    about = "Rekey and generate per-host encrypted secrets",
    version
)]
pub struct Cli {
    /// Path to the manifest file
    #[arg(short, long, env = "RELOCK_MANIFEST", default_value = "relock.toml", global = true)]
    pub manifest: PathBuf,

    /// Enable debug logging (same as RELOCK_LOG=relock=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Command {
    /// Re-encrypt every host's secrets under its own public key
    Rekey {
        /// Rekey only these hosts (repeatable); default is all hosts
        #[arg(long = "host")]
        hosts: Vec<String>,
    },

    /// Run generators for secrets whose ciphertext does not exist yet
    Generate,

    /// Validate the manifest and report every problem found
    Check {
        /// Output diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Execute a command.
pub fn execute(command: Command, manifest: PathBuf) -> crate::error::Result<()> {
    match command {
        Command::Rekey { hosts } => rekey::execute(&manifest, &hosts),
        Command::Generate => generate::execute(&manifest),
        Command::Check { json } => check::execute(&manifest, json),
    }
}
