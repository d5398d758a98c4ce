//! Generate command.
//!
//! Runs generator scripts for every secret whose ciphertext does not exist
//! yet, in dependency order, and encrypts the results under the master and
//! extra recipient keys.

use std::path::Path;

use crate::cli::{check, output};
use crate::core::decrypt::{RecoveryState, TerminalPrompt};
use crate::core::generate::generate_missing;
use crate::core::manifest::Manifest;
use crate::core::recipient::MasterIdentities;
use crate::error::Result;

/// Execute `relock generate`.
pub fn execute(manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    check::enforce(&manifest)?;

    output::progress("Loading master identities");
    let masters = MasterIdentities::load(&manifest.masters)?;
    output::progress_done(true);

    let state = RecoveryState::new(Box::new(TerminalPrompt));
    let report = generate_missing(&manifest, &masters, &state)?;

    if report.generated.is_empty() {
        output::dimmed("nothing to generate: every secret already has a ciphertext");
        return Ok(());
    }

    println!();
    output::success(&format!("generated {} secret(s)", report.generated.len()));
    for id in &report.generated {
        output::list_item(&id.to_string());
    }
    if report.tainted > 0 {
        output::warn(&format!(
            "{} secret(s) were generated from dummy dependency values",
            report.tainted
        ));
    }

    Ok(())
}
