//! Rekey command.
//!
//! Decrypts every host's secrets under the master identities and re-encrypts
//! them under each host's own public key, swapping the per-host output
//! directories in atomically.

use std::path::Path;

use crate::cli::{check, output};
use crate::core::decrypt::{RecoveryState, TerminalPrompt};
use crate::core::manifest::Manifest;
use crate::core::recipient::MasterIdentities;
use crate::core::rekey::rekey_hosts;
use crate::error::Result;

/// Execute `relock rekey`.
pub fn execute(manifest_path: &Path, hosts: &[String]) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    check::enforce(&manifest)?;

    output::progress("Loading master identities");
    let masters = MasterIdentities::load(&manifest.masters)?;
    output::progress_done(true);

    let state = RecoveryState::new(Box::new(TerminalPrompt));
    let summary = rekey_hosts(&manifest, &masters, &state, hosts)?;

    println!();
    output::success(&format!(
        "rekeyed {} secret(s) across {} host(s)",
        summary.total_secrets(),
        summary.hosts.len()
    ));
    for report in &summary.hosts {
        output::kv(&report.host, format!("{} secret(s)", report.rekeyed));
        for dummy in &report.dummies {
            output::warn(&format!(
                "{}/{} is a dummy placeholder, not a real secret",
                report.host, dummy
            ));
        }
    }
    if summary.total_dummies() > 0 {
        output::hint("re-run rekey once the failing identities are available");
    }

    Ok(())
}
