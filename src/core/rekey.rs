//! Per-host rekeying.
//!
//! For each host, every secret with a source ciphertext is decrypted under
//! the master identities and re-encrypted under that host's own public key.
//! Results land in a per-host staging directory that replaces the host's
//! authoritative output directory only once every secret has been written;
//! an abort leaves the previous directory untouched.
//!
//! Hosts are mutually independent and run on parallel threads. The only
//! shared state is the [`RecoveryState`], which serializes recovery prompts
//! and broadcasts dummy-all/abort to all workers.

use std::fs;
use std::path::Path;
use std::thread;

use tracing::{info, warn};

use crate::core::cipher;
use crate::core::decrypt::{decrypt_with_recovery, RecoveryState};
use crate::core::manifest::{HostDecl, Manifest, NodeId};
use crate::core::recipient::{MasterIdentities, RecipientSet, DUMMY_HOST_KEY};
use crate::error::{Error, Result};

/// Outcome of rekeying one host.
pub struct HostReport {
    pub host: String,
    /// Secrets written into the swapped-in output directory.
    pub rekeyed: usize,
    /// Secrets whose output is a labeled dummy placeholder.
    pub dummies: Vec<String>,
}

/// Outcome of a whole rekey invocation.
pub struct RekeySummary {
    pub hosts: Vec<HostReport>,
}

impl RekeySummary {
    pub fn total_secrets(&self) -> usize {
        self.hosts.iter().map(|h| h.rekeyed).sum()
    }

    pub fn total_dummies(&self) -> usize {
        self.hosts.iter().map(|h| h.dummies.len()).sum()
    }
}

/// Rekey all hosts (or the named subset), in parallel.
///
/// Every selected host either completes fully and has its staging directory
/// swapped in, or leaves its previous output untouched. When any worker
/// fails, the remaining workers still run to completion (their swaps are
/// valid) unless the failure was an abort, which stops everyone.
pub fn rekey_hosts(
    manifest: &Manifest,
    masters: &MasterIdentities,
    state: &RecoveryState,
    only: &[String],
) -> Result<RekeySummary> {
    let selected: Vec<&String> = if only.is_empty() {
        manifest.hosts.keys().collect()
    } else {
        for name in only {
            if !manifest.hosts.contains_key(name) {
                return Err(Error::UnknownHost(name.clone()));
            }
        }
        manifest.hosts.keys().filter(|k| only.contains(*k)).collect()
    };

    let mut reports = Vec::with_capacity(selected.len());
    let mut failure: Option<Error> = None;
    let mut aborted = false;

    thread::scope(|scope| {
        let handles: Vec<_> = selected
            .iter()
            .map(|host| {
                let host = (*host).clone();
                scope.spawn(move || {
                    let decl = &manifest.hosts[&host];
                    rekey_host(manifest, masters, state, &host, decl)
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(Error::Aborted)) => aborted = true,
                Ok(Err(e)) => failure = failure.take().or(Some(e)),
                Err(_) => {
                    failure = failure
                        .take()
                        .or(Some(Error::Internal("host worker panicked".into())))
                }
            }
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }
    if aborted {
        return Err(Error::Aborted);
    }

    Ok(RekeySummary { hosts: reports })
}

/// Rekey one host into a fresh staging directory, then swap it in.
fn rekey_host(
    manifest: &Manifest,
    masters: &MasterIdentities,
    state: &RecoveryState,
    host: &str,
    decl: &HostDecl,
) -> Result<HostReport> {
    if decl.pubkey == DUMMY_HOST_KEY {
        warn!(
            "host {} is rekeyed under the dummy key; do not deploy its secrets",
            host
        );
    }
    let recipients = RecipientSet::host(&decl.pubkey)?;

    let staging = manifest.output_dir.join(format!(".{}.staging", host));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let result = fill_staging(manifest, masters, state, host, decl, &recipients, &staging);

    match result {
        Ok(report) => {
            swap_staging(&manifest.output_dir, host, &staging)?;
            info!(
                "rekeyed {} secret(s) for {} ({} dummy)",
                report.rekeyed,
                host,
                report.dummies.len()
            );
            Ok(report)
        }
        Err(e) => {
            // Previous authoritative directory stays untouched.
            let _ = fs::remove_dir_all(&staging);
            Err(e)
        }
    }
}

/// Decrypt and re-encrypt every eligible secret of a host into `staging`.
#[allow(clippy::too_many_arguments)]
fn fill_staging(
    manifest: &Manifest,
    masters: &MasterIdentities,
    state: &RecoveryState,
    host: &str,
    decl: &HostDecl,
    recipients: &RecipientSet,
    staging: &Path,
) -> Result<HostReport> {
    let mut report = HostReport {
        host: host.to_string(),
        rekeyed: 0,
        dummies: Vec::new(),
    };

    for (name, secret) in &decl.secrets {
        // Secrets without a source ciphertext cannot be rekeyed yet; they are
        // the generator runner's job, never this one's.
        let Some(source) = &secret.source else {
            continue;
        };

        if state.abort_requested() {
            return Err(Error::Aborted);
        }

        let id = NodeId::new(host, name.clone());
        if !source.exists() {
            return Err(Error::MissingCiphertext {
                secret: id.to_string(),
                path: source.display().to_string(),
            });
        }

        let decrypted = decrypt_with_recovery(source, masters, &id.to_string(), state)?;
        if decrypted.is_dummy() {
            // The output stays structurally complete, but say so loudly.
            warn!(
                "writing dummy ciphertext for {}; the host's secret set is incomplete",
                id
            );
            report.dummies.push(name.clone());
        }

        let ciphertext = cipher::encrypt(decrypted.plaintext(), recipients)?;
        fs::write(staging.join(format!("{}.age", name)), ciphertext)?;
        report.rekeyed += 1;
    }

    Ok(report)
}

/// Atomically promote `staging` to the host's authoritative directory.
///
/// The old directory is renamed aside first so a crash mid-swap can lose at
/// most the alias, never mix old and new contents.
fn swap_staging(output_dir: &Path, host: &str, staging: &Path) -> Result<()> {
    let dest = output_dir.join(host);
    let old = output_dir.join(format!(".{}.old", host));

    if old.exists() {
        fs::remove_dir_all(&old)?;
    }
    if dest.exists() {
        fs::rename(&dest, &old)?;
    }
    fs::rename(staging, &dest)?;
    if old.exists() {
        fs::remove_dir_all(&old)?;
    }

    Ok(())
}
