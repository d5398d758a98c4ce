//! Generator execution.
//!
//! For every secret that has a generator but no ciphertext yet, runs the
//! generator script in dependency order and encrypts its stdout under the
//! generation recipient set (master public keys plus extra recipients).
//!
//! Dependency plaintexts are handed to the script as 0600 files inside a
//! per-invocation temp dir that is removed as soon as the script exits; the
//! generated plaintext itself only ever exists in memory.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::cipher;
use crate::core::decrypt::{decrypt_with_recovery, RecoveryState};
use crate::core::manifest::{GeneratorDecl, Manifest, NodeId};
use crate::core::plaintext::Plaintext;
use crate::core::recipient::{MasterIdentities, RecipientSet};
use crate::core::resolve::{self, DependencyGraph};
use crate::error::{Error, Result};

/// What a generation run did.
pub struct GenerateReport {
    /// Secrets generated this run, in generation order.
    pub generated: Vec<NodeId>,
    /// How many of those were built from at least one dummy dependency.
    pub tainted: usize,
}

/// Generate every missing secret, in topologically resolved order.
///
/// Fails before any side effect when the dependency graph has a cycle. A
/// non-zero script exit is fatal for the whole generate operation; already
/// written ciphertexts from earlier in the order remain (they are complete,
/// valid secrets).
pub fn generate_missing(
    manifest: &Manifest,
    masters: &MasterIdentities,
    state: &RecoveryState,
) -> Result<GenerateReport> {
    let pending = resolve::pending(manifest);
    let order = DependencyGraph::build(manifest, &pending).resolve()?;

    let recipients = RecipientSet::generation(masters, &manifest.extra_recipients)?;

    let mut report = GenerateReport {
        generated: Vec::new(),
        tainted: 0,
    };

    for id in order {
        if state.abort_requested() {
            return Err(Error::Aborted);
        }
        // None means the ciphertext appeared mid-run (a script pre-created
        // it); nothing was generated, so nothing is reported.
        if let Some(used_dummy) = run_generator(manifest, masters, state, &recipients, &id)? {
            if used_dummy {
                report.tainted += 1;
            }
            report.generated.push(id);
        }
    }

    Ok(report)
}

/// Run one secret's generator and write the encrypted result to its source
/// path. Returns `None` when the ciphertext already exists and the script is
/// skipped, otherwise whether any dependency plaintext was a dummy
/// substitute.
fn run_generator(
    manifest: &Manifest,
    masters: &MasterIdentities,
    state: &RecoveryState,
    recipients: &RecipientSet,
    id: &NodeId,
) -> Result<Option<bool>> {
    let decl = manifest
        .secret(id)
        .ok_or_else(|| Error::Internal(format!("unknown secret {}", id)))?;
    let source = decl
        .source
        .as_ref()
        .ok_or_else(|| Error::Internal(format!("secret {} has no source path", id)))?;
    let generator_name = decl
        .generator
        .as_ref()
        .ok_or_else(|| Error::Internal(format!("secret {} has no generator", id)))?;
    let generator = manifest
        .generators
        .get(generator_name)
        .ok_or_else(|| Error::Internal(format!("undefined generator {}", generator_name)))?;

    // Generation never overwrites an existing secret.
    if source.exists() {
        debug!("skipping {}: ciphertext already exists", id);
        return Ok(None);
    }

    info!("generating {} with {}", id, generator_name);

    // The script may write sibling artifacts next to the destination, so its
    // directory has to exist before the script runs.
    if let Some(parent) = source.parent() {
        fs::create_dir_all(parent)?;
    }

    // Dependency plaintexts live only as long as this scratch dir.
    let scratch = TempDir::new()?;
    let (plaintext_paths, used_dummy) =
        materialize_dependencies(manifest, masters, state, generator, id, scratch.path())?;

    let mut command = Command::new(&generator.script);
    command
        .args(&generator.args)
        .args(&plaintext_paths)
        .env("RELOCK_HOST", &id.host)
        .env("RELOCK_SECRET", &id.secret)
        .env("RELOCK_OUT", source)
        .env("RELOCK_DEP_COUNT", generator.dependencies.len().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    for (i, reference) in generator.dependencies.iter().enumerate() {
        if let Some(dep) = NodeId::parse(reference) {
            command.env(format!("RELOCK_DEP_{}_HOST", i), &dep.host);
            command.env(format!("RELOCK_DEP_{}_SECRET", i), &dep.secret);
            command.env(format!("RELOCK_DEP_{}_PLAINTEXT", i), &plaintext_paths[i]);
            if let Some(dep_source) = manifest.secret(&dep).and_then(|d| d.source.as_ref()) {
                command.env(format!("RELOCK_DEP_{}_SOURCE", i), dep_source);
            }
        }
    }

    let output = command.output()?;
    if !output.status.success() {
        return Err(Error::GeneratorFailed {
            secret: id.to_string(),
            status: output.status.code(),
        });
    }

    let plaintext = Plaintext::new(output.stdout);
    drop(scratch);

    // Encrypt fully in memory first; nothing lands on disk if it fails.
    let ciphertext = cipher::encrypt(&plaintext, recipients)?;
    fs::write(source, ciphertext)?;

    info!("wrote {}", source.display());
    Ok(Some(used_dummy))
}

/// Decrypt each dependency and park its plaintext in a 0600 file under
/// `scratch`. Returns the file paths in dependency order.
fn materialize_dependencies(
    manifest: &Manifest,
    masters: &MasterIdentities,
    state: &RecoveryState,
    generator: &GeneratorDecl,
    dependent: &NodeId,
    scratch: &Path,
) -> Result<(Vec<std::path::PathBuf>, bool)> {
    let mut paths = Vec::with_capacity(generator.dependencies.len());
    let mut used_dummy = false;

    for (i, reference) in generator.dependencies.iter().enumerate() {
        let dep = NodeId::parse(reference)
            .ok_or_else(|| Error::Internal(format!("malformed dependency {}", reference)))?;
        let dep_source = manifest
            .secret(&dep)
            .and_then(|d| d.source.clone())
            .ok_or_else(|| Error::Internal(format!("dependency {} has no source", dep)))?;

        if !dep_source.exists() {
            return Err(Error::MissingCiphertext {
                secret: dep.to_string(),
                path: dep_source.display().to_string(),
            });
        }

        debug!("resolving dependency {} of {}", dep, dependent);
        let decrypted = decrypt_with_recovery(&dep_source, masters, &dep.to_string(), state)?;
        used_dummy |= decrypted.is_dummy();

        let path = scratch.join(format!("dep-{}", i));
        fs::write(&path, decrypted.plaintext().as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        paths.push(path);
    }

    Ok((paths, used_dummy))
}
