//! Manifest validation command.
//!
//! Runs the pre-flight pass alone and reports every finding, so operators can
//! fix a manifest in one round trip instead of one error at a time.

use std::path::Path;

use crate::cli::output;
use crate::core::manifest::Manifest;
use crate::error::{Diagnostic, Error, Result, Severity};

/// Execute `relock check`.
pub fn execute(manifest_path: &Path, json: bool) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let findings = manifest.preflight();

    if json {
        println!("{}", serde_json::to_string_pretty(&findings).map_err(
            |e| Error::Internal(format!("serializing diagnostics: {}", e)),
        )?);
    } else if findings.is_empty() {
        output::success("manifest is valid");
        output::section("manifest summary");
        output::kv("hosts", manifest.hosts.len());
        output::kv(
            "secrets",
            manifest.all_secrets().count(),
        );
        output::kv("generators", manifest.generators.len());
    } else {
        for finding in &findings {
            match finding.severity {
                Severity::Error => output::error(&finding.message),
                Severity::Warning => output::warn(&finding.message),
            }
        }
    }

    let errors: Vec<Diagnostic> = findings
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .cloned()
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(errors))
    }
}

/// Enforce the pre-flight pass before running the pipeline: warnings are
/// printed, errors fail the invocation before any side effect.
pub fn enforce(manifest: &Manifest) -> Result<()> {
    let findings = manifest.preflight();
    let mut errors = Vec::new();

    for finding in findings {
        match finding.severity {
            Severity::Error => {
                output::error(&finding.message);
                errors.push(finding);
            }
            Severity::Warning => output::warn(&finding.message),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(errors))
    }
}
