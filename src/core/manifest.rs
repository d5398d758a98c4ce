//! Manifest file management.
//!
//! The manifest (`relock.toml`) is the pre-validated description handed to
//! the pipeline: master identities, extra recipients, hosts with their public
//! keys and secrets, and generator definitions. Validation happens in a
//! single pre-flight pass that returns every problem at once instead of
//! failing on the first one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core::recipient::{parse_recipient, DUMMY_HOST_KEY};
use crate::error::{Diagnostic, Result};

/// Global identifier of a secret: `host/secret-id`.
///
/// Generator dependencies may point across hosts, so the dependency graph
/// spans all hosts and every node carries its owning host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub host: String,
    pub secret: String,
}

impl NodeId {
    pub fn new(host: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            secret: secret.into(),
        }
    }

    /// Parse a `host/secret` reference as written in generator dependencies.
    pub fn parse(reference: &str) -> Option<Self> {
        let (host, secret) = reference.split_once('/')?;
        if host.is_empty() || secret.is_empty() || secret.contains('/') {
            return None;
        }
        Some(Self::new(host, secret))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.host, self.secret)
    }
}

/// One secret declared under a host.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SecretDecl {
    /// Path to the master-encrypted ciphertext. Required when `generator` is
    /// set (generation writes into this location).
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// Name of the generator that produces this secret when the ciphertext
    /// does not exist yet.
    #[serde(default)]
    pub generator: Option<String>,
}

/// One host with its public key and secret set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HostDecl {
    /// The host's age public key; the dummy sentinel is allowed but warned.
    pub pubkey: String,
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretDecl>,
}

/// A generator definition: a script plus its declared dependencies.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GeneratorDecl {
    /// Executable invoked to produce the plaintext on stdout.
    pub script: PathBuf,
    /// Extra arguments passed before the dependency plaintext paths.
    #[serde(default)]
    pub args: Vec<String>,
    /// `host/secret` references whose plaintexts the script needs.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// The full pipeline description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Manifest {
    /// Master identity files, tried in declaration order. Must be absolute.
    pub masters: Vec<PathBuf>,
    /// Additional public keys every generated/edited secret is encrypted for.
    #[serde(default)]
    pub extra_recipients: Vec<String>,
    /// Parent of the per-host rekeyed-secret directories.
    pub output_dir: PathBuf,
    #[serde(default)]
    pub generators: BTreeMap<String, GeneratorDecl>,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostDecl>,
}

impl Manifest {
    /// Load and parse a manifest file.
    ///
    /// Relative `source`, `script` and `output-dir` paths are resolved
    /// against the manifest's directory; master identity paths are left as
    /// declared since they must be absolute anyway.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("loading manifest from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let mut manifest: Manifest = toml::from_str(&contents)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.resolve_paths(base);

        Ok(manifest)
    }

    /// Parse a manifest from a string, resolving relative paths against
    /// `base`.
    pub fn parse(contents: &str, base: &Path) -> Result<Self> {
        let mut manifest: Manifest = toml::from_str(contents)?;
        manifest.resolve_paths(base);
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
        for generator in self.generators.values_mut() {
            if generator.script.is_relative() {
                generator.script = base.join(&generator.script);
            }
        }
        for host in self.hosts.values_mut() {
            for secret in host.secrets.values_mut() {
                if let Some(source) = &secret.source {
                    if source.is_relative() {
                        secret.source = Some(base.join(source));
                    }
                }
            }
        }
    }

    /// Look up a secret by its global id.
    pub fn secret(&self, id: &NodeId) -> Option<&SecretDecl> {
        self.hosts.get(&id.host)?.secrets.get(&id.secret)
    }

    /// Where a rekeyed secret lands once its host's staging area is swapped
    /// in.
    pub fn output_path(&self, id: &NodeId) -> PathBuf {
        self.output_dir
            .join(&id.host)
            .join(format!("{}.age", id.secret))
    }

    /// Iterate every declared secret as (id, declaration).
    pub fn all_secrets(&self) -> impl Iterator<Item = (NodeId, &SecretDecl)> {
        self.hosts.iter().flat_map(|(host, decl)| {
            decl.secrets
                .iter()
                .map(move |(name, secret)| (NodeId::new(host.clone(), name.clone()), secret))
        })
    }

    /// Pre-flight validation pass.
    ///
    /// Collects every configuration problem as a [`Diagnostic`]; callers fail
    /// the run when any error-severity finding exists and merely report
    /// warnings (a dummy host key is a warning, never fatal).
    pub fn preflight(&self) -> Vec<Diagnostic> {
        let mut findings = Vec::new();

        if self.masters.is_empty() {
            findings.push(Diagnostic::error("no master identities declared"));
        }
        for path in &self.masters {
            if path.is_relative() {
                findings.push(Diagnostic::error(format!(
                    "master identity path is not absolute: {}",
                    path.display()
                )));
            }
        }

        for key in &self.extra_recipients {
            if parse_recipient(key).is_err() {
                findings.push(Diagnostic::error(format!(
                    "extra recipient is not a valid age public key: {}",
                    key
                )));
            }
        }

        for (host, decl) in &self.hosts {
            if parse_recipient(&decl.pubkey).is_err() {
                findings.push(Diagnostic::error(format!(
                    "host {} has an invalid public key: {}",
                    host, decl.pubkey
                )));
            } else if decl.pubkey == DUMMY_HOST_KEY {
                findings.push(Diagnostic::warning(format!(
                    "host {} still uses the dummy public key; its rekeyed secrets must not be deployed",
                    host
                )));
            }

            for (name, secret) in &decl.secrets {
                let id = NodeId::new(host.clone(), name.clone());

                if secret.source.is_none() && secret.generator.is_none() {
                    findings.push(Diagnostic::error(format!(
                        "secret {} declares neither a source ciphertext nor a generator",
                        id
                    )));
                }

                if let Some(generator) = &secret.generator {
                    if secret.source.is_none() {
                        findings.push(Diagnostic::error(format!(
                            "secret {} has a generator but no source path for it to write into",
                            id
                        )));
                    }
                    match self.generators.get(generator) {
                        None => findings.push(Diagnostic::error(format!(
                            "secret {} references undefined generator {}",
                            id, generator
                        ))),
                        Some(decl) => {
                            for reference in &decl.dependencies {
                                self.check_dependency(&id, generator, reference, &mut findings);
                            }
                        }
                    }
                }
            }
        }

        findings
    }

    fn check_dependency(
        &self,
        dependent: &NodeId,
        generator: &str,
        reference: &str,
        findings: &mut Vec<Diagnostic>,
    ) {
        let Some(target) = NodeId::parse(reference) else {
            findings.push(Diagnostic::error(format!(
                "generator {} (for {}) has a malformed dependency reference: {}",
                generator, dependent, reference
            )));
            return;
        };
        match self.secret(&target) {
            None => findings.push(Diagnostic::error(format!(
                "generator {} (for {}) depends on unknown secret {}",
                generator, dependent, target
            ))),
            Some(decl) if decl.source.is_none() => findings.push(Diagnostic::error(format!(
                "generator {} (for {}) depends on {}, which has no ciphertext to decrypt",
                generator, dependent, target
            ))),
            Some(_) => {}
        }
    }
}
