//! Error taxonomy for the rekey-and-generate pipeline.
//!
//! Configuration problems are collected as [`Diagnostic`]s by the pre-flight
//! pass and surfaced all at once; everything that can go wrong mid-pipeline
//! gets its own variant so callers can tell the recoverable decrypt failure
//! apart from the fatal ones.

use serde::Serialize;
use thiserror::Error;

/// Severity of a pre-flight configuration diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fatal: the pipeline must not start.
    Error,
    /// Reported but non-fatal (e.g. a dummy host key).
    Warning,
}

/// One finding from the pre-flight validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.message),
            Severity::Warning => write!(f, "warning: {}", self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {} problem(s) found", .0.len())]
    Config(Vec<Diagnostic>),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("cyclic generator dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    #[error("encryption failed: {0}")]
    EncryptFailed(String),

    #[error("invalid recipient key: {0}")]
    InvalidRecipient(String),

    #[error("no usable identity in {0}")]
    InvalidIdentity(String),

    #[error("missing ciphertext for {secret}: {path}")]
    MissingCiphertext { secret: String, path: String },

    #[error("generator for {secret} failed with exit status {}", .status.map_or_else(|| String::from("signal"), |c| c.to_string()))]
    GeneratorFailed {
        secret: String,
        status: Option<i32>,
    },

    #[error("aborted by operator")]
    Aborted,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
