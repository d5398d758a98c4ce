//! relock - per-host secret rekeying and generation for age-encrypted
//! deployments.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── cli/              # Command-line interface
//! │   ├── rekey         # Rekey all hosts
//! │   ├── generate      # Generate missing secrets
//! │   ├── check         # Pre-flight manifest validation
//! │   └── output        # Terminal output helpers
//! └── core/             # Core library components
//!     ├── manifest      # relock.toml parsing and validation
//!     ├── recipient     # Recipient sets and master identities
//!     ├── cipher        # age encryption gateway
//!     ├── plaintext     # Zeroized plaintext buffer
//!     ├── decrypt       # Interactive decryptor (retry/abort/dummy FSM)
//!     ├── resolve       # Generator dependency graph + toposort
//!     ├── generate      # Generator runner
//!     └── rekey         # Per-host rekey orchestrator + staging swap
//! ```
//!
//! # Features
//!
//! - Secrets stay encrypted under a small set of master identities and are
//!   re-encrypted per host before deployment
//! - Missing secrets are produced by generator scripts, run in dependency
//!   order across hosts
//! - Decrypt failures recover interactively: retry, abort, dummy, dummy-all
//! - Per-host output directories are swapped in atomically

pub mod cli;
pub mod core;
pub mod error;
