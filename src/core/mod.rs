//! Core library components.
//!
//! The rekey-and-generate pipeline: manifest handling, the crypto gateway,
//! interactive decryption with failure recovery, dependency resolution,
//! generator execution and per-host rekeying.

pub mod cipher;
pub mod decrypt;
pub mod generate;
pub mod manifest;
pub mod plaintext;
pub mod recipient;
pub mod rekey;
pub mod resolve;
