//! Test support utilities for relock integration tests.
//!
//! Builds isolated fixture projects in temp directories: a master identity,
//! master-encrypted secret files, generator scripts and a manifest.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use age::secrecy::ExposeSecret;
use age::x25519;

use relock::core::cipher;
use relock::core::manifest::Manifest;
use relock::core::plaintext::Plaintext;
use relock::core::recipient::{MasterIdentities, RecipientSet};

/// Isolated fixture project with one master identity.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub master: x25519::Identity,
    pub master_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let master = x25519::Identity::generate();

        let master_path = dir.path().join("master.txt");
        fs::write(
            &master_path,
            format!("{}\n", master.to_string().expose_secret()),
        )
        .expect("failed to write master identity");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&master_path, fs::Permissions::from_mode(0o600)).unwrap();
        }

        Self {
            dir,
            master,
            master_path,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn masters(&self) -> MasterIdentities {
        MasterIdentities::load(std::slice::from_ref(&self.master_path)).unwrap()
    }

    /// Encrypt `plaintext` under the master key (and any extra recipients)
    /// and write it to `rel` inside the fixture.
    pub fn write_secret(&self, rel: &str, plaintext: &str) -> PathBuf {
        self.write_secret_for(rel, plaintext, &[self.master.to_public()])
    }

    /// Encrypt `plaintext` for explicit recipients and write it to `rel`.
    pub fn write_secret_for(
        &self,
        rel: &str,
        plaintext: &str,
        recipients: &[x25519::Recipient],
    ) -> PathBuf {
        let set = RecipientSet::from_keys(recipients.iter().cloned());
        let ciphertext = cipher::encrypt(&Plaintext::from(plaintext), &set).unwrap();
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, ciphertext).unwrap();
        path
    }

    /// Write an executable generator script.
    #[cfg(unix)]
    pub fn write_script(&self, rel: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Parse a manifest body; the standard header (masters, output-dir) is
    /// prepended and relative paths resolve against the fixture directory.
    pub fn manifest(&self, body: &str) -> Manifest {
        Manifest::parse(&self.manifest_toml(body), self.path()).unwrap()
    }

    /// Write the manifest to `relock.toml` for CLI invocations.
    pub fn manifest_file(&self, body: &str) -> PathBuf {
        let path = self.path().join("relock.toml");
        fs::write(&path, self.manifest_toml(body)).unwrap();
        path
    }

    fn manifest_toml(&self, body: &str) -> String {
        format!(
            "masters = [\"{}\"]\noutput-dir = \"rekeyed\"\n{}",
            self.master_path.display(),
            body
        )
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("rekeyed")
    }

    /// The relock binary, pointed at this fixture's manifest.
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("relock").unwrap();
        cmd.current_dir(self.path())
            .arg("--manifest")
            .arg(self.path().join("relock.toml"));
        cmd
    }
}

/// Decrypt an output file with one identity and return the plaintext string.
pub fn decrypt_file(path: &Path, identity: &x25519::Identity) -> String {
    let ciphertext = fs::read_to_string(path).unwrap();
    let plaintext = cipher::decrypt(&ciphertext, std::slice::from_ref(identity)).unwrap();
    String::from_utf8(plaintext.as_bytes().to_vec()).unwrap()
}

/// True when the file fails to decrypt under the identity.
pub fn cannot_decrypt(path: &Path, identity: &x25519::Identity) -> bool {
    let ciphertext = fs::read_to_string(path).unwrap();
    cipher::decrypt(&ciphertext, std::slice::from_ref(identity)).is_err()
}

/// A fresh host keypair as (identity, pubkey string).
pub fn host_key() -> (x25519::Identity, String) {
    let identity = x25519::Identity::generate();
    let pubkey = identity.to_public().to_string();
    (identity, pubkey)
}
