//! Rekey orchestrator integration tests.

mod support;

use std::fs;

use relock::core::decrypt::{Decision, RecoveryState, ScriptedPrompt};
use relock::core::rekey::rekey_hosts;
use relock::error::Error;
use support::*;

fn quiet_state(decisions: Vec<Decision>) -> RecoveryState {
    RecoveryState::new(Box::new(ScriptedPrompt::new(decisions)))
}

#[test]
fn test_rekey_single_host_round_trip() {
    // Scenario: host web1 with secret db-pw, no generator.
    let f = Fixture::new();
    f.write_secret("secrets/db-pw.age", "correct horse battery staple");
    let (host_identity, pubkey) = host_key();

    let manifest = f.manifest(&format!(
        r#"
[hosts.web1]
pubkey = "{pubkey}"

[hosts.web1.secrets.db-pw]
source = "secrets/db-pw.age"
"#
    ));

    let state = quiet_state(Vec::new());
    let summary = rekey_hosts(&manifest, &f.masters(), &state, &[]).unwrap();

    assert_eq!(summary.hosts.len(), 1);
    assert_eq!(summary.total_secrets(), 1);
    assert_eq!(summary.total_dummies(), 0);

    let out = f.output_dir().join("web1").join("db-pw.age");
    assert!(out.exists());

    // Decryptable only under the host key; the master no longer works.
    assert_eq!(
        decrypt_file(&out, &host_identity),
        "correct horse battery staple"
    );
    assert!(cannot_decrypt(&out, &f.master));
}

#[test]
fn test_rekey_is_structurally_idempotent() {
    let f = Fixture::new();
    f.write_secret("secrets/api-key.age", "s3cr3t");
    f.write_secret("secrets/db-pw.age", "hunter2");
    let (host_identity, pubkey) = host_key();

    let manifest = f.manifest(&format!(
        r#"
[hosts.web1]
pubkey = "{pubkey}"

[hosts.web1.secrets.api-key]
source = "secrets/api-key.age"

[hosts.web1.secrets.db-pw]
source = "secrets/db-pw.age"
"#
    ));

    for _ in 0..2 {
        let state = quiet_state(Vec::new());
        rekey_hosts(&manifest, &f.masters(), &state, &[]).unwrap();
    }

    let host_dir = f.output_dir().join("web1");
    let mut names: Vec<String> = fs::read_dir(&host_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["api-key.age", "db-pw.age"]);

    assert_eq!(
        decrypt_file(&host_dir.join("db-pw.age"), &host_identity),
        "hunter2"
    );
    assert_eq!(
        decrypt_file(&host_dir.join("api-key.age"), &host_identity),
        "s3cr3t"
    );
}

#[test]
fn test_rekey_never_runs_generators() {
    // A secret with a generator but an existing ciphertext is rekeyed from
    // that ciphertext; the script must never run.
    let f = Fixture::new();
    f.write_secret("secrets/token.age", "pregenerated");
    let (_, pubkey) = host_key();

    #[cfg(unix)]
    f.write_script("gen/token.sh", "touch generator-ran; echo nope");

    let manifest = f.manifest(&format!(
        r#"
[generators.token]
script = "gen/token.sh"

[hosts.web1]
pubkey = "{pubkey}"

[hosts.web1.secrets.token]
source = "secrets/token.age"
generator = "token"
"#
    ));

    let state = quiet_state(Vec::new());
    let summary = rekey_hosts(&manifest, &f.masters(), &state, &[]).unwrap();

    assert_eq!(summary.total_secrets(), 1);
    assert!(!f.path().join("generator-ran").exists());
}

#[test]
fn test_rekey_multiple_hosts_independent_outputs() {
    let f = Fixture::new();
    f.write_secret("secrets/shared.age", "same plaintext");
    let (id_a, pub_a) = host_key();
    let (id_b, pub_b) = host_key();

    let manifest = f.manifest(&format!(
        r#"
[hosts.alpha]
pubkey = "{pub_a}"

[hosts.alpha.secrets.shared]
source = "secrets/shared.age"

[hosts.beta]
pubkey = "{pub_b}"

[hosts.beta.secrets.shared]
source = "secrets/shared.age"
"#
    ));

    let state = quiet_state(Vec::new());
    let summary = rekey_hosts(&manifest, &f.masters(), &state, &[]).unwrap();
    assert_eq!(summary.hosts.len(), 2);

    let out_a = f.output_dir().join("alpha").join("shared.age");
    let out_b = f.output_dir().join("beta").join("shared.age");
    assert_eq!(decrypt_file(&out_a, &id_a), "same plaintext");
    assert_eq!(decrypt_file(&out_b, &id_b), "same plaintext");
    // Each host can only open its own copy.
    assert!(cannot_decrypt(&out_a, &id_b));
    assert!(cannot_decrypt(&out_b, &id_a));
}

#[test]
fn test_rekey_host_subset_selection() {
    let f = Fixture::new();
    f.write_secret("secrets/s.age", "v");
    let (_, pub_a) = host_key();
    let (_, pub_b) = host_key();

    let manifest = f.manifest(&format!(
        r#"
[hosts.alpha]
pubkey = "{pub_a}"

[hosts.alpha.secrets.s]
source = "secrets/s.age"

[hosts.beta]
pubkey = "{pub_b}"

[hosts.beta.secrets.s]
source = "secrets/s.age"
"#
    ));

    let state = quiet_state(Vec::new());
    rekey_hosts(&manifest, &f.masters(), &state, &["alpha".to_string()]).unwrap();

    assert!(f.output_dir().join("alpha").exists());
    assert!(!f.output_dir().join("beta").exists());

    let state = quiet_state(Vec::new());
    let result = rekey_hosts(&manifest, &f.masters(), &state, &["gamma".to_string()]);
    assert!(matches!(result, Err(Error::UnknownHost(_))));
}

#[test]
fn test_dummy_decision_writes_labeled_placeholder() {
    // Scenario: db-pw was encrypted for someone else entirely, so the master
    // cannot open it; the operator picks "dummy" and the run completes.
    let f = Fixture::new();
    let stranger = age::x25519::Identity::generate();
    f.write_secret_for("secrets/db-pw.age", "unreachable", &[stranger.to_public()]);
    let (host_identity, pubkey) = host_key();

    let manifest = f.manifest(&format!(
        r#"
[hosts.web1]
pubkey = "{pubkey}"

[hosts.web1.secrets.db-pw]
source = "secrets/db-pw.age"
"#
    ));

    let state = quiet_state(vec![Decision::Dummy]);
    let summary = rekey_hosts(&manifest, &f.masters(), &state, &[]).unwrap();

    assert_eq!(summary.total_dummies(), 1);
    assert_eq!(summary.hosts[0].dummies, vec!["db-pw".to_string()]);

    // Structurally complete: the output file exists and is host-decryptable.
    let out = f.output_dir().join("web1").join("db-pw.age");
    let text = decrypt_file(&out, &host_identity);
    assert!(text.contains("dummy value for web1/db-pw"));
}

#[test]
fn test_abort_leaves_previous_output_untouched() {
    let f = Fixture::new();
    let stranger = age::x25519::Identity::generate();
    f.write_secret_for("secrets/db-pw.age", "unreachable", &[stranger.to_public()]);
    let (_, pubkey) = host_key();

    // Pre-existing authoritative output from an earlier run.
    let host_dir = f.output_dir().join("web1");
    fs::create_dir_all(&host_dir).unwrap();
    fs::write(host_dir.join("db-pw.age"), "previous contents").unwrap();

    let manifest = f.manifest(&format!(
        r#"
[hosts.web1]
pubkey = "{pubkey}"

[hosts.web1.secrets.db-pw]
source = "secrets/db-pw.age"
"#
    ));

    let state = quiet_state(vec![Decision::Abort]);
    let result = rekey_hosts(&manifest, &f.masters(), &state, &[]);
    assert!(matches!(result, Err(Error::Aborted)));

    // Old output untouched, no staging leftovers.
    assert_eq!(
        fs::read_to_string(host_dir.join("db-pw.age")).unwrap(),
        "previous contents"
    );
    assert!(!f.output_dir().join(".web1.staging").exists());
}

#[test]
fn test_missing_source_ciphertext_is_an_error() {
    let f = Fixture::new();
    let (_, pubkey) = host_key();

    let manifest = f.manifest(&format!(
        r#"
[hosts.web1]
pubkey = "{pubkey}"

[hosts.web1.secrets.db-pw]
source = "secrets/never-created.age"
"#
    ));

    let state = quiet_state(Vec::new());
    let result = rekey_hosts(&manifest, &f.masters(), &state, &[]);
    assert!(matches!(result, Err(Error::MissingCiphertext { .. })));
    assert!(!f.output_dir().join("web1").exists());
}
