//! Interactive decryption with failure recovery.
//!
//! Decrypting a master-encrypted secret can fail for operator reasons (a
//! hardware token left at home, the wrong identity file); that must never
//! kill the run outright. A small finite-state machine drives recovery: each
//! failed attempt asks the operator to retry, abort the whole invocation,
//! substitute a labeled dummy value for this one secret, or substitute
//! dummies for every remaining failure this run.
//!
//! All shared recovery state lives in [`RecoveryState`] with exactly one
//! initialization point; the dummy-all flag is monotonic and visible to every
//! concurrent caller immediately, and the prompt is serialized so parallel
//! host workers never interleave questions on the terminal.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{error, warn};

use crate::core::cipher;
use crate::core::plaintext::Plaintext;
use crate::core::recipient::MasterIdentities;
use crate::error::{Error, Result};

/// Operator decision after a failed decrypt attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Re-attempt the decryption.
    Retry,
    /// Fail the entire invocation with a non-zero exit.
    Abort,
    /// Substitute a labeled placeholder for this secret and continue.
    Dummy,
    /// Like Dummy, and suppress prompts for every later failure this run.
    DummyAll,
}

/// Source of recovery decisions.
///
/// The CLI asks on the terminal; tests and embedders inject a scripted
/// sequence instead.
pub trait RecoveryPrompt: Send + Sync {
    fn choose(&self, what: &str, reason: &str) -> Result<Decision>;
}

/// Terminal prompt backed by dialoguer. The first entry is the default, so an
/// empty input (plain Enter) retries.
pub struct TerminalPrompt;

impl RecoveryPrompt for TerminalPrompt {
    fn choose(&self, what: &str, reason: &str) -> Result<Decision> {
        let items = [
            "retry decryption",
            "abort the whole run",
            "use a dummy value for this secret",
            "use dummy values for all remaining failures",
        ];
        let selection = dialoguer::Select::new()
            .with_prompt(format!("could not decrypt {} ({})", what, reason))
            .items(&items)
            .default(0)
            .interact()?;

        Ok(match selection {
            0 => Decision::Retry,
            1 => Decision::Abort,
            2 => Decision::Dummy,
            _ => Decision::DummyAll,
        })
    }
}

/// Pre-recorded decisions, consumed in order. Running out of decisions is an
/// error rather than a silent retry, so tests catch unexpected prompts.
pub struct ScriptedPrompt {
    decisions: Mutex<Vec<Decision>>,
}

impl ScriptedPrompt {
    pub fn new(mut decisions: Vec<Decision>) -> Self {
        decisions.reverse();
        Self {
            decisions: Mutex::new(decisions),
        }
    }
}

impl RecoveryPrompt for ScriptedPrompt {
    fn choose(&self, what: &str, _reason: &str) -> Result<Decision> {
        self.decisions
            .lock()
            .map_err(|_| Error::Internal("scripted prompt lock poisoned".into()))?
            .pop()
            .ok_or_else(|| Error::Internal(format!("unexpected recovery prompt for {}", what)))
    }
}

/// Process-wide recovery state, created once per invocation.
///
/// Holds the monotonic dummy-all flag, the abort flag that cancels all
/// in-flight work, and the mutex serializing terminal interaction. Dropped at
/// process exit together with the pipeline that owns it.
pub struct RecoveryState {
    prompt: Box<dyn RecoveryPrompt>,
    dummy_all: AtomicBool,
    aborted: AtomicBool,
    terminal: Mutex<()>,
}

impl RecoveryState {
    pub fn new(prompt: Box<dyn RecoveryPrompt>) -> Self {
        Self {
            prompt,
            dummy_all: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            terminal: Mutex::new(()),
        }
    }

    /// True once any caller selected abort; parallel workers poll this
    /// between operations and wind down without swapping anything.
    pub fn abort_requested(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn dummy_all(&self) -> bool {
        self.dummy_all.load(Ordering::SeqCst)
    }

    fn request_abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn set_dummy_all(&self) {
        self.dummy_all.store(true, Ordering::SeqCst);
    }
}

/// Outcome of an interactive decrypt: either the real plaintext or a labeled
/// placeholder the operator chose to continue with.
pub enum Decrypted {
    Real(Plaintext),
    Dummy(Plaintext),
}

impl Decrypted {
    pub fn plaintext(&self) -> &Plaintext {
        match self {
            Decrypted::Real(p) | Decrypted::Dummy(p) => p,
        }
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self, Decrypted::Dummy(_))
    }
}

/// Recovery state machine states.
enum State {
    Trying,
    AwaitingDecision(String),
    DummyFallback,
    Aborted,
}

/// Decrypt one ciphertext file under the master identities, recovering from
/// failures interactively.
///
/// `what` identifies the secret and host (`web1/db-pw`) in prompts and the
/// single diagnostic line written to the error stream per failure. Plaintext
/// never appears in any output.
pub fn decrypt_with_recovery(
    ciphertext_path: &Path,
    masters: &MasterIdentities,
    what: &str,
    state: &RecoveryState,
) -> Result<Decrypted> {
    let mut machine = State::Trying;

    loop {
        machine = match machine {
            State::Trying => {
                if state.abort_requested() {
                    State::Aborted
                } else {
                    let ciphertext = fs::read_to_string(ciphertext_path)?;
                    match cipher::decrypt(&ciphertext, masters.identities()) {
                        Ok(plaintext) => return Ok(Decrypted::Real(plaintext)),
                        Err(Error::DecryptFailed(reason)) => {
                            error!("decryption failed for {}: {}", what, reason);
                            if state.dummy_all() {
                                State::DummyFallback
                            } else {
                                State::AwaitingDecision(reason)
                            }
                        }
                        Err(other) => return Err(other),
                    }
                }
            }

            State::AwaitingDecision(reason) => {
                // One prompt at a time across all workers.
                let _guard = state
                    .terminal
                    .lock()
                    .map_err(|_| Error::Internal("terminal lock poisoned".into()))?;

                // Another worker may have decided for us while we waited.
                if state.abort_requested() {
                    State::Aborted
                } else if state.dummy_all() {
                    State::DummyFallback
                } else {
                    match state.prompt.choose(what, &reason)? {
                        Decision::Retry => State::Trying,
                        Decision::Abort => {
                            state.request_abort();
                            State::Aborted
                        }
                        Decision::Dummy => State::DummyFallback,
                        Decision::DummyAll => {
                            state.set_dummy_all();
                            State::DummyFallback
                        }
                    }
                }
            }

            State::DummyFallback => {
                warn!("substituting dummy value for {}", what);
                return Ok(Decrypted::Dummy(dummy_plaintext(what)));
            }

            State::Aborted => return Err(Error::Aborted),
        };
    }
}

/// The clearly-labeled placeholder written when decryption cannot succeed.
pub fn dummy_plaintext(what: &str) -> Plaintext {
    Plaintext::from(format!(
        "relock dummy value for {} (substituted {}); replace before deployment\n",
        what,
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ))
}
