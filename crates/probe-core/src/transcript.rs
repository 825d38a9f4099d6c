//! Conversation transcript with a working view and an audit history.
//!
//! Two logs are kept in lockstep:
//!
//! - the **working** transcript is what the model sees; malformed exchanges
//!   are surgically removed from it;
//! - the **history** is append-only and never edited.
//!
//! # Invariants
//!
//! Every turn ever appended to the working transcript is also in the
//! history, in the same relative order. Retractions only touch the
//! *unconfirmed* tail of the working transcript: once [`Transcript::confirm`]
//! has been called (after priming, after each scored question) those turns
//! can no longer be retracted. [`Transcript::rewind`] is the one explicit
//! escape hatch, used to reset the model's context between independent
//! puzzles or games.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Reasoning trace returned alongside an answer. History only.
    Thinking,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Thinking => write!(f, "thinking"),
        }
    }
}

/// A single role-tagged entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Opaque position in the working transcript, see [`Transcript::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptMark(usize);

/// Violations of the transcript editing invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("cannot retract {requested} entries: only {available} unconfirmed")]
    RetractConfirmed { requested: usize, available: usize },

    #[error("mark {mark} lies beyond the working transcript ({len} entries)")]
    MarkOutOfRange { mark: usize, len: usize },
}

/// Working transcript plus append-only history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    working: Vec<Turn>,
    history: Vec<Turn>,
    /// Length of the confirmed prefix of `working`.
    confirmed: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the fixed priming sequence and confirm it.
    ///
    /// An empty `system_prompt` is omitted.
    pub fn primed(system_prompt: &str, task_intro: &str, acknowledgement: &str) -> Self {
        let mut transcript = Self::new();
        if !system_prompt.is_empty() {
            transcript.push(Role::System, system_prompt);
        }
        transcript.push(Role::User, task_intro);
        transcript.push(Role::Assistant, acknowledgement);
        transcript.confirm();
        transcript
    }

    /// Append to both logs.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        let turn = Turn::new(role, content);
        self.history.push(turn.clone());
        self.working.push(turn);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content);
    }

    /// Record a reasoning trace. Never shown back to the model.
    pub fn record_thinking(&mut self, content: impl Into<String>) {
        self.history.push(Turn::new(Role::Thinking, content));
    }

    /// What the model sees.
    pub fn working(&self) -> &[Turn] {
        &self.working
    }

    /// Everything that ever happened.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn last(&self) -> Option<&Turn> {
        self.working.last()
    }

    /// Mark every current working entry as confirmed.
    pub fn confirm(&mut self) {
        self.confirmed = self.working.len();
    }

    /// Number of working entries that may still be retracted.
    pub fn unconfirmed(&self) -> usize {
        self.working.len() - self.confirmed
    }

    /// Remove the `n` most recent working entries.
    ///
    /// # Errors
    ///
    /// `TranscriptError::RetractConfirmed` if that would reach into the
    /// confirmed prefix. Nothing is removed in that case.
    pub fn retract(&mut self, n: usize) -> Result<Vec<Turn>, TranscriptError> {
        let available = self.unconfirmed();
        if n > available {
            return Err(TranscriptError::RetractConfirmed {
                requested: n,
                available,
            });
        }
        let at = self.working.len() - n;
        Ok(self.working.split_off(at))
    }

    /// Remove the `n` working entries just before the most recent one.
    ///
    /// Used after a corrective re-prompt: `[.., prompt, bad, reminder, good]`
    /// becomes `[.., prompt, good]` with `supersede(2)`.
    ///
    /// # Errors
    ///
    /// Same contract as [`retract`](Self::retract), counting the kept entry.
    pub fn supersede(&mut self, n: usize) -> Result<Vec<Turn>, TranscriptError> {
        let available = self.unconfirmed();
        if n + 1 > available {
            return Err(TranscriptError::RetractConfirmed {
                requested: n,
                available: available.saturating_sub(1),
            });
        }
        let end = self.working.len() - 1;
        Ok(self.working.drain(end - n..end).collect())
    }

    /// Current position in the working transcript.
    pub fn mark(&self) -> TranscriptMark {
        TranscriptMark(self.working.len())
    }

    /// Truncate the working transcript back to `mark`.
    ///
    /// Unlike [`retract`](Self::retract) this may drop confirmed turns; it is
    /// how independent puzzles/games are given a fresh context. History is
    /// untouched.
    pub fn rewind(&mut self, mark: TranscriptMark) -> Result<(), TranscriptError> {
        if mark.0 > self.working.len() {
            return Err(TranscriptError::MarkOutOfRange {
                mark: mark.0,
                len: self.working.len(),
            });
        }
        self.working.truncate(mark.0);
        self.confirmed = self.confirmed.min(mark.0);
        Ok(())
    }

    /// SHA-256 hex digest of the serialized history.
    pub fn history_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for turn in &self.history {
            hasher.update(turn.role.to_string().as_bytes());
            hasher.update([0u8]);
            hasher.update(turn.content.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}
