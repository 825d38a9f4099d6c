//! Structured observability hooks for probe session lifecycle events.
//!
//! This module provides:
//! - Session-scoped tracing spans via [`SessionSpan`]
//! - Emission functions for key lifecycle events: start, exchange, format
//!   rejection, judgement, per-sample score, abort, finish
//!
//! Events are emitted at `info!` level with an `event` field so they can be
//! filtered in JSON log pipelines (`PROBE_LOG_FORMAT=json` in the CLI).

use tracing::{info, warn, Span};

/// Session-scoped span tagging every event with `task_id` and `run_label`.
///
/// Sync code enters it with [`SessionSpan::enter`]; async code attaches it
/// with `tracing::Instrument::instrument(fut, span.span())`.
#[derive(Debug, Clone)]
pub struct SessionSpan {
    span: Span,
}

impl SessionSpan {
    pub fn new(task_id: &str, run_label: &str) -> Self {
        Self {
            span: tracing::info_span!("probe.session", task_id = %task_id, run_label = %run_label),
        }
    }

    /// Enter the span until the returned guard is dropped.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

/// Emit event: session started.
///
/// ```ignore
/// emit_session_started("caesar_cipher", "encryption", "gpt-4o", 5);
/// // logs: event=session.started task_id=caesar_cipher family=encryption ...
/// ```
pub fn emit_session_started(task_id: &str, family: &str, participant: &str, samples: usize) {
    info!(
        event = "session.started",
        task_id = %task_id,
        family = %family,
        participant = %participant,
        samples = samples,
    );
}

/// Emit event: one prompt/reply exchange with the model.
pub fn emit_exchange(seq: u64, prompt_chars: usize, reply_chars: usize) {
    info!(
        event = "session.exchange",
        seq = seq,
        prompt_chars = prompt_chars,
        reply_chars = reply_chars,
    );
}

/// Emit event: a reply failed its format grammar and a reminder was sent.
pub fn emit_format_rejected(reason: &str, reminder: u32) {
    info!(event = "answer.format_rejected", reason = %reason, reminder = reminder);
}

/// Emit event: a format-valid (or cap-exhausted) answer was judged.
pub fn emit_answer_judged(attempt: u32, correct: bool) {
    info!(event = "answer.judged", attempt = attempt, correct = correct);
}

/// Emit event: one sample/checkpoint/game received its final credit.
pub fn emit_sample_scored(label: &str, credit: f64, attempts: u32) {
    info!(
        event = "sample.scored",
        label = %label,
        credit = credit,
        attempts = attempts,
    );
}

/// Emit event: the host aborted the session between turns.
pub fn emit_session_aborted(attempted: usize) {
    warn!(event = "session.aborted", attempted = attempted);
}

/// Emit event: session finished with its aggregate.
pub fn emit_session_finished(correct: f64, total: usize, accuracy: f64, duration_ms: u64) {
    info!(
        event = "session.finished",
        correct = correct,
        total = total,
        accuracy = accuracy,
        duration_ms = duration_ms,
    );
}

/// Emit event: the result sink failed (warning level).
pub fn emit_sink_error(error: &dyn std::fmt::Display) {
    warn!(event = "sink.error", error = %error);
}
