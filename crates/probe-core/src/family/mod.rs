//! Task families and the evaluation driver.
//!
//! A [`TaskFamily`] pairs a family's oracle with its samples. The variant is
//! matched once when [`Evaluation::run`] starts; the matching module then
//! drives the whole session through the shared [`Session`] machine.

pub mod circuit;
pub mod code;
pub mod encryption;
pub mod game;
pub mod physics;
pub mod puzzle;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

pub use circuit::CircuitTask;
pub use code::{CodePlatform, CodeTask};
pub use encryption::EncryptionTask;
pub use game::GameTask;
pub use physics::{PhysicsMode, PhysicsTask};
pub use puzzle::PuzzleTask;

use crate::client::ModelClient;
use crate::domain::config::SessionConfig;
use crate::domain::error::Result;
use crate::obs::{self, SessionSpan};
use crate::oracle::Observation;
use crate::score::{ResultSink, ScoreAggregator, ScoreRecord};
use crate::session::{evaluation_banner, AbortHandle, Session, TurnResult};
use crate::transcript::Transcript;

/// Opening of the exploration phase shared by the query/answer families.
pub fn exploration_intro(max_turns: u32) -> String {
    format!(
        "You have {max_turns} interaction turns to understand the black-box. Now the interaction starts. Only output the value and DO NOT contain any unrelated text."
    )
}

/// Builds question prompts. The first question carries the last exploration
/// observation and the evaluation banner.
#[derive(Debug)]
pub(crate) struct Questions {
    opening: Option<String>,
    attempts: u32,
}

impl Questions {
    pub(crate) fn new(pending: Observation, attempts: u32) -> Self {
        Self {
            opening: Some(pending.text),
            attempts,
        }
    }

    pub(crate) fn next(&mut self, question: &str) -> String {
        match self.opening.take() {
            Some(head) => format!(
                "{head}{} Now answer the question: {question}",
                evaluation_banner(self.attempts)
            ),
            None => format!("Answer the question: {question}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

/// One task: a family protocol with its oracle and samples.
#[derive(Clone)]
pub enum TaskFamily {
    Code(CodeTask),
    Encryption(EncryptionTask),
    Physics(PhysicsTask),
    Puzzle(PuzzleTask),
    Game(GameTask),
    Circuit(CircuitTask),
}

impl TaskFamily {
    pub fn name(&self) -> &'static str {
        match self {
            TaskFamily::Code(_) => "code",
            TaskFamily::Encryption(_) => "encryption",
            TaskFamily::Physics(_) => "physics",
            TaskFamily::Puzzle(_) => "puzzle",
            TaskFamily::Game(_) => "game",
            TaskFamily::Circuit(_) => "circuit",
        }
    }

    /// Samples in the task (checkpoints are counted per sample).
    pub fn sample_count(&self) -> usize {
        match self {
            TaskFamily::Code(t) => t.samples.len(),
            TaskFamily::Encryption(t) => t.samples.len(),
            TaskFamily::Physics(t) => t.samples.len(),
            TaskFamily::Puzzle(t) => t.samples.len(),
            TaskFamily::Game(t) => t.samples.len(),
            TaskFamily::Circuit(t) => t.samples.len(),
        }
    }

    async fn drive(&self, session: &mut Session, scores: &mut ScoreAggregator) -> Result<()> {
        match self {
            TaskFamily::Code(t) => code::run(t, session, scores).await,
            TaskFamily::Encryption(t) => encryption::run(t, session, scores).await,
            TaskFamily::Physics(t) => physics::run(t, session, scores).await,
            TaskFamily::Puzzle(t) => puzzle::run(t, session, scores).await,
            TaskFamily::Game(t) => game::run(t, session, scores).await,
            TaskFamily::Circuit(t) => circuit::run(t, session, scores).await,
        }
    }
}

impl std::fmt::Debug for TaskFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFamily")
            .field("family", &self.name())
            .field("samples", &self.sample_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub record: ScoreRecord,
    pub outcomes: Vec<TurnResult>,
    pub aborted: bool,
    pub transcript: Transcript,
}

/// One configured run of a task against a model.
#[derive(Debug, Clone)]
pub struct Evaluation {
    config: SessionConfig,
    family: TaskFamily,
    abort: AbortHandle,
}

impl Evaluation {
    pub fn new(config: SessionConfig, family: TaskFamily) -> Self {
        Self {
            config,
            family,
            abort: AbortHandle::new(),
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn family(&self) -> &TaskFamily {
        &self.family
    }

    /// Run the session to completion or abort.
    ///
    /// Transport and configuration errors end the run without a record. An
    /// abort yields a record over the samples attempted so far.
    pub async fn run(self, client: Arc<dyn ModelClient>) -> Result<SessionReport> {
        let span = SessionSpan::new(&self.config.task_id, &self.config.run_label);
        self.run_inner(client).instrument(span.span()).await
    }

    /// [`run`](Self::run), then append the record to `sink`.
    pub async fn run_to_sink(
        self,
        client: Arc<dyn ModelClient>,
        sink: &dyn ResultSink,
    ) -> Result<SessionReport> {
        let report = self.run(client).await?;
        if let Err(e) = sink.append(&report.record).await {
            obs::emit_sink_error(&e);
            return Err(e);
        }
        Ok(report)
    }

    async fn run_inner(self, client: Arc<dyn ModelClient>) -> Result<SessionReport> {
        let start = Instant::now();
        let mut session = Session::new(self.config.clone(), client)?.with_abort(self.abort.clone());
        let mut scores = ScoreAggregator::new(&self.config);

        obs::emit_session_started(
            &self.config.task_id,
            self.family.name(),
            &self.config.participant.display_name(),
            self.family.sample_count(),
        );

        self.family.drive(&mut session, &mut scores).await?;

        let aborted = session.is_aborted();
        if aborted {
            obs::emit_session_aborted(scores.attempted());
        }
        let (record, outcomes) = scores.finish();
        obs::emit_session_finished(
            record.correct_count,
            record.total_count,
            record.accuracy,
            start.elapsed().as_millis() as u64,
        );

        Ok(SessionReport {
            record,
            outcomes,
            aborted,
            transcript: session.into_transcript(),
        })
    }
}
