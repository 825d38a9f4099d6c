//! One probe session: the transcript, the model and the retry machine.
//!
//! Every task family drives the same two phases through a [`Session`]:
//!
//! 1. **Exploration** ([`Session::explore`]): a bounded number of free
//!    queries, each answered by an oracle observation. The observation for
//!    the last query is not sent on its own; it is returned so it can head
//!    the phase-change prompt.
//! 2. **Answering** ([`Session::answer`]): per question, up to
//!    `failure_num + 1` scored attempts. Each attempt is format-checked
//!    first, with at most `format_retry_cap` corrective reminders; a reply
//!    still malformed after that counts as a wrong answer.
//!
//! Scored questions close with a fixed acknowledgement pair and are then
//! confirmed in the transcript, so later corrections can never reach them.
//!
//! The host may stop a session through an [`AbortHandle`]. It is checked
//! at every turn boundary; work already scored is kept.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::ModelClient;
use crate::domain::config::SessionConfig;
use crate::domain::error::Result;
use crate::obs;
use crate::oracle::Observation;
use crate::transcript::{Transcript, TranscriptMark};
use crate::validator::ActionValidator;

pub const WRONG_ANSWER_PROMPT: &str =
    "Your answer is wrong. Please try again. DO NOT output any other text, ONLY output the answer.";
pub const CORRECT_ACK: &str = "Your answer is correct. Let's move to next question.";
pub const WRONG_ACK: &str = "Your answer is wrong. Let's move to next question.";
pub const OK_REPLY: &str = "Ok.";

/// `<Current Turn: 3, 7 Turns Remaining> {text}`
pub fn frame_turn(turn: u32, total: u32, text: &str) -> String {
    format!(
        "<Current Turn: {turn}, {} Turns Remaining> {text}",
        total.saturating_sub(turn)
    )
}

/// Banner opening the answer phase.
pub fn evaluation_banner(attempts: u32) -> String {
    format!(
        "\n********Evaluation Starts, You Have {attempts} Chances for Answering Each Question********\n"
    )
}

// ---------------------------------------------------------------------------
// Abort
// ---------------------------------------------------------------------------

/// Cooperative stop signal shared between host and session.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Verdict on one format-valid answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Judgement {
    Correct,
    /// Wrong. The feedback, if any, replaces the generic retry prompt.
    Wrong(Option<String>),
}

impl Judgement {
    pub fn from_bool(correct: bool) -> Self {
        if correct {
            Judgement::Correct
        } else {
            Judgement::Wrong(None)
        }
    }

    pub fn wrong_with(feedback: impl Into<String>) -> Self {
        Judgement::Wrong(Some(feedback.into()))
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Judgement::Correct)
    }
}

/// Outcome of one answered question, before it is labelled.
#[derive(Debug, Clone, PartialEq)]
pub struct Answered {
    pub is_correct: bool,
    pub attempts_used: u32,
    pub format_failures: u32,
    /// Raw text of the last reply judged.
    pub last_reply: String,
    /// Feedback of the last wrong judgement.
    pub feedback: Option<String>,
}

impl Answered {
    pub fn into_turn(self, label: impl Into<String>) -> TurnResult {
        TurnResult {
            label: label.into(),
            is_correct: self.is_correct,
            credit: if self.is_correct { 1.0 } else { 0.0 },
            observation: self.last_reply,
            attempts_used: self.attempts_used,
            format_failures: self.format_failures,
        }
    }
}

/// Scored outcome of one sample, checkpoint or game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Which question this was, e.g. `sample 2, checkpoint (1, 3)`.
    pub label: String,
    pub is_correct: bool,
    /// 1.0/0.0 for exact-match families; normalised score for games.
    pub credit: f64,
    /// Final answer text or feedback summary.
    pub observation: String,
    pub attempts_used: u32,
    pub format_failures: u32,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Exclusive pairing of one transcript with one model.
pub struct Session {
    config: SessionConfig,
    transcript: Transcript,
    client: Arc<dyn ModelClient>,
    abort: AbortHandle,
    exchanges: u64,
}

impl Session {
    /// Validate `config` and build the primed transcript.
    pub fn new(config: SessionConfig, client: Arc<dyn ModelClient>) -> Result<Self> {
        config.validate()?;
        let transcript =
            Transcript::primed(&config.system_prompt, &config.task_intro, &config.acknowledgement);
        Ok(Self {
            config,
            transcript,
            client,
            abort: AbortHandle::new(),
            exchanges: 0,
        })
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Model calls made so far.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Send `prompt`, record and return the reply text.
    ///
    /// A reply without text is recorded as an empty assistant turn and
    /// returned as `""`; validators treat it as a format error.
    pub async fn ask(&mut self, prompt: impl Into<String>) -> Result<String> {
        let prompt = prompt.into();
        let prompt_chars = prompt.chars().count();
        self.transcript.push_user(prompt);

        let reply = self.client.respond(self.transcript.working()).await?;
        if let Some(thinking) = reply.thinking.filter(|t| !t.is_empty()) {
            self.transcript.record_thinking(thinking);
        }
        let text = reply.text.unwrap_or_default();

        self.exchanges += 1;
        obs::emit_exchange(self.exchanges, prompt_chars, text.chars().count());
        self.transcript.push_assistant(text.clone());
        Ok(text)
    }

    /// Send a corrective prompt. Once answered, the reply it corrects and
    /// the reminder itself leave the working transcript.
    pub async fn remind(&mut self, reminder: impl Into<String>) -> Result<String> {
        let reply = self.ask(reminder).await?;
        self.transcript.supersede(2)?;
        Ok(reply)
    }

    /// Append a canned user/assistant pair without calling the model.
    pub fn inject(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.transcript.push_user(user);
        self.transcript.push_assistant(assistant);
    }

    /// Append the closing pair of a scored question and confirm everything.
    pub fn conclude(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.inject(user, assistant);
        self.transcript.confirm();
    }

    /// [`conclude`](Self::conclude) with the standard acknowledgement.
    pub fn acknowledge(&mut self, correct: bool) {
        let ack = if correct { CORRECT_ACK } else { WRONG_ACK };
        self.conclude(ack, OK_REPLY);
    }

    pub fn confirm(&mut self) {
        self.transcript.confirm();
    }

    pub fn mark(&self) -> TranscriptMark {
        self.transcript.mark()
    }

    pub fn rewind(&mut self, mark: TranscriptMark) -> Result<()> {
        self.transcript.rewind(mark)?;
        Ok(())
    }

    /// Run an exploration phase.
    ///
    /// `intro` is sent first. Each reply is passed to `observe` with its
    /// 1-based query number; the observation becomes the next prompt. After
    /// `queries` replies the final observation is returned unsent. When an
    /// observation is flagged rejected, the malformed reply and the rejection
    /// are removed from the working transcript once the model has answered.
    ///
    /// Returns `None` when the session was aborted.
    pub async fn explore<F>(&mut self, intro: String, queries: u32, mut observe: F) -> Result<Option<Observation>>
    where
        F: FnMut(u32, &str) -> Observation,
    {
        let mut pending = Observation::accepted(intro);
        for query in 1..=queries {
            if self.is_aborted() {
                return Ok(None);
            }
            let reply = self.ask(pending.text.clone()).await?;
            if pending.rejected {
                self.transcript.supersede(2)?;
            }
            pending = observe(query, &reply);
        }
        Ok(Some(pending))
    }

    /// Ask one scored question.
    ///
    /// `reminder` is the family's corrective prompt for malformed output.
    /// `judge` is only ever called with format-valid actions.
    pub async fn answer<V, J>(
        &mut self,
        prompt: String,
        validator: &V,
        reminder: &str,
        mut judge: J,
    ) -> Result<Answered>
    where
        V: ActionValidator + ?Sized,
        J: FnMut(&V::Action) -> Judgement,
    {
        let allowed = self.config.answer_attempts();
        let cap = self.config.format_retry_cap;
        let mut prompt = prompt;
        let mut attempts = 0;
        let mut format_failures = 0;

        loop {
            attempts += 1;
            let mut reply = self.ask(prompt).await?;
            let mut action = validator.validate(&reply);

            let mut reminders = 0;
            while let Err(err) = &action {
                if reminders >= cap || self.is_aborted() {
                    break;
                }
                reminders += 1;
                format_failures += 1;
                obs::emit_format_rejected(&err.reason, reminders);
                reply = self.remind(reminder).await?;
                action = validator.validate(&reply);
            }
            if action.is_err() {
                format_failures += 1;
            }

            let judgement = match &action {
                Ok(action) => judge(action),
                Err(_) => Judgement::Wrong(None),
            };
            let correct = judgement.is_correct();
            obs::emit_answer_judged(attempts, correct);

            let feedback = match judgement {
                Judgement::Correct => None,
                Judgement::Wrong(feedback) => feedback,
            };
            if correct || attempts >= allowed || self.is_aborted() {
                return Ok(Answered {
                    is_correct: correct,
                    attempts_used: attempts,
                    format_failures,
                    last_reply: reply,
                    feedback,
                });
            }
            prompt = feedback.unwrap_or_else(|| WRONG_ANSWER_PROMPT.to_string());
        }
    }
}
