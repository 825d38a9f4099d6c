//! Session configuration: who is probed, on what, with which budgets.

use serde::{Deserialize, Serialize};

use super::error::{ProbeError, Result};

/// Assistant stub that closes the priming sequence.
pub const DEFAULT_ACKNOWLEDGEMENT: &str =
    "I understand the rules. I will not output any unrelated text! Let us start the interaction.";

/// Task difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Baseline,
    Easy,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Baseline => write!(f, "baseline"),
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "baseline" => Ok(Difficulty::Baseline),
            "easy" => Ok(Difficulty::Easy),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ProbeError::config(format!("unknown difficulty: {other}"))),
        }
    }
}

/// The model under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Vendor family label (e.g. "gpt", "qwen"). Reporting only.
    pub family: String,

    /// Model name as configured by the operator.
    pub name: String,

    /// Whether the model runs with extended reasoning enabled.
    #[serde(default)]
    pub thinking: bool,
}

impl Participant {
    pub fn new(family: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            name: name.into(),
            thinking: false,
        }
    }

    pub fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }

    /// Name used in score records; thinking runs are reported separately.
    pub fn display_name(&self) -> String {
        if self.thinking {
            format!("{}_thinking", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Everything the controller needs besides the collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub difficulty: Difficulty,

    /// Task identifier within the family (e.g. "caesar_cipher").
    pub task_id: String,

    pub participant: Participant,

    /// Label of this run, e.g. "run_1".
    pub run_label: String,

    /// Exploration budget (queries, practice matches, or puzzle queries).
    pub max_turns: u32,

    /// Extra wrong-answer attempts tolerated per question.
    pub failure_num: u32,

    /// Corrective re-prompts allowed per exchange for malformed output.
    pub format_retry_cap: u32,

    /// System prompt placed first in the transcript.
    pub system_prompt: String,

    /// Task introduction sent as the first user turn.
    pub task_intro: String,

    /// Assistant stub closing the priming sequence.
    pub acknowledgement: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Easy,
            task_id: String::new(),
            participant: Participant::new("unknown", "unknown"),
            run_label: "run_1".to_string(),
            max_turns: 10,
            failure_num: 0,
            format_retry_cap: 2,
            system_prompt: String::new(),
            task_intro: String::new(),
            acknowledgement: DEFAULT_ACKNOWLEDGEMENT.to_string(),
        }
    }
}

impl SessionConfig {
    /// Create a config for a task with default budgets.
    pub fn new(task_id: impl Into<String>, participant: Participant) -> Self {
        Self {
            task_id: task_id.into(),
            participant,
            ..Self::default()
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_failure_num(mut self, failure_num: u32) -> Self {
        self.failure_num = failure_num;
        self
    }

    pub fn with_run_label(mut self, run_label: impl Into<String>) -> Self {
        self.run_label = run_label.into();
        self
    }

    pub fn with_prompts(mut self, system_prompt: impl Into<String>, task_intro: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self.task_intro = task_intro.into();
        self
    }

    /// Total scoring attempts per question (`failure_num + 1`).
    pub fn answer_attempts(&self) -> u32 {
        self.failure_num + 1
    }

    /// Reject configurations that cannot produce a meaningful session.
    ///
    /// # Errors
    ///
    /// `ProbeError::Configuration` when the task id or run label is empty.
    pub fn validate(&self) -> Result<()> {
        if self.task_id.trim().is_empty() {
            return Err(ProbeError::config("task_id must not be empty"));
        }
        if self.run_label.trim().is_empty() {
            return Err(ProbeError::config("run_label must not be empty"));
        }
        Ok(())
    }
}
