//! Code family: the model sets inputs and inspects checkpoints of a hidden
//! instrumented function, then predicts variable values at checkpoints.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::checkpoint::{answer_text, capture, Bindings, CaptureError, InstrumentedFunction};
use crate::domain::error::{ProbeError, Result};
use crate::domain::sample::{CodeSample, SampleSet};
use crate::oracle::Observation;
use crate::score::ScoreAggregator;
use crate::session::{frame_turn, Judgement, Session};
use crate::validator::NonEmptyValidator;

use super::Questions;

pub const FORMAT_REMINDER: &str =
    "You must only output the value of the variable, without any other unrelated text. Please try again.";

const USAGE: &str = "Invalid input format. Please use one of the following formats:\n\
1. Empty string to get function parameters and checkpoint info\n\
2. \"variable_name_1 = value_1; variable_name_2 = value_2; ...\" to set variables\n\
3. \"(idx, iter)\" to execute the blackbox with checkpoint indices";

static CHECKPOINT_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\s*(\d+)\s*,\s*(\d+)\s*\)").expect("valid regex"));

#[derive(Clone)]
pub struct CodeTask {
    pub function: Arc<dyn InstrumentedFunction>,
    pub samples: SampleSet<CodeSample>,
}

impl CodeTask {
    pub fn new(function: Arc<dyn InstrumentedFunction>, samples: SampleSet<CodeSample>) -> Self {
        Self { function, samples }
    }
}

// ---------------------------------------------------------------------------
// Exploration platform
// ---------------------------------------------------------------------------

/// The interactive front of an instrumented function.
///
/// Understands three commands: an empty query describes the function, `a =
/// 1; b = [2]` sets inputs, and `(idx, iter)` runs the function and reports
/// the locals at that checkpoint visit. Bindings persist across commands.
pub struct CodePlatform<'a> {
    function: &'a dyn InstrumentedFunction,
    bindings: Bindings,
}

impl<'a> CodePlatform<'a> {
    pub fn new(function: &'a dyn InstrumentedFunction) -> Self {
        Self {
            function,
            bindings: Bindings::new(),
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn handle(&mut self, query: &str) -> Observation {
        let query = query.trim();
        if query.is_empty() {
            return Observation::accepted(self.describe());
        }
        if query.contains('=') {
            return self.assign(query);
        }
        if let Some(caps) = CHECKPOINT_QUERY.captures(query) {
            let (Ok(index), Ok(iteration)) = (caps[1].parse::<usize>(), caps[2].parse::<u32>())
            else {
                return Observation::rejected(USAGE);
            };
            return match capture(self.function, &self.bindings, index, iteration) {
                Ok(snapshot) => Observation::accepted(snapshot.render()),
                Err(CaptureError::Unreachable(msg)) => Observation::accepted(msg),
                Err(CaptureError::Invocation(msg)) => {
                    Observation::rejected(format!("Error executing blackbox: {msg}"))
                }
            };
        }
        Observation::rejected(USAGE)
    }

    fn describe(&self) -> String {
        let params: Vec<String> = self
            .function
            .parameters()
            .iter()
            .map(ToString::to_string)
            .collect();
        format!(
            "The black-box takes [{}] as input variables, and has {} checkpoints.",
            params.join(", "),
            self.function.checkpoint_count()
        )
    }

    /// Assignments apply left to right and stop at the first bad one.
    fn assign(&mut self, query: &str) -> Observation {
        for assignment in query.split(';').filter(|a| !a.trim().is_empty()) {
            let Some((name, raw)) = assignment.split_once('=') else {
                return Observation::rejected(format!(
                    "Error parsing assignment: {assignment}. missing '='"
                ));
            };
            let name = name.trim();
            let Some(param) = self.function.parameters().iter().find(|p| p.name == name) else {
                return Observation::rejected(format!(
                    "Error: The variable name {name} is not in the function parameters"
                ));
            };
            match param.kind.parse_literal(raw) {
                Ok(value) => self.bindings.insert(name, value),
                Err(e) => {
                    return Observation::rejected(format!(
                        "Error parsing assignment: {assignment}. {e}"
                    ))
                }
            }
        }
        Observation::accepted(format!("Set {}.", self.bindings))
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

struct Question {
    label: String,
    prompt: String,
    truth: String,
}

/// Ground truth for every checkpoint, each from fresh trackers.
fn questions(task: &CodeTask) -> Result<Vec<Question>> {
    let mut out = Vec::new();
    for (i, sample) in task.samples.iter().enumerate() {
        let bindings = sample.bindings();
        for q in &sample.checkpoints {
            let snapshot = capture(task.function.as_ref(), &bindings, q.index, q.iteration)
                .map_err(|e| {
                    ProbeError::config(format!(
                        "sample {i} checkpoint ({}, {}): {e}",
                        q.index, q.iteration
                    ))
                })?;
            let value = snapshot.get(&q.variable).ok_or_else(|| {
                ProbeError::config(format!(
                    "sample {i} checkpoint ({}, {}): no local named {}",
                    q.index, q.iteration, q.variable
                ))
            })?;
            out.push(Question {
                label: format!("sample {i} ({}, {}) {}", q.index, q.iteration, q.variable),
                prompt: format!(
                    "When the input variables of the blackbox are {bindings}, what's the value for {} at checkpoint ({}, {})?",
                    q.variable, q.index, q.iteration
                ),
                truth: answer_text(value),
            });
        }
    }
    Ok(out)
}

fn squeeze(text: &str) -> String {
    text.split_whitespace().collect()
}

pub(super) async fn run(
    task: &CodeTask,
    session: &mut Session,
    scores: &mut ScoreAggregator,
) -> Result<()> {
    let planned = questions(task)?;
    let max_turns = session.config().max_turns;
    let attempts = session.config().answer_attempts();

    let mut platform = CodePlatform::new(task.function.as_ref());
    let intro = frame_turn(1, max_turns, &platform.handle("").text);
    let explored = session
        .explore(intro, max_turns.saturating_sub(1), |turn, reply| {
            let observation = platform.handle(reply);
            Observation {
                text: frame_turn(turn + 1, max_turns, &observation.text),
                rejected: observation.rejected,
            }
        })
        .await?;
    let Some(pending) = explored else {
        return Ok(());
    };

    let mut prompts = Questions::new(pending, attempts);
    for question in planned {
        if session.is_aborted() {
            break;
        }
        let truth = squeeze(&question.truth);
        let answered = session
            .answer(
                prompts.next(&question.prompt),
                &NonEmptyValidator,
                FORMAT_REMINDER,
                |reply: &String| Judgement::from_bool(squeeze(reply) == truth),
            )
            .await?;
        session.acknowledge(answered.is_correct);
        scores.record(answered.into_turn(question.label));
    }
    Ok(())
}
