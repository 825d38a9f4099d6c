//! Physics family: query positions at chosen times, then predict positions
//! (coordinates mode) or submit a program computing them (program mode).

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::{exploration_intro, Questions};
use crate::domain::error::Result;
use crate::domain::sample::{PhysicsSample, SampleSet};
use crate::obs;
use crate::oracle::{Coordinates, MotionOracle, Observation};
use crate::sandbox::{CodeSandbox, SandboxOutcome};
use crate::score::ScoreAggregator;
use crate::session::{frame_turn, Judgement, Session, TurnResult, OK_REPLY};
use crate::validator::CoordinateValidator;

/// Per-coordinate absolute tolerance.
pub const TOLERANCE: f64 = 0.01;

/// Time at which a submitted program is probed before it is scored.
pub const PROBE_TIME: f64 = 1.0;

pub const FORMAT_REMINDER: &str = "Strictly follow the output format `{\"object1\": (x, y, z), \"object2\": (x, y, z), ...}`. Please try again.";

const MISSING_RETURN: &str = "The output code must **return the coordinates of each object**. Please try again. DO NOT output any other text, ONLY output the code.";

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:python|py)?[^\n]*\n(.*?)```").expect("valid regex"));

/// What the model is asked to produce after exploring.
#[derive(Clone)]
pub enum PhysicsMode {
    /// A coordinate dict per sample time.
    Coordinates,
    /// One `solution(t)` program, run in the sandbox for every sample time.
    Program(Arc<dyn CodeSandbox>),
}

#[derive(Clone)]
pub struct PhysicsTask {
    pub oracle: Arc<dyn MotionOracle>,
    pub samples: SampleSet<PhysicsSample>,
    pub mode: PhysicsMode,
}

impl PhysicsTask {
    pub fn new(oracle: Arc<dyn MotionOracle>, samples: SampleSet<PhysicsSample>) -> Self {
        Self {
            oracle,
            samples,
            mode: PhysicsMode::Coordinates,
        }
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.mode = PhysicsMode::Program(sandbox);
        self
    }
}

/// Exploration query: a time. Negative times clamp to zero and anything
/// unparseable reads as zero.
fn parse_time(reply: &str) -> f64 {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .map_or(0.0, |t| t.max(0.0))
}

fn object_list(indices: &[usize]) -> String {
    indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(super) async fn run(
    task: &PhysicsTask,
    session: &mut Session,
    scores: &mut ScoreAggregator,
) -> Result<()> {
    let max_turns = session.config().max_turns;
    let oracle = task.oracle.as_ref();

    let explored = session
        .explore(exploration_intro(max_turns), max_turns, |turn, reply| {
            let positions = oracle.positions(parse_time(reply));
            Observation::accepted(frame_turn(turn, max_turns, &positions.to_string()))
        })
        .await?;
    let Some(pending) = explored else {
        return Ok(());
    };

    match &task.mode {
        PhysicsMode::Coordinates => answer_coordinates(task, session, scores, pending).await,
        PhysicsMode::Program(sandbox) => {
            answer_program(task, sandbox.as_ref(), session, scores, pending).await
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinates mode
// ---------------------------------------------------------------------------

async fn answer_coordinates(
    task: &PhysicsTask,
    session: &mut Session,
    scores: &mut ScoreAggregator,
    pending: Observation,
) -> Result<()> {
    let mut questions = Questions::new(pending, session.config().answer_attempts());
    for sample in &task.samples {
        if session.is_aborted() {
            break;
        }
        let truth = task.oracle.positions(sample.time);
        let prompt = questions.next(&format!(
            "What is the coordinate of each object at time {}?",
            sample.time
        ));
        let answered = session
            .answer(prompt, &CoordinateValidator, FORMAT_REMINDER, |answer: &Coordinates| {
                let wrong = answer.mismatches(&truth, TOLERANCE);
                if wrong.is_empty() {
                    Judgement::Correct
                } else {
                    Judgement::wrong_with(format!(
                        "Your answer for object{} is wrong. Please try again. DO NOT output any other text, ONLY output the answer.",
                        object_list(&wrong)
                    ))
                }
            })
            .await?;
        session.acknowledge(answered.is_correct);
        scores.record(answered.into_turn(format!("time {}", sample.time)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Program mode
// ---------------------------------------------------------------------------

/// The program inside the first code fence, or the whole reply.
pub fn extract_program(reply: &str) -> String {
    match CODE_FENCE.captures(reply) {
        Some(caps) => caps[1].to_string(),
        None => reply.trim().to_string(),
    }
}

/// Verdict for one sample time.
#[derive(Debug, Clone, PartialEq)]
struct TimeCheck {
    time: f64,
    wrong: Vec<usize>,
}

impl TimeCheck {
    fn is_correct(&self) -> bool {
        self.wrong.is_empty()
    }

    fn feedback(&self) -> String {
        if self.is_correct() {
            format!("Your answer for time {} is correct.", self.time)
        } else {
            format!(
                "Your answer for object{} at time {} is wrong.",
                object_list(&self.wrong),
                self.time
            )
        }
    }
}

/// Run one submission until it executes or the format cap is spent.
///
/// Returns the per-time results, or `None` when the program never ran.
async fn execute(
    session: &mut Session,
    sandbox: &dyn CodeSandbox,
    reply: String,
    times: &[f64],
) -> Result<Option<Vec<Coordinates>>> {
    let cap = session.config().format_retry_cap;
    let mut reply = reply;
    let mut reminders = 0;
    loop {
        let source = extract_program(&reply);
        let problem = match sandbox.run_solution(&source, times).await? {
            SandboxOutcome::Completed(batches) if batches.len() == times.len() => {
                return Ok(Some(batches));
            }
            SandboxOutcome::Completed(_) => {
                "The output code has error: wrong number of results. Please try again. DO NOT output any other text, ONLY output the code.".to_string()
            }
            SandboxOutcome::Missing { .. } => MISSING_RETURN.to_string(),
            SandboxOutcome::Failed { reason } => format!(
                "The output code has error: {reason}. Please try again. DO NOT output any other text, ONLY output the code."
            ),
        };
        if reminders >= cap || session.is_aborted() {
            return Ok(None);
        }
        reminders += 1;
        obs::emit_format_rejected(&problem, reminders);
        reply = session.remind(problem).await?;
    }
}

async fn answer_program(
    task: &PhysicsTask,
    sandbox: &dyn CodeSandbox,
    session: &mut Session,
    scores: &mut ScoreAggregator,
    pending: Observation,
) -> Result<()> {
    let attempts = session.config().answer_attempts();
    let truths: Vec<Coordinates> = task
        .samples
        .iter()
        .map(|s| task.oracle.positions(s.time))
        .collect();
    let mut times = vec![PROBE_TIME];
    times.extend(task.samples.iter().map(|s| s.time));

    let mut prompt = format!(
        "{}\n********Evaluation Starts, You Have {attempts} Chances for Answering Question********\n Now output runnable python code to simulate the mechanical system",
        pending.text
    );
    let mut best: Option<Vec<TimeCheck>> = None;
    let mut used = 0;

    while used < attempts && !session.is_aborted() {
        used += 1;
        let reply = session.ask(prompt).await?;
        let checks = match execute(session, sandbox, reply, &times).await? {
            Some(batches) => batches[1..]
                .iter()
                .zip(&truths)
                .zip(&task.samples)
                .map(|((answer, truth), sample)| TimeCheck {
                    time: sample.time,
                    wrong: answer.mismatches(truth, TOLERANCE),
                })
                .collect(),
            None => task
                .samples
                .iter()
                .zip(&truths)
                .map(|(sample, truth)| TimeCheck {
                    time: sample.time,
                    wrong: (1..=truth.len()).collect(),
                })
                .collect::<Vec<_>>(),
        };
        let correct = checks.iter().filter(|c| c.is_correct()).count();
        obs::emit_answer_judged(used, correct == checks.len());

        let feedback = checks
            .iter()
            .map(TimeCheck::feedback)
            .collect::<Vec<_>>()
            .join(" ");
        let improved = best
            .as_ref()
            .map_or(true, |b| correct > b.iter().filter(|c| c.is_correct()).count());
        if improved {
            best = Some(checks);
        }
        if correct == task.samples.len() || used >= attempts {
            session.conclude(feedback, OK_REPLY);
            break;
        }
        prompt = format!(
            "{feedback} . You have a chance to try again. DO NOT output any other text, ONLY output runnable code."
        );
    }
    session.confirm();

    for check in best.unwrap_or_default() {
        let is_correct = check.is_correct();
        scores.record(TurnResult {
            label: format!("time {}", check.time),
            is_correct,
            credit: if is_correct { 1.0 } else { 0.0 },
            observation: check.feedback(),
            attempts_used: used,
            format_failures: 0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time(" 2.5 "), 2.5);
        assert_eq!(parse_time("-3"), 0.0);
        assert_eq!(parse_time("soon"), 0.0);
        assert_eq!(parse_time("NaN"), 0.0);
    }

    #[test]
    fn test_extract_program_from_fence() {
        let reply = "Here you go:\n```python\ndef solution(t):\n    return {}\n```\n";
        assert_eq!(extract_program(reply), "def solution(t):\n    return {}\n");
        assert_eq!(extract_program("  def solution(t): pass "), "def solution(t): pass");
    }

    #[test]
    fn test_time_check_feedback() {
        let ok = TimeCheck {
            time: 2.0,
            wrong: vec![],
        };
        let bad = TimeCheck {
            time: 3.5,
            wrong: vec![1, 3],
        };
        assert_eq!(ok.feedback(), "Your answer for time 2 is correct.");
        assert_eq!(bad.feedback(), "Your answer for object1, 3 at time 3.5 is wrong.");
    }
}
