//! Puzzle family: each puzzle gets its own query budget and answer phase,
//! played from the same starting transcript.

use std::sync::Arc;

use crate::domain::error::Result;
use crate::domain::sample::{PuzzleSample, SampleSet};
use crate::oracle::{Observation, PuzzleOracle};
use crate::score::ScoreAggregator;
use crate::session::{frame_turn, Judgement, Session, OK_REPLY};
use crate::validator::PredicateValidator;

pub const FORMAT_REMINDER: &str = "You must only return the answer of the blackbox puzzle, strictly following the instructions in the puzzle rules, without more unrelated text or symbols. Please try again.";

const CORRECT: &str = "Your answer is correct.";
const WRONG: &str = "Your answer is wrong.";

#[derive(Clone)]
pub struct PuzzleTask {
    pub oracle: Arc<dyn PuzzleOracle>,
    pub samples: SampleSet<PuzzleSample>,
}

impl PuzzleTask {
    pub fn new(oracle: Arc<dyn PuzzleOracle>, samples: SampleSet<PuzzleSample>) -> Self {
        Self { oracle, samples }
    }
}

fn puzzle_intro(queries: u32, attempts: u32) -> String {
    format!(
        "********A New Puzzle Starts, You can Make {queries} Queries Before Answering Each Question. And Then You Have {attempts} Chances for Answering. Output the Value Only.********"
    )
}

pub(super) async fn run(
    task: &PuzzleTask,
    session: &mut Session,
    scores: &mut ScoreAggregator,
) -> Result<()> {
    let max_turns = session.config().max_turns;
    let attempts = session.config().answer_attempts();
    let oracle = task.oracle.as_ref();
    let validator = PredicateValidator::new(|candidate: &str| oracle.check_format(candidate));
    let start = session.mark();

    for (i, sample) in task.samples.iter().enumerate() {
        if session.is_aborted() {
            break;
        }
        let secret = sample.answer.as_str();
        let truth = oracle.canonical_answer(secret);

        let explored = session
            .explore(puzzle_intro(max_turns, attempts), max_turns, |turn, reply| {
                let feedback = oracle.respond(secret, reply.trim());
                Observation {
                    text: frame_turn(turn, max_turns, &feedback.text),
                    rejected: feedback.rejected,
                }
            })
            .await?;
        let Some(pending) = explored else {
            break;
        };

        let prompt = format!(
            "{}********Evaluation Starts, You Have {attempts} Chances for Answering, Please Output the Answer DIRECTLY.********\n",
            pending.text
        );
        let answered = session
            .answer(prompt, &validator, FORMAT_REMINDER, |answer: &String| {
                Judgement::from_bool(*answer == truth)
            })
            .await?;
        session.conclude(if answered.is_correct { CORRECT } else { WRONG }, OK_REPLY);
        session.rewind(start)?;
        scores.record(answered.into_turn(format!("puzzle {i}")));
    }
    Ok(())
}
