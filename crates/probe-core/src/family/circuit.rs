//! Circuit family: probe a boolean circuit with bit vectors, then predict
//! every gate output for given inputs.

use std::sync::Arc;

use crate::domain::error::{ProbeError, Result};
use crate::domain::sample::{CircuitSample, SampleSet};
use crate::oracle::{CircuitOracle, Observation};
use crate::score::ScoreAggregator;
use crate::session::{evaluation_banner, Judgement, Session, OK_REPLY};
use crate::validator::{ActionValidator, BitVectorValidator};

pub const FORMAT_REMINDER: &str =
    "Please strictly follow the format. Output a 0/1 list without anything else. For example:\n[0, 1, 0, 1]\n";

const FORMAT_HINT: &str =
    "The output format is described in the Evaluation section previosly. For example:\n[0, 1, 0, 1]\n";

#[derive(Clone)]
pub struct CircuitTask {
    pub oracle: Arc<dyn CircuitOracle>,
    pub samples: SampleSet<CircuitSample>,
}

impl CircuitTask {
    pub fn new(oracle: Arc<dyn CircuitOracle>, samples: SampleSet<CircuitSample>) -> Self {
        Self { oracle, samples }
    }
}

/// `[0, 1, 1]`
fn render_bits(bits: &[u8]) -> String {
    format!("{bits:?}")
}

fn game_start(width: usize, rounds: u32) -> String {
    format!(
        "Game start! You are interacting with a blackbox Boolean circuit with {width} input wires. \
In each round, you may submit a list of {width} bits (0 or 1) as input, and the platform will return the outputs of all gates. \
Format your input as a list of {width} bits. You have {rounds} rounds. Good luck!\n[Platform] Rounds remaining: {rounds}"
    )
}

fn probe(oracle: &dyn CircuitOracle, reply: &str) -> Observation {
    let width = oracle.input_width();
    match BitVectorValidator::new(width).validate(reply) {
        Ok(bits) => match oracle.simulate(&bits) {
            Ok(outputs) => Observation::accepted(format!(
                "[Platform] Gate outputs: {}\nSubmit your next input as a list of {width} bits.",
                render_bits(&outputs)
            )),
            Err(e) => Observation::rejected(format!(
                "[Platform] Error: {e}\nPlease submit a list of {width} bits (0 or 1)."
            )),
        },
        Err(_) => Observation::rejected(format!(
            "[Platform] Invalid input format. Please submit a list of {width} bits (0 or 1), e.g., {}.",
            render_bits(&vec![0; width])
        )),
    }
}

pub(super) async fn run(
    task: &CircuitTask,
    session: &mut Session,
    scores: &mut ScoreAggregator,
) -> Result<()> {
    let oracle = task.oracle.as_ref();
    let mut truths = Vec::with_capacity(task.samples.len());
    for (i, sample) in task.samples.iter().enumerate() {
        let outputs = oracle
            .simulate(&sample.input)
            .map_err(|e| ProbeError::config(format!("circuit sample {i}: {e}")))?;
        truths.push(outputs);
    }

    let max_turns = session.config().max_turns;
    let attempts = session.config().answer_attempts();
    let explored = session
        .explore(game_start(oracle.input_width(), max_turns), max_turns, |turn, reply| {
            let mut observation = probe(oracle, reply);
            if turn < max_turns {
                observation
                    .text
                    .push_str(&format!("\n[Platform] Rounds remaining: {}", max_turns - turn));
            } else {
                observation.text.push_str(
                    "\n[Platform] Game over. Please submit your final guess for the function of the circuit.",
                );
            }
            observation
        })
        .await?;
    let Some(pending) = explored else {
        return Ok(());
    };

    let validator = BitVectorValidator::new(oracle.output_width());
    let mut opening = Some(pending.text);
    for (sample, truth) in task.samples.iter().zip(&truths) {
        if session.is_aborted() {
            break;
        }
        let input = render_bits(&sample.input);
        let question = format!(
            "In this turn, given the input {input}, answer the output of the gates in the format we dicussed without any text else."
        );
        let prompt = match opening.take() {
            Some(head) => format!("{head}{}{FORMAT_HINT}{question}", evaluation_banner(attempts)),
            None => question,
        };
        let wrong = format!("the answer is wrong when input = {input}");
        let answered = session
            .answer(prompt, &validator, FORMAT_REMINDER, |bits: &Vec<u8>| {
                if bits == truth {
                    Judgement::Correct
                } else {
                    Judgement::wrong_with(wrong.clone())
                }
            })
            .await?;
        let closing = if answered.is_correct {
            "your answer is correct.".to_string()
        } else {
            wrong
        };
        session.conclude(format!("{closing} Let's move to next question."), OK_REPLY);
        scores.record(answered.into_turn(format!("input {input}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GateCircuit;

    #[test]
    fn test_probe_reports_gate_outputs() {
        let circuit = GateCircuit::prefix_xor(4);
        let obs = probe(&circuit, "[1, 0, 0, 0]");
        assert!(!obs.rejected);
        assert!(obs.text.starts_with("[Platform] Gate outputs: ["));
    }

    #[test]
    fn test_probe_rejects_wrong_width() {
        let circuit = GateCircuit::prefix_xor(4);
        let obs = probe(&circuit, "[1, 0]");
        assert!(obs.rejected);
        assert_eq!(
            obs.text,
            "[Platform] Invalid input format. Please submit a list of 4 bits (0 or 1), e.g., [0, 0, 0, 0]."
        );
    }
}
