//! Encryption family: free plaintext queries, then exact-match ciphertext
//! questions.

use std::sync::Arc;

use super::{exploration_intro, Questions};
use crate::domain::error::Result;
use crate::domain::sample::{EncryptionSample, SampleSet};
use crate::oracle::{CipherOracle, Observation};
use crate::score::ScoreAggregator;
use crate::session::{frame_turn, Judgement, Session};
use crate::validator::CharsetValidator;

pub const FORMAT_REMINDER: &str =
    "You must only return the result of the blackbox function, without any other unrelated text or symbols. Please try again.";

#[derive(Clone)]
pub struct EncryptionTask {
    pub oracle: Arc<dyn CipherOracle>,
    pub samples: SampleSet<EncryptionSample>,
}

impl EncryptionTask {
    pub fn new(oracle: Arc<dyn CipherOracle>, samples: SampleSet<EncryptionSample>) -> Self {
        Self { oracle, samples }
    }
}

/// Exploration input is reduced to letters and spaces before encryption.
fn plaintext_of(reply: &str) -> String {
    reply
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == ' ')
        .collect()
}

pub(super) async fn run(
    task: &EncryptionTask,
    session: &mut Session,
    scores: &mut ScoreAggregator,
) -> Result<()> {
    let max_turns = session.config().max_turns;
    let attempts = session.config().answer_attempts();
    let oracle = task.oracle.as_ref();

    let explored = session
        .explore(exploration_intro(max_turns), max_turns, |turn, reply| {
            let ciphertext = oracle.encrypt(&plaintext_of(reply));
            Observation::accepted(frame_turn(turn, max_turns, &ciphertext))
        })
        .await?;
    let Some(pending) = explored else {
        return Ok(());
    };

    let validator = CharsetValidator::cipher_text();
    let mut questions = Questions::new(pending, attempts);
    for (i, sample) in task.samples.iter().enumerate() {
        if session.is_aborted() {
            break;
        }
        let truth = oracle.encrypt(&sample.plaintext);
        let prompt = questions.next(&format!(
            "What's the output of the blackbox when the input plaintext is '{}'?",
            sample.plaintext
        ));
        let answered = session
            .answer(prompt, &validator, FORMAT_REMINDER, |ciphertext: &String| {
                Judgement::from_bool(*ciphertext == truth)
            })
            .await?;
        session.acknowledge(answered.is_correct);
        scores.record(answered.into_turn(format!("plaintext {i}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_filter_keeps_letters_and_spaces() {
        assert_eq!(plaintext_of("Hello, World! 42"), "Hello World ");
        assert_eq!(plaintext_of("   "), "   ");
    }
}
