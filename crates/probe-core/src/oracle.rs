//! Task oracle contracts.
//!
//! Oracles hold the hidden rule of one task instance. The controller only
//! sees these call shapes; how a cipher, circuit or game computes its result
//! lives with the task definition (see [`crate::catalog`] for small
//! reference implementations).
//!
//! All methods are synchronous and deterministic for a fixed hidden state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Non-scoring feedback for an exploration query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    /// The oracle could not interpret the query. Once the model answers the
    /// rejection, the malformed exchange is dropped from the working
    /// transcript.
    pub rejected: bool,
}

impl Observation {
    pub fn accepted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rejected: false,
        }
    }

    pub fn rejected(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rejected: true,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// Named 3-D positions, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    objects: Vec<(String, [f64; 3])>,
}

impl Coordinates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, position: [f64; 3]) -> Self {
        self.insert(name, position);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, position: [f64; 3]) {
        let name = name.into();
        match self.objects.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = position,
            None => self.objects.push((name, position)),
        }
    }

    pub fn get(&self, name: &str) -> Option<[f64; 3]> {
        self.objects
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, [f64; 3])> {
        self.objects.iter().map(|(n, p)| (n.as_str(), *p))
    }

    /// 1-based positions (in `truth` order) of objects outside `tolerance`.
    ///
    /// A submission with a different number of objects is wrong everywhere.
    /// Objects missing from `self` are wrong.
    pub fn mismatches(&self, truth: &Coordinates, tolerance: f64) -> Vec<usize> {
        if self.len() != truth.len() {
            return (1..=truth.len()).collect();
        }
        truth
            .iter()
            .enumerate()
            .filter(|(_, (name, expected))| match self.get(name) {
                Some(actual) => actual
                    .iter()
                    .zip(expected.iter())
                    .any(|(a, e)| (a - e).abs() > tolerance),
                None => true,
            })
            .map(|(i, _)| i + 1)
            .collect()
    }
}

/// Renders as `{'object1': (1.0, 2.0, 3.0), ...}`.
impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, [x, y, z])) in self.objects.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{name}': ({x:?}, {y:?}, {z:?})")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Family oracles
// ---------------------------------------------------------------------------

/// Encryption family: a deterministic text transform.
pub trait CipherOracle: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> String;
}

/// Physics family: closed-form positions of every object at time `t`.
pub trait MotionOracle: Send + Sync {
    fn positions(&self, t: f64) -> Coordinates;
}

/// Puzzle family: a hidden secret probed through natural-language feedback.
pub trait PuzzleOracle: Send + Sync {
    /// Feedback for one query against `secret`.
    fn respond(&self, secret: &str, query: &str) -> Observation;

    /// Shape check for a final answer.
    fn check_format(&self, candidate: &str) -> bool;

    /// The answer the model must give for `secret`. Defaults to the secret
    /// itself.
    fn canonical_answer(&self, secret: &str) -> String {
        secret.to_string()
    }
}

/// Circuit family: a fixed boolean circuit.
pub trait CircuitOracle: Send + Sync {
    fn input_width(&self) -> usize;

    fn output_width(&self) -> usize;

    /// Gate outputs for `input`, or an error message for malformed input.
    fn simulate(&self, input: &[u8]) -> Result<Vec<u8>, String>;
}

/// One live playthrough of a game against a fixed strategy.
pub trait GameMatch: Send {
    fn is_finished(&self) -> bool;

    /// What the model is told before choosing its next move.
    fn prompt(&self) -> String;

    /// Parse a move. `Err` carries the reminder shown to the model.
    fn parse_action(&self, raw: &str) -> Result<String, String>;

    /// Play one turn. `None` forfeits the turn. Returns the points earned
    /// this turn.
    fn apply(&mut self, action: Option<&str>) -> f64;

    /// Running total for the model.
    fn score(&self) -> f64;

    /// Summary shown once the match is over.
    fn summary(&self) -> String {
        format!("Game over. Your final score is {}.", self.score())
    }
}

/// Game family: match factory plus the normalisation maximum.
pub trait GameOracle: Send + Sync {
    fn new_match(&self, settings: &serde_json::Value) -> Box<dyn GameMatch>;

    /// Best achievable score for `settings`.
    fn max_score(&self, settings: &serde_json::Value) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth() -> Coordinates {
        Coordinates::new()
            .with("object1", [1.0, 2.0, 3.0])
            .with("object2", [0.0, 0.0, 0.0])
    }

    #[test]
    fn test_mismatches_within_tolerance() {
        let submitted = Coordinates::new()
            .with("object1", [1.009, 1.991, 3.0])
            .with("object2", [0.0, 0.0, 0.0]);
        assert!(submitted.mismatches(&truth(), 0.01).is_empty());
    }

    #[test]
    fn test_mismatches_reports_object_positions() {
        let submitted = Coordinates::new()
            .with("object1", [1.02, 2.0, 3.0])
            .with("object2", [0.0, 0.0, 0.0]);
        assert_eq!(submitted.mismatches(&truth(), 0.01), vec![1]);
    }

    #[test]
    fn test_mismatches_wrong_object_count() {
        let submitted = Coordinates::new().with("object1", [1.0, 2.0, 3.0]);
        assert_eq!(submitted.mismatches(&truth(), 0.01), vec![1, 2]);
    }

    #[test]
    fn test_display_is_python_dict() {
        let c = Coordinates::new().with("object1", [1.0, -2.5, 3.0]);
        assert_eq!(c.to_string(), "{'object1': (1.0, -2.5, 3.0)}");
    }
}
