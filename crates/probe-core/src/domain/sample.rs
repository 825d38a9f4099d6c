//! Test samples, one shape per task family.
//!
//! Samples are immutable once loaded; a sample's identity is its index in
//! the owning [`SampleSet`].

use serde::{Deserialize, Serialize};

use super::error::{ProbeError, Result};
use crate::checkpoint::Bindings;

/// One checkpoint question: the value of `variable` the `iteration`-th time
/// checkpoint `index` is visited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(usize, u32, String)", into = "(usize, u32, String)")]
pub struct CheckpointQuery {
    pub index: usize,
    pub iteration: u32,
    pub variable: String,
}

impl From<(usize, u32, String)> for CheckpointQuery {
    fn from((index, iteration, variable): (usize, u32, String)) -> Self {
        Self {
            index,
            iteration,
            variable,
        }
    }
}

impl From<CheckpointQuery> for (usize, u32, String) {
    fn from(q: CheckpointQuery) -> Self {
        (q.index, q.iteration, q.variable)
    }
}

/// Input bindings plus the checkpoints asked about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSample {
    pub var_names: Vec<String>,
    pub var_values: Vec<serde_json::Value>,
    pub checkpoints: Vec<CheckpointQuery>,
}

impl CodeSample {
    /// Bindings in declaration order.
    pub fn bindings(&self) -> Bindings {
        self.var_names
            .iter()
            .cloned()
            .zip(self.var_values.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionSample {
    pub plaintext: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSample {
    pub time: f64,
}

/// Public settings of one game (e.g. `{"total_turns": 10}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameSample {
    pub settings: serde_json::Value,
}

impl GameSample {
    /// Read an unsigned integer setting.
    pub fn setting_u32(&self, key: &str) -> Option<u32> {
        self.settings
            .get(key)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleSample {
    /// The hidden secret; also the expected final answer before canonicalisation.
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSample {
    pub input: Vec<u8>,
}

/// Non-empty, ordered collection of samples for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet<T> {
    samples: Vec<T>,
}

impl<T> SampleSet<T> {
    /// Wrap a sample list.
    ///
    /// # Errors
    ///
    /// `ProbeError::Configuration` if `samples` is empty: a session without
    /// ground truth must not start.
    pub fn new(samples: Vec<T>) -> Result<Self> {
        if samples.is_empty() {
            return Err(ProbeError::config("sample set is empty"));
        }
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.samples
    }
}

impl<T: serde::de::DeserializeOwned> SampleSet<T> {
    /// Parse a JSON array of samples.
    pub fn from_json(raw: &str) -> Result<Self> {
        let samples: Vec<T> = serde_json::from_str(raw)?;
        Self::new(samples)
    }
}

impl<'a, T> IntoIterator for &'a SampleSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
