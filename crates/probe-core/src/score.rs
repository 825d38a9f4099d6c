//! Score aggregation and result sinks.
//!
//! A [`ScoreAggregator`] collects the [`TurnResult`]s of one run and is
//! consumed by [`ScoreAggregator::finish`], so each run yields exactly one
//! [`ScoreRecord`]. The record is a flat row whose field order is a stable
//! schema for downstream tooling; see [`ScoreRecord::HEADER`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::domain::config::{Difficulty, SessionConfig};
use crate::domain::error::{ProbeError, Result};
use crate::obs;
use crate::session::TurnResult;

/// Aggregate of one `(task, difficulty, participant, run)`.
///
/// Field order is part of the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub difficulty: Difficulty,
    pub task_id: String,
    pub participant_family: String,
    pub participant_name: String,
    pub run_label: String,
    pub turn_budget: u32,
    pub retry_budget: u32,
    /// Sum of per-sample credit: a count for exact-match families, the sum
    /// of normalised scores for games.
    pub correct_count: f64,
    /// Samples (or checkpoints) actually attempted.
    pub total_count: usize,
    /// `correct_count / total_count`, 0 when nothing was attempted.
    pub accuracy: f64,
}

impl ScoreRecord {
    pub const HEADER: [&'static str; 10] = [
        "difficulty",
        "task_id",
        "participant_family",
        "participant_name",
        "run_label",
        "turn_budget",
        "retry_budget",
        "correct_count",
        "total_count",
        "accuracy",
    ];

    /// Values in [`HEADER`](Self::HEADER) order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.difficulty.to_string(),
            self.task_id.clone(),
            self.participant_family.clone(),
            self.participant_name.clone(),
            self.run_label.clone(),
            self.turn_budget.to_string(),
            self.retry_budget.to_string(),
            self.correct_count.to_string(),
            self.total_count.to_string(),
            self.accuracy.to_string(),
        ]
    }
}

/// Accumulates per-sample results for one run.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    difficulty: Difficulty,
    task_id: String,
    participant_family: String,
    participant_name: String,
    run_label: String,
    turn_budget: u32,
    retry_budget: u32,
    outcomes: Vec<TurnResult>,
}

impl ScoreAggregator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            difficulty: config.difficulty,
            task_id: config.task_id.clone(),
            participant_family: config.participant.family.clone(),
            participant_name: config.participant.display_name(),
            run_label: config.run_label.clone(),
            turn_budget: config.max_turns,
            retry_budget: config.failure_num,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, result: TurnResult) {
        obs::emit_sample_scored(&result.label, result.credit, result.attempts_used);
        self.outcomes.push(result);
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn correct(&self) -> f64 {
        self.outcomes.iter().map(|o| o.credit).sum()
    }

    pub fn outcomes(&self) -> &[TurnResult] {
        &self.outcomes
    }

    /// Close the run.
    pub fn finish(self) -> (ScoreRecord, Vec<TurnResult>) {
        let correct_count = self.correct();
        let total_count = self.attempted();
        let accuracy = if total_count == 0 {
            0.0
        } else {
            correct_count / total_count as f64
        };
        let record = ScoreRecord {
            difficulty: self.difficulty,
            task_id: self.task_id,
            participant_family: self.participant_family,
            participant_name: self.participant_name,
            run_label: self.run_label,
            turn_budget: self.turn_budget,
            retry_budget: self.retry_budget,
            correct_count,
            total_count,
            accuracy,
        };
        (record, self.outcomes)
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Durable destination for score records.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append(&self, record: &ScoreRecord) -> Result<()>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ScoreRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ScoreRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn append(&self, record: &ScoreRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn append(&self, record: &ScoreRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read every record of a JSONL results file. Blank lines are skipped.
pub fn read_jsonl(path: &Path) -> Result<Vec<ScoreRecord>> {
    let raw = std::fs::read_to_string(path)?;
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str::<ScoreRecord>(l).map_err(ProbeError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::Participant;

    fn result(credit: f64) -> TurnResult {
        TurnResult {
            label: "s".into(),
            is_correct: credit >= 1.0,
            credit,
            observation: String::new(),
            attempts_used: 1,
            format_failures: 0,
        }
    }

    fn aggregator() -> ScoreAggregator {
        let cfg = SessionConfig::new("caesar_cipher", Participant::new("gpt", "gpt-4o").with_thinking(true))
            .with_max_turns(5)
            .with_failure_num(1)
            .with_run_label("run_3");
        ScoreAggregator::new(&cfg)
    }

    #[test]
    fn test_finish_computes_accuracy() {
        let mut agg = aggregator();
        agg.record(result(1.0));
        agg.record(result(0.0));
        agg.record(result(1.0));
        let (record, outcomes) = agg.finish();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(record.correct_count, 2.0);
        assert_eq!(record.total_count, 3);
        assert_eq!(record.accuracy, 2.0 / 3.0);
        assert_eq!(record.participant_name, "gpt-4o_thinking");
        assert_eq!(record.turn_budget, 5);
        assert_eq!(record.retry_budget, 1);
    }

    #[test]
    fn test_empty_run_has_zero_accuracy() {
        let (record, _) = aggregator().finish();
        assert_eq!(record.total_count, 0);
        assert_eq!(record.accuracy, 0.0);
    }

    #[test]
    fn test_row_matches_header_order() {
        let mut agg = aggregator();
        agg.record(result(0.5));
        let (record, _) = agg.finish();
        let row = record.to_row();
        assert_eq!(row.len(), ScoreRecord::HEADER.len());
        assert_eq!(row[0], "easy");
        assert_eq!(row[4], "run_3");
        assert_eq!(row[9], "0.5");
    }

    #[test]
    fn test_record_json_field_order() {
        let (record, _) = aggregator().finish();
        let json = serde_json::to_string(&record).unwrap();
        let positions: Vec<usize> = ScoreRecord::HEADER
            .iter()
            .map(|k| json.find(&format!("\"{k}\"")).expect("field present"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_working_after_poisoned_lock() {
        let sink = std::sync::Arc::new(MemorySink::new());
        let poisoner = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.records.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(sink.records.is_poisoned());

        let (record, _) = aggregator().finish();
        sink.append(&record).await.unwrap();
        assert_eq!(sink.records(), vec![record]);
    }
}
