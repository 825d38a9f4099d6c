use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::family::SessionReport;
use crate::score::ScoreRecord;
use crate::session::TurnResult;
use crate::transcript::Turn;

pub const SCHEMA_VERSION: &str = "1.0";

/// Full record of one session, written next to the JSONL score rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub record: ScoreRecord,
    pub outcomes: Vec<TurnResult>,
    pub aborted: bool,
    pub history: Vec<Turn>,
    pub history_digest: String,
}

impl SessionArtifact {
    pub fn from_report(report: &SessionReport) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            session_id: Uuid::new_v4(),
            record: report.record.clone(),
            outcomes: report.outcomes.clone(),
            aborted: report.aborted,
            history: report.transcript.history().to_vec(),
            history_digest: report.transcript.history_digest(),
        }
    }
}

/// Write the session artifact in pretty JSON format.
pub fn write_session_artifact(path: &Path, artifact: &SessionArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize session artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

pub fn read_session_artifact(path: &Path) -> Result<SessionArtifact> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

/// Render score records as a markdown table.
pub fn render_summary_md(records: &[ScoreRecord]) -> String {
    let mut out = String::new();
    out.push_str("# Probe Results\n\n");
    if records.is_empty() {
        out.push_str("No records.\n");
        return out;
    }

    out.push_str(&format!("| {} |\n", ScoreRecord::HEADER.join(" | ")));
    out.push_str(&format!(
        "|{}\n",
        "---|".repeat(ScoreRecord::HEADER.len())
    ));
    for record in records {
        out.push_str(&format!("| {} |\n", record.to_row().join(" | ")));
    }

    let correct: f64 = records.iter().map(|r| r.correct_count).sum();
    let total: usize = records.iter().map(|r| r.total_count).sum();
    let overall = if total == 0 { 0.0 } else { correct / total as f64 };
    out.push_str(&format!(
        "\n- runs: {}\n- correct: {}\n- attempted: {}\n- overall accuracy: {:.4}\n",
        records.len(),
        correct,
        total,
        overall
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::Difficulty;
    use crate::transcript::Transcript;

    fn record() -> ScoreRecord {
        ScoreRecord {
            difficulty: Difficulty::Easy,
            task_id: "caesar_cipher".to_string(),
            participant_family: "openai".to_string(),
            participant_name: "gpt-4o".to_string(),
            run_label: "run_1".to_string(),
            turn_budget: 10,
            retry_budget: 0,
            correct_count: 3.0,
            total_count: 4,
            accuracy: 0.75,
        }
    }

    #[test]
    fn session_artifact_schema_has_expected_keys() {
        let report = SessionReport {
            record: record(),
            outcomes: vec![],
            aborted: false,
            transcript: Transcript::primed("sys", "intro", "ok"),
        };
        let artifact = SessionArtifact::from_report(&report);
        assert_eq!(artifact.history.len(), 3);
        assert_eq!(artifact.history_digest, report.transcript.history_digest());

        let raw = serde_json::to_value(&artifact).expect("serialize artifact");
        let obj = raw.as_object().expect("artifact object");
        for key in [
            "schema_version",
            "generated_at",
            "session_id",
            "record",
            "outcomes",
            "aborted",
            "history",
            "history_digest",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn summary_md_has_row_per_record() {
        let md = render_summary_md(&[record(), record()]);
        assert!(md.starts_with("# Probe Results"));
        assert_eq!(md.matches("| easy | caesar_cipher |").count(), 2);
        assert!(md.contains("overall accuracy: 0.7500"));
    }

    #[test]
    fn summary_md_empty() {
        assert!(render_summary_md(&[]).contains("No records."));
    }
}
