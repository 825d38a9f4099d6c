//! Puzzle sessions: every puzzle replays from the same starting context.

use std::sync::Arc;

use probe_core::catalog::NumberGuessing;
use probe_core::family::puzzle::FORMAT_REMINDER;
use probe_core::fakes::ScriptedModel;
use probe_core::{
    AbortHandle, Evaluation, Participant, PuzzleSample, PuzzleTask, SampleSet, SessionConfig,
    TaskFamily,
};

fn config(max_turns: u32) -> SessionConfig {
    SessionConfig::new("number_guessing", Participant::new("fake", "scripted"))
        .with_max_turns(max_turns)
        .with_prompts("sys", "Guess the number.")
}

fn task(answers: &[&str]) -> TaskFamily {
    let samples = SampleSet::new(
        answers
            .iter()
            .map(|a| PuzzleSample {
                answer: a.to_string(),
            })
            .collect(),
    )
    .expect("non-empty samples");
    TaskFamily::Puzzle(PuzzleTask::new(Arc::new(NumberGuessing), samples))
}

#[tokio::test]
async fn test_puzzles_are_independent() {
    let model = Arc::new(ScriptedModel::new([
        "Number 50",
        "Number 42",
        "Number 10",
        "Number 89",
    ]));
    let report = Evaluation::new(config(1), task(&["Number 42", "Number 90"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.total_count, 2);
    assert_eq!(report.record.correct_count, 1.0);
    assert_eq!(report.record.accuracy, 0.5);

    let prompts = model.prompts();
    assert!(prompts[0].starts_with("********A New Puzzle Starts, You can Make 1 Queries"));
    assert!(prompts[1].starts_with("<Current Turn: 1, 0 Turns Remaining> Close********Evaluation Starts"));
    assert!(prompts[3].starts_with("<Current Turn: 1, 0 Turns Remaining> Far"));

    let seen = model.seen();
    assert_eq!(seen[2].len(), seen[0].len());
    assert_eq!(seen[2], seen[0]);
}

#[tokio::test]
async fn test_malformed_query_is_rejected_and_superseded() {
    let model = Arc::new(ScriptedModel::new(["fifty", "Number 40", "Number 42"]));
    let report = Evaluation::new(config(2), task(&["Number 42"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    assert!(model.prompts()[1].contains("Query format incorrect."));
    assert!(report
        .transcript
        .history()
        .iter()
        .any(|t| t.content == "fifty"));
}

#[tokio::test]
async fn test_answer_in_wrong_shape_gets_reminder() {
    let model = Arc::new(ScriptedModel::new(["Number 42", "42", "Number 42"]));
    let report = Evaluation::new(config(1), task(&["Number 42"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    assert_eq!(report.outcomes[0].format_failures, 1);
    assert_eq!(model.prompts()[2], FORMAT_REMINDER);
}

#[tokio::test]
async fn test_abort_during_exploration_drops_the_puzzle() {
    let abort = AbortHandle::new();
    let model = Arc::new(
        ScriptedModel::new(["Number 50", "Number 40", "Number 42"])
            .with_abort_after(2, abort.clone()),
    );
    let report = Evaluation::new(config(3), task(&["Number 42", "Number 7"]))
        .with_abort(abort)
        .run(model.clone())
        .await
        .expect("aborted sessions still report");

    assert!(report.aborted);
    assert_eq!(report.record.total_count, 0);
    assert_eq!(model.calls(), 2);
}
