//! End-to-end encryption sessions against a scripted model.
//!
//! Covers exploration framing, exact-match judging, the format and
//! correctness retry bounds, abort handling and transport failures.

use std::sync::Arc;

use probe_core::catalog::CaesarCipher;
use probe_core::family::encryption::FORMAT_REMINDER;
use probe_core::fakes::ScriptedModel;
use probe_core::session::{CORRECT_ACK, WRONG_ACK, WRONG_ANSWER_PROMPT};
use probe_core::{
    AbortHandle, EncryptionSample, EncryptionTask, Evaluation, Participant, ProbeError, Role,
    SampleSet, SessionConfig, TaskFamily, TransportError,
};

fn config(max_turns: u32, failure_num: u32) -> SessionConfig {
    SessionConfig::new("caesar_cipher", Participant::new("fake", "scripted"))
        .with_max_turns(max_turns)
        .with_failure_num(failure_num)
        .with_prompts("You are probing a black box.", "Find the cipher.")
}

fn task(plaintexts: &[&str]) -> TaskFamily {
    let samples = SampleSet::new(
        plaintexts
            .iter()
            .map(|p| EncryptionSample {
                plaintext: p.to_string(),
            })
            .collect(),
    )
    .expect("non-empty samples");
    TaskFamily::Encryption(EncryptionTask::new(Arc::new(CaesarCipher::default()), samples))
}

#[tokio::test]
async fn test_correct_ciphertext_scores_one() {
    let model = Arc::new(ScriptedModel::new(["abc", "hello", "pmttw"]));
    let report = Evaluation::new(config(2, 0), task(&["hello"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    assert_eq!(report.record.total_count, 1);
    assert_eq!(report.record.accuracy, 1.0);
    assert!(!report.aborted);
    assert_eq!(model.remaining(), 0);

    let prompts = model.prompts();
    assert!(prompts[0].starts_with("You have 2 interaction turns"));
    assert_eq!(prompts[1], "<Current Turn: 1, 1 Turns Remaining> ijk");
    assert!(prompts[2].starts_with(
        "<Current Turn: 2, 0 Turns Remaining> pmttw\n********Evaluation Starts, You Have 1 Chances for Answering Each Question********\n Now answer the question: "
    ));
    assert!(prompts[2].ends_with("What's the output of the blackbox when the input plaintext is 'hello'?"));

    let history = report.transcript.history();
    assert!(history
        .iter()
        .any(|t| t.role == Role::User && t.content == CORRECT_ACK));
}

#[tokio::test]
async fn test_wrong_ciphertext_without_retries_scores_zero() {
    let model = Arc::new(ScriptedModel::new(["abc", "hello", "pmtts"]));
    let report = Evaluation::new(config(2, 0), task(&["hello"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 0.0);
    assert_eq!(report.record.total_count, 1);
    assert_eq!(report.outcomes[0].attempts_used, 1);
    assert_eq!(model.calls(), 3);
    assert!(report
        .transcript
        .history()
        .iter()
        .any(|t| t.content == WRONG_ACK));
}

#[tokio::test]
async fn test_format_reminders_are_capped() {
    // Three malformed replies: the answer plus two reminders, then it is wrong.
    let model = Arc::new(ScriptedModel::new(["abc", "pm#tw", "??", "!!", "unused"]));
    let report = Evaluation::new(config(1, 0), task(&["hello"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(model.calls(), 4);
    assert_eq!(model.remaining(), 1);
    let prompts = model.prompts();
    assert_eq!(prompts[2], FORMAT_REMINDER);
    assert_eq!(prompts[3], FORMAT_REMINDER);

    let outcome = &report.outcomes[0];
    assert!(!outcome.is_correct);
    assert_eq!(outcome.format_failures, 3);
    assert_eq!(report.record.correct_count, 0.0);

    // Malformed exchanges leave the working transcript but stay in history.
    let working = report.transcript.working();
    assert!(working.iter().all(|t| t.content != "pm#tw" && t.content != "??"));
    assert!(report.transcript.history().iter().any(|t| t.content == "pm#tw"));
}

#[tokio::test]
async fn test_format_recovery_is_judged() {
    let model = Arc::new(ScriptedModel::new(["abc", "The answer is: pmttw", "pmttw"]));
    let report = Evaluation::new(config(1, 0), task(&["hello"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    assert_eq!(report.outcomes[0].format_failures, 1);
    assert_eq!(report.outcomes[0].attempts_used, 1);
}

#[tokio::test]
async fn test_correctness_retries_are_bounded_by_failure_num() {
    let model = Arc::new(ScriptedModel::new(["abc", "aaaa", "bbbb", "cccc", "pmttw"]));
    let report = Evaluation::new(config(1, 2), task(&["hello"]))
        .run(model.clone())
        .await
        .expect("session runs");

    // Three attempts, all wrong; the fourth candidate is never requested.
    assert_eq!(model.calls(), 4);
    assert_eq!(report.outcomes[0].attempts_used, 3);
    assert_eq!(report.record.correct_count, 0.0);
    assert_eq!(report.record.retry_budget, 2);

    let prompts = model.prompts();
    assert!(prompts[1].contains("You Have 3 Chances"));
    assert_eq!(prompts[2], WRONG_ANSWER_PROMPT);
    assert_eq!(prompts[3], WRONG_ANSWER_PROMPT);
}

#[tokio::test]
async fn test_later_questions_use_short_prompt() {
    let model = Arc::new(ScriptedModel::new(["abc", "pmttw", "iji"]));
    let report = Evaluation::new(config(1, 0), task(&["hello", "aba"]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.total_count, 2);
    assert_eq!(report.record.correct_count, 2.0);
    assert_eq!(
        model.prompts()[2],
        "Answer the question: What's the output of the blackbox when the input plaintext is 'aba'?"
    );
}

#[tokio::test]
async fn test_abort_keeps_attempted_samples_only() {
    let abort = AbortHandle::new();
    let model = Arc::new(
        ScriptedModel::new(["abc", "pmttw", "x", "y"]).with_abort_after(2, abort.clone()),
    );
    let report = Evaluation::new(config(1, 0), task(&["hello", "abc", "xyz"]))
        .with_abort(abort)
        .run(model.clone())
        .await
        .expect("aborted sessions still report");

    assert!(report.aborted);
    assert_eq!(report.record.total_count, 1);
    assert_eq!(report.record.correct_count, 1.0);
    assert_eq!(report.record.accuracy, 1.0);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_abort_before_start_reports_nothing_attempted() {
    let abort = AbortHandle::new();
    abort.abort();
    let model = Arc::new(ScriptedModel::new(["abc"]));
    let report = Evaluation::new(config(1, 0), task(&["hello"]))
        .with_abort(abort)
        .run(model.clone())
        .await
        .expect("aborted sessions still report");

    assert!(report.aborted);
    assert_eq!(report.record.total_count, 0);
    assert_eq!(report.record.accuracy, 0.0);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_transport_failure_ends_session() {
    let model = Arc::new(ScriptedModel::new(["abc"]));
    let err = Evaluation::new(config(1, 0), task(&["hello"]))
        .run(model)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProbeError::Transport(TransportError::ScriptExhausted { served: 1 })
    ));
}

#[test]
fn test_empty_sample_set_is_configuration_error() {
    let err = SampleSet::<EncryptionSample>::new(vec![]).unwrap_err();
    assert!(matches!(err, ProbeError::Configuration(_)));
}
