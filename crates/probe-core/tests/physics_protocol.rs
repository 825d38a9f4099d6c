//! Physics sessions in both answer modes.

use std::sync::Arc;

use probe_core::catalog::UniformMotion;
use probe_core::fakes::{FakeSandbox, ScriptedModel};
use probe_core::{
    Coordinates, Evaluation, Participant, PhysicsSample, PhysicsTask, SampleSet, SandboxOutcome,
    SessionConfig, TaskFamily,
};

fn config(failure_num: u32) -> SessionConfig {
    SessionConfig::new("uniform_motion", Participant::new("fake", "scripted"))
        .with_max_turns(1)
        .with_failure_num(failure_num)
        .with_prompts("sys", "Predict the motion.")
}

fn samples(times: &[f64]) -> SampleSet<PhysicsSample> {
    SampleSet::new(times.iter().map(|&time| PhysicsSample { time }).collect())
        .expect("non-empty samples")
}

fn coordinates_task(times: &[f64]) -> TaskFamily {
    TaskFamily::Physics(PhysicsTask::new(Arc::new(UniformMotion::single()), samples(times)))
}

fn program_task(times: &[f64], sandbox: Arc<FakeSandbox>) -> TaskFamily {
    TaskFamily::Physics(
        PhysicsTask::new(Arc::new(UniformMotion::single()), samples(times)).with_sandbox(sandbox),
    )
}

fn at_y(y: f64) -> Coordinates {
    Coordinates::new().with("object1", [0.0, y, 0.0])
}

#[tokio::test]
async fn test_answer_within_tolerance_is_correct() {
    let model = Arc::new(ScriptedModel::new(["1", r#"{"object1": (0, 8.005, 0)}"#]));
    let report = Evaluation::new(config(0), coordinates_task(&[2.0]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    let prompts = model.prompts();
    assert!(prompts[1].starts_with("<Current Turn: 1, 0 Turns Remaining> {'object1': (0.0, 4.0, 0.0)}"));
    assert!(prompts[1].ends_with("What is the coordinate of each object at time 2?"));
}

#[tokio::test]
async fn test_wrong_objects_are_named_in_feedback() {
    let model = Arc::new(ScriptedModel::new([
        "1",
        "{'object1': (0, 7, 0)}",
        "{'object1': (0, 8, 0)}",
    ]));
    let report = Evaluation::new(config(1), coordinates_task(&[2.0]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    assert_eq!(report.outcomes[0].attempts_used, 2);
    assert_eq!(
        model.prompts()[2],
        "Your answer for object1 is wrong. Please try again. DO NOT output any other text, ONLY output the answer."
    );
}

#[tokio::test]
async fn test_program_is_corrected_after_runtime_error() {
    let sandbox = Arc::new(FakeSandbox::new([
        SandboxOutcome::failed("NameError: x"),
        SandboxOutcome::Completed(vec![at_y(4.0), at_y(8.0)]),
    ]));
    let model = Arc::new(ScriptedModel::new(["1", "code1", "```python\ncode2\n```"]));
    let report = Evaluation::new(config(0), program_task(&[2.0], sandbox.clone()))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.total_count, 1);
    assert_eq!(report.record.accuracy, 1.0);
    assert_eq!(model.calls(), 3);
    let prompts = model.prompts();
    assert!(prompts[1].ends_with("Now output runnable python code to simulate the mechanical system"));
    assert_eq!(
        prompts[2],
        "The output code has error: NameError: x. Please try again. DO NOT output any other text, ONLY output the code."
    );
    assert_eq!(sandbox.sources(), vec!["code1".to_string(), "code2\n".to_string()]);
}

#[tokio::test]
async fn test_program_that_never_returns_scores_zero() {
    let sandbox = Arc::new(FakeSandbox::new([
        SandboxOutcome::Missing { time: 1.0 },
        SandboxOutcome::Missing { time: 1.0 },
        SandboxOutcome::Missing { time: 1.0 },
    ]));
    let model = Arc::new(ScriptedModel::new(["1", "a", "b", "c", "unused"]));
    let report = Evaluation::new(config(0), program_task(&[2.0, 3.0], sandbox))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(model.calls(), 4);
    assert_eq!(report.record.total_count, 2);
    assert_eq!(report.record.correct_count, 0.0);
    assert!(model.prompts()[2].starts_with("The output code must **return the coordinates of each object**."));
}

#[tokio::test]
async fn test_program_keeps_best_attempt() {
    let sandbox = Arc::new(FakeSandbox::new([
        SandboxOutcome::Completed(vec![at_y(4.0), at_y(8.0), at_y(0.0)]),
        SandboxOutcome::Completed(vec![at_y(4.0), at_y(0.0), at_y(0.0)]),
    ]));
    let model = Arc::new(ScriptedModel::new(["1", "first", "second"]));
    let report = Evaluation::new(config(1), program_task(&[2.0, 3.0], sandbox))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.total_count, 2);
    assert_eq!(report.record.correct_count, 1.0);
    assert_eq!(
        model.prompts()[2],
        "Your answer for time 2 is correct. Your answer for object1 at time 3 is wrong. . You have a chance to try again. DO NOT output any other text, ONLY output runnable code."
    );
}
