//! Circuit sessions over the prefix-XOR circuit.

use std::sync::Arc;

use probe_core::catalog::GateCircuit;
use probe_core::fakes::ScriptedModel;
use probe_core::{
    CircuitOracle, CircuitSample, CircuitTask, Evaluation, Participant, SampleSet, SessionConfig,
    TaskFamily,
};

fn config(max_turns: u32, failure_num: u32) -> SessionConfig {
    SessionConfig::new("prefix_xor", Participant::new("fake", "scripted"))
        .with_max_turns(max_turns)
        .with_failure_num(failure_num)
        .with_prompts("sys", "Find the circuit.")
}

fn task(inputs: &[Vec<u8>]) -> TaskFamily {
    let samples = SampleSet::new(
        inputs
            .iter()
            .map(|input| CircuitSample {
                input: input.clone(),
            })
            .collect(),
    )
    .expect("non-empty samples");
    TaskFamily::Circuit(CircuitTask::new(Arc::new(GateCircuit::prefix_xor(4)), samples))
}

fn truth(input: &[u8]) -> Vec<u8> {
    GateCircuit::prefix_xor(4).simulate(input).expect("valid input")
}

#[tokio::test]
async fn test_gate_outputs_are_judged_as_bit_lists() {
    let first = truth(&[1, 1, 0, 0]);
    let second = truth(&[0, 1, 1, 1]);
    let spaced = second
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let model = Arc::new(ScriptedModel::new([
        "[1, 0, 0, 0]".to_string(),
        format!("{first:?}"),
        spaced,
    ]));
    let report = Evaluation::new(config(1, 0), task(&[vec![1, 1, 0, 0], vec![0, 1, 1, 1]]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 2.0);
    let prompts = model.prompts();
    assert!(prompts[0].starts_with("Game start! You are interacting with a blackbox Boolean circuit with 4 input wires."));
    assert!(prompts[1].starts_with("[Platform] Gate outputs: ["));
    assert!(prompts[1].contains("[Platform] Game over."));
    assert!(prompts[1].ends_with("given the input [1, 1, 0, 0], answer the output of the gates in the format we dicussed without any text else."));
    assert!(prompts[2].starts_with("In this turn, given the input [0, 1, 1, 1]"));
}

#[tokio::test]
async fn test_wrong_outputs_name_the_input() {
    let answer = truth(&[1, 0, 1, 0]);
    let wrong = vec![0u8; answer.len()];
    let model = Arc::new(ScriptedModel::new([
        "[0, 0, 0, 0]".to_string(),
        "[1, 1, 1, 1]".to_string(),
        format!("{wrong:?}"),
        format!("{answer:?}"),
    ]));
    let report = Evaluation::new(config(2, 1), task(&[vec![1, 0, 1, 0]]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    let prompts = model.prompts();
    assert!(prompts[1].contains("[Platform] Rounds remaining: 1"));
    assert_eq!(prompts[3], "the answer is wrong when input = [1, 0, 1, 0]");
}

#[tokio::test]
async fn test_bad_probe_is_rejected() {
    let answer = truth(&[1, 0, 0, 0]);
    let model = Arc::new(ScriptedModel::new([
        "[1, 0]".to_string(),
        "[1, 0, 0, 0]".to_string(),
        format!("{answer:?}"),
    ]));
    let report = Evaluation::new(config(2, 0), task(&[vec![1, 0, 0, 0]]))
        .run(model.clone())
        .await
        .expect("session runs");

    assert_eq!(report.record.correct_count, 1.0);
    assert!(model.prompts()[1].starts_with("[Platform] Invalid input format."));
    assert!(report
        .transcript
        .working()
        .iter()
        .all(|t| t.content != "[1, 0]"));
}
