//! Built-in reference tasks.
//!
//! One small oracle per family, used by the CLI and the integration tests:
//! a Caesar cipher, a number-guessing puzzle, seven-move rock-paper-scissors
//! against an imitating opponent, a prefix-XOR gate circuit, an instrumented
//! bubble sort and uniform straight-line motion.

use serde_json::Value;

use crate::checkpoint::{Bindings, CheckpointTracker, InstrumentedFunction, LocalVar, ParamKind, Parameter};
use crate::oracle::{CipherOracle, CircuitOracle, Coordinates, GameMatch, GameOracle, MotionOracle, Observation, PuzzleOracle};

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Shifts ASCII letters by a fixed amount, preserving case. Other
/// characters pass through.
#[derive(Debug, Clone, Copy)]
pub struct CaesarCipher {
    shift: u8,
}

impl CaesarCipher {
    pub fn new(shift: u8) -> Self {
        Self { shift: shift % 26 }
    }
}

impl Default for CaesarCipher {
    fn default() -> Self {
        Self::new(8)
    }
}

impl CipherOracle for CaesarCipher {
    fn encrypt(&self, plaintext: &str) -> String {
        plaintext
            .chars()
            .map(|c| match c {
                'a'..='z' => ((c as u8 - b'a' + self.shift) % 26 + b'a') as char,
                'A'..='Z' => ((c as u8 - b'A' + self.shift) % 26 + b'A') as char,
                other => other,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Puzzle
// ---------------------------------------------------------------------------

/// Guess a hidden `Number X` (0..=100); each query is answered `Far` or
/// `Close` (within 15).
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberGuessing;

impl NumberGuessing {
    const CLOSE: i64 = 15;

    fn parse(text: &str) -> Result<i64, &'static str> {
        let mut parts = text.split_whitespace();
        let (Some("Number"), Some(raw), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err("Query format incorrect. Please use the format 'Number X', where X is an integer between 0 and 100.");
        };
        let guess: i64 = raw
            .parse()
            .map_err(|_| "Query format incorrect. X should be an integer between 0 and 100.")?;
        if !(0..=100).contains(&guess) {
            return Err("Query out of range. X should be an integer between 0 and 100.");
        }
        Ok(guess)
    }
}

impl PuzzleOracle for NumberGuessing {
    fn respond(&self, secret: &str, query: &str) -> Observation {
        let guess = match Self::parse(query) {
            Ok(guess) => guess,
            Err(msg) => return Observation::rejected(msg),
        };
        let Ok(truth) = Self::parse(secret) else {
            return Observation::rejected("Internal error: truth format incorrect.");
        };
        if (guess - truth).abs() > Self::CLOSE {
            Observation::accepted("Far")
        } else {
            Observation::accepted("Close")
        }
    }

    fn check_format(&self, candidate: &str) -> bool {
        Self::parse(candidate).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

const RPS7_MOVES: [&str; 7] = ["rock", "paper", "scissors", "fire", "water", "air", "sponge"];

fn rps7_beats(a: &str, b: &str) -> bool {
    let beaten: &[&str] = match a {
        "rock" => &["scissors", "sponge", "fire"],
        "paper" => &["rock", "water", "air"],
        "scissors" => &["paper", "sponge", "fire"],
        "fire" => &["scissors", "paper", "sponge"],
        "water" => &["rock", "fire", "scissors"],
        "air" => &["fire", "rock", "water"],
        "sponge" => &["water", "paper", "air"],
        _ => &[],
    };
    beaten.contains(&b)
}

#[derive(Debug, Clone)]
struct Rps7Turn {
    player: Option<String>,
    opponent: &'static str,
    result: &'static str,
}

/// Seven-move rock-paper-scissors. The opponent opens `fire`, `air`, then
/// repeats the player's move from two turns earlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rps7ImitateLast;

impl Rps7ImitateLast {
    pub const DEFAULT_TURNS: u32 = 10;

    fn total_turns(settings: &Value) -> u32 {
        settings
            .get("total_turns")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(Self::DEFAULT_TURNS)
    }
}

impl GameOracle for Rps7ImitateLast {
    fn new_match(&self, settings: &Value) -> Box<dyn GameMatch> {
        Box::new(Rps7Match {
            total_turns: Self::total_turns(settings),
            history: Vec::new(),
            score: 0.0,
        })
    }

    fn max_score(&self, settings: &Value) -> f64 {
        f64::from(Self::total_turns(settings))
    }
}

#[derive(Debug, Clone)]
pub struct Rps7Match {
    total_turns: u32,
    history: Vec<Rps7Turn>,
    score: f64,
}

impl Rps7Match {
    fn turn(&self) -> u32 {
        self.history.len() as u32 + 1
    }

    fn opponent_move(&self) -> &'static str {
        match self.turn() {
            1 => "fire",
            2 => "air",
            _ => self
                .history
                .len()
                .checked_sub(2)
                .and_then(|i| self.history[i].player.as_deref())
                .and_then(|p| RPS7_MOVES.iter().copied().find(|m| *m == p))
                .unwrap_or(RPS7_MOVES[0]),
        }
    }
}

impl GameMatch for Rps7Match {
    fn is_finished(&self) -> bool {
        self.history.len() as u32 >= self.total_turns
    }

    fn prompt(&self) -> String {
        let turn = self.turn();
        let valid = RPS7_MOVES.join(", ");
        match self.history.last() {
            None => format!(
                "This is turn {turn} of {} in the game. Valid actions are: {valid}. There is no previous turn. Please reply with your action (one of the valid actions) only.",
                self.total_turns
            ),
            Some(last) => format!(
                "This is turn {turn} of {} in the game rock, paper, scissors, fire, water, air, sponge. Valid actions are: {valid}. Last turn, you played '{}', your opponent played '{}'. Result: {}. ",
                self.total_turns,
                last.player.as_deref().unwrap_or("nothing"),
                last.opponent,
                last.result
            ),
        }
    }

    fn parse_action(&self, raw: &str) -> Result<String, String> {
        let action = raw.trim().to_lowercase();
        if RPS7_MOVES.contains(&action.as_str()) {
            Ok(action)
        } else {
            Err(format!(
                "Your action '{raw}' is invalid. Please reply with a single valid action (one of: {}).",
                RPS7_MOVES.join(", ")
            ))
        }
    }

    fn apply(&mut self, action: Option<&str>) -> f64 {
        let opponent = self.opponent_move();
        let (result, points) = match action {
            Some(p) if p == opponent => ("tie", 0.0),
            Some(p) if rps7_beats(p, opponent) => ("win", 1.0),
            Some(p) if rps7_beats(opponent, p) => ("lose", -1.0),
            Some(_) => ("tie", 0.0),
            // A forfeited turn is a loss.
            None => ("lose", -1.0),
        };
        self.score += points;
        self.history.push(Rps7Turn {
            player: action.map(str::to_string),
            opponent,
            result,
        });
        points
    }

    fn score(&self) -> f64 {
        self.score
    }
}

// ---------------------------------------------------------------------------
// Circuit
// ---------------------------------------------------------------------------

/// A gate operand: input wire `n` or the output of gate `n`, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    Input(usize),
    Gate(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Not(Wire),
    And(Wire, Wire),
    Or(Wire, Wire),
}

/// A feed-forward circuit whose observable output is every gate's value.
#[derive(Debug, Clone)]
pub struct GateCircuit {
    inputs: usize,
    gates: Vec<Gate>,
}

impl GateCircuit {
    pub fn new(inputs: usize, gates: Vec<Gate>) -> Self {
        Self { inputs, gates }
    }

    /// Running XOR of the inputs, five gates per step:
    /// `s_i = (s_{i-1} AND NOT a_i) OR (NOT s_{i-1} AND a_i)`.
    pub fn prefix_xor(inputs: usize) -> Self {
        let mut gates = Vec::new();
        let mut prefix = Wire::Input(1);
        for i in 2..=inputs {
            let not_prefix = gates.len() + 1;
            gates.push(Gate::Not(prefix));
            let not_input = gates.len() + 1;
            gates.push(Gate::Not(Wire::Input(i)));
            let keep = gates.len() + 1;
            gates.push(Gate::And(prefix, Wire::Gate(not_input)));
            let flip = gates.len() + 1;
            gates.push(Gate::And(Wire::Gate(not_prefix), Wire::Input(i)));
            gates.push(Gate::Or(Wire::Gate(keep), Wire::Gate(flip)));
            prefix = Wire::Gate(gates.len());
        }
        Self::new(inputs, gates)
    }

    fn read(&self, wire: Wire, input: &[u8], outputs: &[u8]) -> Result<u8, String> {
        let value = match wire {
            Wire::Input(i) => i.checked_sub(1).and_then(|i| input.get(i)),
            Wire::Gate(g) => g.checked_sub(1).and_then(|g| outputs.get(g)),
        };
        value
            .copied()
            .ok_or_else(|| format!("gate reads undefined wire {wire:?}"))
    }
}

impl CircuitOracle for GateCircuit {
    fn input_width(&self) -> usize {
        self.inputs
    }

    fn output_width(&self) -> usize {
        self.gates.len()
    }

    fn simulate(&self, input: &[u8]) -> Result<Vec<u8>, String> {
        if input.len() != self.inputs || input.iter().any(|b| *b > 1) {
            return Err(format!(
                "Input must be a list of {} bits (0 or 1).",
                self.inputs
            ));
        }
        let mut outputs = Vec::with_capacity(self.gates.len());
        for gate in &self.gates {
            let bit = match *gate {
                Gate::Not(a) => 1 - self.read(a, input, &outputs)?,
                Gate::And(a, b) => self.read(a, input, &outputs)? & self.read(b, input, &outputs)?,
                Gate::Or(a, b) => self.read(a, input, &outputs)? | self.read(b, input, &outputs)?,
            };
            outputs.push(bit);
        }
        Ok(outputs)
    }
}

// ---------------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------------

/// Bubble sort over a list of numbers with three checkpoints: after the
/// length is taken, after every inner comparison, and at the end.
#[derive(Debug, Clone)]
pub struct BubbleSort {
    parameters: Vec<Parameter>,
}

impl BubbleSort {
    pub fn new() -> Self {
        Self {
            parameters: vec![Parameter::new("arr", ParamKind::List)],
        }
    }
}

impl Default for BubbleSort {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_locals(arr: &[f64], whole: bool, n: usize, i: Option<usize>, j: Option<usize>) -> Vec<LocalVar> {
    let items: Vec<Value> = arr
        .iter()
        .map(|x| {
            if whole {
                Value::from(*x as i64)
            } else {
                Value::from(*x)
            }
        })
        .collect();
    let mut locals = vec![LocalVar::new("arr", items), LocalVar::new("n", n)];
    if let Some(i) = i {
        locals.push(LocalVar::new("i", i));
    }
    if let Some(j) = j {
        locals.push(LocalVar::new("j", j));
    }
    locals
}

impl InstrumentedFunction for BubbleSort {
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn checkpoint_count(&self) -> usize {
        3
    }

    fn invoke(&self, inputs: &Bindings, tracker: &mut CheckpointTracker) -> Result<Value, String> {
        let items = inputs
            .get("arr")
            .ok_or("blackbox() missing 1 required positional argument: 'arr'")?
            .as_array()
            .ok_or("arr must be a list")?;
        let whole = items.iter().all(|v| v.is_i64() || v.is_u64());
        let mut arr = items
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| format!("unsupported element {v}")))
            .collect::<Result<Vec<f64>, String>>()?;

        let n = arr.len();
        tracker.visit(1, || sort_locals(&arr, whole, n, None, None));

        let (mut last_i, mut last_j) = (None, None);
        for i in 0..n {
            last_i = Some(i);
            for j in 0..n - i - 1 {
                last_j = Some(j);
                if arr[j] > arr[j + 1] {
                    arr.swap(j, j + 1);
                }
                tracker.visit(2, || sort_locals(&arr, whole, n, Some(i), Some(j)));
            }
        }

        tracker.visit(3, || sort_locals(&arr, whole, n, last_i, last_j));
        Ok(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Physics
// ---------------------------------------------------------------------------

/// Objects moving in straight lines at constant velocity from fixed
/// starting points. Positions are rounded to two decimals.
#[derive(Debug, Clone)]
pub struct UniformMotion {
    objects: Vec<(String, [f64; 3], [f64; 3])>,
}

impl UniformMotion {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    pub fn with_object(mut self, name: impl Into<String>, start: [f64; 3], velocity: [f64; 3]) -> Self {
        self.objects.push((name.into(), start, velocity));
        self
    }

    /// One object climbing the y axis at 4 units per second.
    pub fn single() -> Self {
        Self::new().with_object("object1", [0.0; 3], [0.0, 4.0, 0.0])
    }
}

impl Default for UniformMotion {
    fn default() -> Self {
        Self::single()
    }
}

impl MotionOracle for UniformMotion {
    fn positions(&self, t: f64) -> Coordinates {
        let round = |v: f64| (v * 100.0).round() / 100.0;
        self.objects
            .iter()
            .fold(Coordinates::new(), |coords, (name, start, velocity)| {
                coords.with(
                    name.clone(),
                    [
                        round(start[0] + velocity[0] * t),
                        round(start[1] + velocity[1] * t),
                        round(start[2] + velocity[2] * t),
                    ],
                )
            })
    }
}
