//! Checkpoint instrumentation for the code family.
//!
//! A reference function is written against [`CheckpointTracker`]: at each
//! checkpoint marker it calls [`CheckpointTracker::visit`] with a closure that
//! captures its locals. The tracker counts visits per checkpoint and, when the
//! target `(index, iteration)` is reached, keeps a [`Snapshot`].
//!
//! Trackers are plain values owned by one invocation. Every invocation starts
//! from [`CheckpointTracker::new`], so no visit count can leak from one sample
//! into the next and concurrent sessions never share state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Ordered name -> value input bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Bind `name`, replacing an existing binding in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}

/// Renders as a Python dict literal: `{'arr': [3, 1, 2], 'n': 3}`.
impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", quote(name), render_value(value))?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Value rendering
// ---------------------------------------------------------------------------

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Python `repr` of a JSON value.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), render_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Python `str` of a JSON value: like [`render_value`] but a top-level
/// string is not quoted. This is the form answers are compared in.
pub fn answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => render_value(other),
    }
}

/// Python type name of a JSON value.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One captured local variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVar {
    pub name: String,
    pub value: Value,
}

impl LocalVar {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for LocalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={}, value={}, type={}",
            self.name,
            answer_text(&self.value),
            type_name(&self.value)
        )
    }
}

/// Local state at one checkpoint visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub index: usize,
    pub iteration: u32,
    pub locals: Vec<LocalVar>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.locals.iter().find(|l| l.name == name).map(|l| &l.value)
    }

    /// `['name=i, value=0, type=int', ...]`
    pub fn render(&self) -> String {
        let entries: Vec<String> = self
            .locals
            .iter()
            .map(|l| quote(&l.to_string()))
            .collect();
        format!("[{}]", entries.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Visit counter for one invocation of an instrumented function.
///
/// Checkpoint indices are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointTracker {
    counters: Vec<u32>,
    target: Option<(usize, u32)>,
    captured: Option<Snapshot>,
}

impl CheckpointTracker {
    /// Fresh tracker with every counter at zero.
    pub fn new(checkpoint_count: usize) -> Self {
        Self {
            counters: vec![0; checkpoint_count],
            target: None,
            captured: None,
        }
    }

    /// Fresh tracker that captures the `iteration`-th visit of `index`.
    pub fn targeting(checkpoint_count: usize, index: usize, iteration: u32) -> Self {
        Self {
            target: Some((index, iteration)),
            ..Self::new(checkpoint_count)
        }
    }

    /// Record a visit to checkpoint `index`.
    ///
    /// `locals` is only evaluated when this visit is the target. Visits to
    /// indices outside `1..=checkpoint_count` are ignored.
    pub fn visit<F>(&mut self, index: usize, locals: F)
    where
        F: FnOnce() -> Vec<LocalVar>,
    {
        let Some(counter) = index.checked_sub(1).and_then(|i| self.counters.get_mut(i)) else {
            return;
        };
        *counter += 1;
        let count = *counter;
        if self.captured.is_none() && self.target == Some((index, count)) {
            self.captured = Some(Snapshot {
                index,
                iteration: count,
                locals: locals(),
            });
        }
    }

    /// Visits so far to checkpoint `index` (0 for unknown indices).
    pub fn visits(&self, index: usize) -> u32 {
        index
            .checked_sub(1)
            .and_then(|i| self.counters.get(i))
            .copied()
            .unwrap_or(0)
    }

    pub fn captured(&self) -> Option<&Snapshot> {
        self.captured.as_ref()
    }

    pub fn into_captured(self) -> Option<Snapshot> {
        self.captured
    }

    /// Reject queries that no run with the current inputs can satisfy.
    ///
    /// Must be called on a tracker that has seen one complete run.
    pub fn check_query(&self, index: usize, iteration: u32) -> Result<(), String> {
        let visits = self.visits(index);
        if visits == 0 {
            return Err(format!(
                "Checkpoint {index} does not exist or cannot be queried at current state"
            ));
        }
        if iteration > visits {
            return Err(format!(
                "Query iteration {iteration} exceeds maximum possible visits {visits} for checkpoint {index}"
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Instrumented functions
// ---------------------------------------------------------------------------

/// Declared type of one function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    Str,
    List,
    Dict,
}

/// Respell a Python literal as JSON. Quoted spans are copied verbatim
/// apart from quoting; `True`/`False`/`None` are rewritten only as bare
/// words.
fn python_literal_to_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push_str("\\\\"),
                        },
                        q if q == c => break,
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
    out
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "str",
            ParamKind::List => "list",
            ParamKind::Dict => "dict",
        }
    }

    /// Parse a literal typed as this kind.
    ///
    /// Accepts JSON literals plus Python's single-quoted strings and
    /// `True`/`False`/`None` inside containers.
    pub fn parse_literal(self, raw: &str) -> Result<Value, String> {
        let raw = raw.trim();
        if self == ParamKind::Str {
            let unquoted = raw
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
                .unwrap_or(raw);
            return Ok(Value::String(unquoted.to_string()));
        }

        let value: Value = serde_json::from_str(&python_literal_to_json(raw))
            .map_err(|_| format!("expected a value of type {}, got {raw}", self.as_str()))?;
        let ok = match self {
            ParamKind::Int => value.is_i64() || value.is_u64(),
            ParamKind::Float => value.is_number(),
            ParamKind::List => value.is_array(),
            ParamKind::Dict => value.is_object(),
            ParamKind::Str => true,
        };
        if ok {
            Ok(value)
        } else {
            Err(format!("expected a value of type {}, got {raw}", self.as_str()))
        }
    }
}

/// A named, typed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.kind.as_str())
    }
}

/// A reference algorithm with checkpoint markers.
pub trait InstrumentedFunction: Send + Sync {
    fn parameters(&self) -> &[Parameter];

    fn checkpoint_count(&self) -> usize;

    /// Run once against `inputs`, reporting checkpoint visits to `tracker`.
    ///
    /// Errors are input problems (missing or mistyped bindings) and are
    /// surfaced to the model as observations.
    fn invoke(&self, inputs: &Bindings, tracker: &mut CheckpointTracker) -> Result<Value, String>;
}

/// Why a checkpoint could not be captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The function itself failed on the current inputs.
    Invocation(String),
    /// The inputs are fine but the checkpoint or iteration is never reached.
    Unreachable(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Invocation(msg) | CaptureError::Unreachable(msg) => f.write_str(msg),
        }
    }
}

/// Run `function` twice on fresh trackers: once to validate the query
/// against the real visit counts, once to capture the snapshot.
pub fn capture(
    function: &dyn InstrumentedFunction,
    inputs: &Bindings,
    index: usize,
    iteration: u32,
) -> Result<Snapshot, CaptureError> {
    let count = function.checkpoint_count();

    let mut census = CheckpointTracker::new(count);
    function
        .invoke(inputs, &mut census)
        .map_err(CaptureError::Invocation)?;
    census
        .check_query(index, iteration)
        .map_err(CaptureError::Unreachable)?;

    let mut tracker = CheckpointTracker::targeting(count, index, iteration);
    function
        .invoke(inputs, &mut tracker)
        .map_err(CaptureError::Invocation)?;
    tracker.into_captured().ok_or_else(|| {
        CaptureError::Unreachable(format!(
            "Checkpoint {index} does not exist or cannot be queried at current state"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Countdown;

    impl InstrumentedFunction for Countdown {
        fn parameters(&self) -> &[Parameter] {
            &[]
        }

        fn checkpoint_count(&self) -> usize {
            1
        }

        fn invoke(&self, inputs: &Bindings, tracker: &mut CheckpointTracker) -> Result<Value, String> {
            let n = inputs.get("n").and_then(Value::as_i64).ok_or("n missing")?;
            for i in (0..n).rev() {
                tracker.visit(1, || vec![LocalVar::new("i", i)]);
            }
            Ok(Value::Null)
        }
    }

    fn n(v: i64) -> Bindings {
        [("n".to_string(), json!(v))].into_iter().collect()
    }

    #[test]
    fn test_render_value_is_python_like() {
        assert_eq!(render_value(&json!([1, "a", true, null])), "[1, 'a', True, None]");
        assert_eq!(render_value(&json!({"k": 1.5})), "{'k': 1.5}");
        assert_eq!(answer_text(&json!("abc")), "abc");
    }

    #[test]
    fn test_bindings_display_and_replace() {
        let mut b: Bindings = [
            ("arr".to_string(), json!([3, 1, 2])),
            ("n".to_string(), json!(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(b.to_string(), "{'arr': [3, 1, 2], 'n': 3}");
        b.insert("n", json!(4));
        assert_eq!(b.len(), 2);
        assert_eq!(b.get("n"), Some(&json!(4)));
    }

    #[test]
    fn test_local_var_line() {
        let v = LocalVar::new("arr", json!([1, 2]));
        assert_eq!(v.to_string(), "name=arr, value=[1, 2], type=list");
    }

    #[test]
    fn test_snapshot_render() {
        let snap = Snapshot {
            index: 1,
            iteration: 1,
            locals: vec![LocalVar::new("i", 0), LocalVar::new("s", "ab")],
        };
        assert_eq!(
            snap.render(),
            "['name=i, value=0, type=int', 'name=s, value=ab, type=str']"
        );
    }

    #[test]
    fn test_capture_target_iteration() {
        let snap = capture(&Countdown, &n(3), 1, 2).expect("capture");
        assert_eq!(snap.get("i"), Some(&json!(1)));
    }

    #[test]
    fn test_capture_rejects_unknown_checkpoint() {
        let err = capture(&Countdown, &n(3), 2, 1).unwrap_err();
        assert_eq!(
            err,
            CaptureError::Unreachable(
                "Checkpoint 2 does not exist or cannot be queried at current state".into()
            )
        );
    }

    #[test]
    fn test_capture_rejects_iteration_past_max() {
        let err = capture(&Countdown, &n(2), 1, 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query iteration 5 exceeds maximum possible visits 2 for checkpoint 1"
        );
    }

    #[test]
    fn test_capture_reports_invocation_failure() {
        let err = capture(&Countdown, &Bindings::new(), 1, 1).unwrap_err();
        assert_eq!(err, CaptureError::Invocation("n missing".into()));
    }

    #[test]
    fn test_trackers_do_not_share_counts() {
        let mut a = CheckpointTracker::new(1);
        Countdown.invoke(&n(5), &mut a).unwrap();
        let mut b = CheckpointTracker::new(1);
        Countdown.invoke(&n(2), &mut b).unwrap();
        assert_eq!(a.visits(1), 5);
        assert_eq!(b.visits(1), 2);
    }

    #[test]
    fn test_param_kind_parse_literal() {
        assert_eq!(ParamKind::List.parse_literal("[1, 2]").unwrap(), json!([1, 2]));
        assert_eq!(ParamKind::Int.parse_literal(" 7 ").unwrap(), json!(7));
        assert_eq!(ParamKind::Str.parse_literal("'abc'").unwrap(), json!("abc"));
        assert!(ParamKind::Int.parse_literal("[1]").is_err());
        assert!(ParamKind::List.parse_literal("[1,").is_err());
    }

    #[test]
    fn test_parse_literal_leaves_string_contents_alone() {
        assert_eq!(
            ParamKind::List.parse_literal("['TrueX', None, True]").unwrap(),
            json!(["TrueX", null, true])
        );
        assert_eq!(
            ParamKind::List.parse_literal(r"['it\'s']").unwrap(),
            json!(["it's"])
        );
        assert_eq!(
            ParamKind::List.parse_literal(r#"["say 'None'"]"#).unwrap(),
            json!(["say 'None'"])
        );
        assert_eq!(
            ParamKind::Dict.parse_literal(r#"{'k': "a\"b"}"#).unwrap(),
            json!({"k": "a\"b"})
        );
        assert!(ParamKind::List.parse_literal("[Truthy]").is_err());
    }
}
