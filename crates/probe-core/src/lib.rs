//! Probe Core Library
//!
//! Drives a language model through a black-box reasoning probe: a bounded
//! exploration phase against a hidden oracle, then scored questions with
//! format and correctness retries, aggregated into one score record per run.

pub mod catalog;
pub mod checkpoint;
pub mod client;
pub mod domain;
pub mod fakes;
pub mod family;
pub mod obs;
pub mod oracle;
pub mod reporting;
pub mod sandbox;
pub mod score;
pub mod session;
pub mod telemetry;
pub mod transcript;
pub mod validator;

pub use checkpoint::{
    capture, Bindings, CaptureError, CheckpointTracker, InstrumentedFunction, LocalVar, ParamKind,
    Parameter, Snapshot,
};
pub use client::{ClientConfig, ModelClient, ModelReply, OpenAiCompatClient};
pub use domain::{
    CheckpointQuery, CircuitSample, CodeSample, Difficulty, EncryptionSample, FormatError,
    GameSample, Participant, PhysicsSample, ProbeError, PuzzleSample, Result, SampleSet,
    SessionConfig, TransportError,
};
pub use family::{
    CircuitTask, CodePlatform, CodeTask, EncryptionTask, Evaluation, GameTask, PhysicsMode,
    PhysicsTask, PuzzleTask, SessionReport, TaskFamily,
};
pub use obs::SessionSpan;
pub use oracle::{
    CipherOracle, CircuitOracle, Coordinates, GameMatch, GameOracle, MotionOracle, Observation,
    PuzzleOracle,
};
pub use reporting::{
    read_session_artifact, render_summary_md, write_session_artifact, SessionArtifact,
};
pub use sandbox::{CodeSandbox, ProcessSandbox, SandboxConfig, SandboxError, SandboxOutcome};
pub use score::{read_jsonl, JsonlSink, MemorySink, ResultSink, ScoreAggregator, ScoreRecord};
pub use session::{AbortHandle, Answered, Judgement, Session, TurnResult};
pub use telemetry::init_tracing;
pub use transcript::{Role, Transcript, TranscriptError, TranscriptMark, Turn};
pub use validator::{
    ActionValidator, BitVectorValidator, CharsetValidator, CoordinateValidator, NonEmptyValidator,
    NumericValidator, PredicateValidator,
};

/// Probe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
