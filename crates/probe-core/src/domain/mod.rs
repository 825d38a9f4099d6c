//! Domain models for probe sessions.
//!
//! Canonical definitions for:
//! - `SessionConfig`: budgets, participant and priming prompts
//! - Samples: one typed test instance per task family
//! - Errors: hard failures (`ProbeError`) vs. recoverable `FormatError`

pub mod config;
pub mod error;
pub mod sample;

// Re-export main types and errors
pub use config::{Difficulty, Participant, SessionConfig, DEFAULT_ACKNOWLEDGEMENT};
pub use error::{FormatError, ProbeError, Result, TransportError};
pub use sample::{
    CheckpointQuery, CircuitSample, CodeSample, EncryptionSample, GameSample, PhysicsSample,
    PuzzleSample, SampleSet,
};
