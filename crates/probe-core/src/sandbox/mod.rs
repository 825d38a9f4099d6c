//! Sandbox: isolated execution of model-submitted programs.
//!
//! The physics code-submission variant asks the model for a `solution(t)`
//! function. That text is adversarial, so it never runs in-process: a
//! [`CodeSandbox`] runs it in a separate interpreter under a wall-clock
//! timeout and an output cap, and reports a [`SandboxOutcome`]: the
//! coordinates, a missing return, or a failure reason.
//!
//! # Modules
//!
//! - [`execution`]: `SandboxConfig`, `CodeSandbox`, `ProcessSandbox`
//! - [`error`]: `SandboxError` / `SandboxResult`

pub mod error;
pub mod execution;

pub use error::{SandboxError, SandboxResult};
pub use execution::{CodeSandbox, ProcessSandbox, SandboxConfig, SandboxOutcome};
