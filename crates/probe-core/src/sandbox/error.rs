//! Error types for the sandbox module.

/// Infrastructure failures of the sandbox itself.
///
/// A submitted program that crashes, hangs or prints garbage is not an
/// error: it is a [`SandboxOutcome::Failed`](super::SandboxOutcome::Failed).
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("sandbox io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
