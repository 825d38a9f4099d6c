//! Domain-level error taxonomy for probe sessions.
//!
//! Only hard failures live in [`ProbeError`]. Recoverable outcomes (a
//! malformed reply, a wrong answer, a crashing submitted program) are
//! ordinary values handled inside the controller and never surface here.

use crate::sandbox::SandboxError;
use crate::transcript::TranscriptError;

/// Failures of the conversational model collaborator.
///
/// The protocol layer never retries these; they propagate to the host.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion payload: {0}")]
    Payload(String),

    #[error("scripted model exhausted after {served} replies")]
    ScriptExhausted { served: usize },
}

/// A raw model utterance that does not parse under a family grammar.
///
/// Returned by every [`ActionValidator`](crate::validator::ActionValidator);
/// consumed by the bounded format-retry loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("format error: {reason}")]
pub struct FormatError {
    pub reason: String,
}

impl FormatError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Hard failures that abort a session.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Shorthand for a pre-session configuration failure.
    pub fn config(msg: impl Into<String>) -> Self {
        ProbeError::Configuration(msg.into())
    }
}

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        let err = ProbeError::config("no samples for caesar_cipher");
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("caesar_cipher"));

        let err = ProbeError::from(TransportError::Status {
            status: 429,
            body: "rate limited".to_string(),
        });
        let msg = err.to_string();
        assert!(msg.contains("transport error"));
        assert!(msg.contains("429"));
    }

    #[test]
    fn test_format_error_carries_reason() {
        let err = FormatError::new("expected 4 bits, found 2");
        assert_eq!(err.reason, "expected 4 bits, found 2");
        assert!(err.to_string().contains("expected 4 bits"));
    }

    #[test]
    fn test_transport_error_converts() {
        let err: ProbeError = TransportError::ScriptExhausted { served: 3 }.into();
        assert!(matches!(err, ProbeError::Transport(_)));
    }
}
