//! In-memory fakes for the collaborator traits (tests and dry runs)
//!
//! Provides `ScriptedModel` and `FakeSandbox` that satisfy the
//! [`ModelClient`] and [`CodeSandbox`] contracts without network or
//! subprocess access.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ModelClient, ModelReply};
use crate::domain::error::TransportError;
use crate::sandbox::{CodeSandbox, SandboxOutcome, SandboxResult};
use crate::session::AbortHandle;
use crate::transcript::{Role, Turn};

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<ModelReply>,
    seen: Vec<Vec<Turn>>,
}

/// Model that replays a fixed queue of replies.
///
/// Every working transcript it is shown is recorded. An empty queue yields
/// `TransportError::ScriptExhausted`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<Script>,
    abort_after: Option<(usize, AbortHandle)>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(replies.into_iter().map(|r| ModelReply::text(r)))
    }

    pub fn from_replies(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            script: Mutex::new(Script {
                replies: replies.into_iter().collect(),
                seen: Vec::new(),
            }),
            abort_after: None,
        }
    }

    /// Trip `handle` once `served` replies have been handed out.
    pub fn with_abort_after(mut self, served: usize, handle: AbortHandle) -> Self {
        self.abort_after = Some((served, handle));
        self
    }

    /// Number of completed `respond` calls.
    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().seen.len()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().replies.len()
    }

    /// Working transcripts in call order.
    pub fn seen(&self) -> Vec<Vec<Turn>> {
        self.script.lock().unwrap().seen.clone()
    }

    /// The user prompt each call answered.
    pub fn prompts(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .seen
            .iter()
            .filter_map(|t| t.iter().rev().find(|turn| turn.role == Role::User))
            .map(|turn| turn.content.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn respond(&self, transcript: &[Turn]) -> Result<ModelReply, TransportError> {
        let mut script = self.script.lock().unwrap();
        let served = script.seen.len();
        let reply = script
            .replies
            .pop_front()
            .ok_or(TransportError::ScriptExhausted { served })?;
        script.seen.push(transcript.to_vec());

        if let Some((limit, handle)) = &self.abort_after {
            if script.seen.len() >= *limit {
                handle.abort();
            }
        }
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// FakeSandbox
// ---------------------------------------------------------------------------

/// Sandbox that returns queued outcomes and records submitted sources.
#[derive(Debug, Default)]
pub struct FakeSandbox {
    outcomes: Mutex<VecDeque<SandboxOutcome>>,
    sources: Mutex<Vec<String>>,
}

impl FakeSandbox {
    pub fn new(outcomes: impl IntoIterator<Item = SandboxOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeSandbox for FakeSandbox {
    async fn run_solution(&self, source: &str, _times: &[f64]) -> SandboxResult<SandboxOutcome> {
        self.sources.lock().unwrap().push(source.to_string());
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SandboxOutcome::failed("no scripted outcome")))
    }
}
