//! Execution controls: separate interpreter, timeout, output cap, memory cap.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::error::{SandboxError, SandboxResult};
use crate::oracle::Coordinates;

/// Marker line that precedes the harness result on stdout.
const RESULT_MARKER: &str = "__PROBE_RESULT__";

/// Configuration for sandboxed program execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter executable.
    pub program: String,
    /// Interpreter arguments; the harness is fed on stdin.
    pub args: Vec<String>,
    /// Maximum wall-clock time for one run (milliseconds).
    pub timeout_ms: u64,
    /// Stdout beyond this many bytes kills the child and fails the run.
    pub max_output_bytes: usize,
    /// Address-space limit set inside the child before the submission
    /// runs. `0` leaves it unlimited.
    pub max_memory_bytes: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-I".to_string(), "-".to_string()],
            timeout_ms: 10_000,
            max_output_bytes: 64 * 1024,
            max_memory_bytes: 512 * 1024 * 1024,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> SandboxResult<()> {
        if self.program.trim().is_empty() {
            return Err(SandboxError::InvalidConfig("program must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(SandboxError::InvalidConfig("timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// What a submitted program produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SandboxOutcome {
    /// One coordinate dict per requested time, in request order.
    Completed(Vec<Coordinates>),
    /// `solution(time)` returned nothing.
    Missing { time: f64 },
    /// The program raised, hung, returned the wrong shape or flooded stdout.
    Failed { reason: String },
}

impl SandboxOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        SandboxOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// Runs a submitted `solution(t)` for a batch of times.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn run_solution(&self, source: &str, times: &[f64]) -> SandboxResult<SandboxOutcome>;
}

// ---------------------------------------------------------------------------
// Subprocess sandbox
// ---------------------------------------------------------------------------

/// Runs submissions in a fresh interpreter process per call.
///
/// The child gets an empty environment, isolated mode, and is killed when
/// the timeout elapses.
#[derive(Debug, Clone, Default)]
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> SandboxResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

/// Python harness: cap the address space, define the submission in a
/// private namespace, call `solution` for each time, print one marked JSON
/// line.
fn harness(source: &str, times: &[f64], max_memory_bytes: u64) -> SandboxResult<String> {
    let source_literal = serde_json::to_string(source)
        .map_err(|e| SandboxError::InvalidConfig(e.to_string()))?;
    let times_literal =
        serde_json::to_string(times).map_err(|e| SandboxError::InvalidConfig(e.to_string()))?;
    Ok(format!(
        r#"import json
if {max_memory_bytes} > 0:
    try:
        import resource
        resource.setrlimit(resource.RLIMIT_AS, ({max_memory_bytes}, {max_memory_bytes}))
    except (ImportError, ValueError, OSError):
        pass
_source = {source_literal}
_times = {times_literal}
def _point(_k, _v):
    _v = [float(_c) for _c in list(_v)]
    if len(_v) != 3:
        raise ValueError("coordinate of " + str(_k) + " must have 3 components")
    return [str(_k), _v]
def _run():
    _ns = {{}}
    exec(compile(_source, "<solution>", "exec"), _ns)
    if "solution" not in _ns:
        raise NameError("name 'solution' is not defined")
    _out = []
    for _t in _times:
        _r = _ns["solution"](_t)
        if _r is None:
            return {{"missing": _t}}
        _out.append([_point(_k, _v) for _k, _v in dict(_r).items()])
    return {{"ok": _out}}
try:
    _payload = _run()
except BaseException as _e:
    _payload = {{"error": type(_e).__name__ + ": " + str(_e)}}
print()
print("{RESULT_MARKER}" + json.dumps(_payload))
"#
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum HarnessPayload {
    Ok(Vec<Vec<(String, [f64; 3])>>),
    Missing(f64),
    Error(String),
}

fn parse_harness_output(stdout: &str, stderr: &str) -> SandboxOutcome {
    let Some(line) = stdout
        .lines()
        .rev()
        .find_map(|l| l.strip_prefix(RESULT_MARKER))
    else {
        let detail = stderr.lines().last().unwrap_or("no output");
        return SandboxOutcome::failed(format!("program did not finish: {detail}"));
    };

    match serde_json::from_str::<HarnessPayload>(line) {
        Ok(HarnessPayload::Ok(batches)) => SandboxOutcome::Completed(
            batches
                .into_iter()
                .map(|objects| {
                    objects
                        .into_iter()
                        .fold(Coordinates::new(), |c, (name, pos)| c.with(name, pos))
                })
                .collect(),
        ),
        Ok(HarnessPayload::Missing(time)) => SandboxOutcome::Missing { time },
        Ok(HarnessPayload::Error(reason)) => SandboxOutcome::Failed { reason },
        Err(e) => SandboxOutcome::failed(format!("unreadable result: {e}")),
    }
}

/// Read at most `cap + 1` bytes, so a result longer than `cap` means the
/// stream overflowed.
async fn read_capped<R: AsyncRead + Unpin>(reader: R, cap: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(cap as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    Ok(buf)
}

async fn stop(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "sandbox child already gone");
    }
}

fn timed_out(timeout_ms: u64) -> SandboxOutcome {
    warn!(limit_ms = timeout_ms, "submitted program timed out");
    SandboxOutcome::failed(format!("execution timed out after {timeout_ms}ms"))
}

#[async_trait]
impl CodeSandbox for ProcessSandbox {
    async fn run_solution(&self, source: &str, times: &[f64]) -> SandboxResult<SandboxOutcome> {
        let script = harness(source, times, self.config.max_memory_bytes)?;
        let cap = self.config.max_output_bytes;
        let limit = Duration::from_millis(self.config.timeout_ms);
        let start = Instant::now();

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Spawn {
                program: self.config.program.clone(),
                reason: e.to_string(),
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            stop(&mut child).await;
            return Err(SandboxError::Io(std::io::Error::other(
                "child stdio was not captured",
            )));
        };
        let stderr_reader = tokio::spawn(read_capped(stderr, cap));

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stdout = match tokio::time::timeout(limit, read_capped(stdout, cap)).await {
            Ok(read) => read?,
            Err(_elapsed) => {
                stop(&mut child).await;
                stderr_reader.abort();
                return Ok(timed_out(self.config.timeout_ms));
            }
        };

        if stdout.len() > cap {
            warn!(limit_bytes = cap, "submitted program flooded stdout");
            stop(&mut child).await;
            stderr_reader.abort();
            return Ok(SandboxOutcome::failed(format!("output exceeds {cap} bytes")));
        }

        let remaining = limit.saturating_sub(start.elapsed());
        match tokio::time::timeout(remaining, child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_elapsed) => {
                stop(&mut child).await;
                stderr_reader.abort();
                return Ok(timed_out(self.config.timeout_ms));
            }
        }
        let stderr = match stderr_reader.await {
            Ok(Ok(bytes)) => bytes,
            _ => Vec::new(),
        };

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            stdout_bytes = stdout.len(),
            "sandbox run finished"
        );

        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);
        Ok(parse_harness_output(&stdout, &stderr))
    }
}
