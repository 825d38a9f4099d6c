//! Probe CLI
//!
//! The `probe` command runs black-box reasoning sessions against an
//! OpenAI-compatible endpoint.
//!
//! ## Commands
//!
//! - `run`: play one session of a built-in reference task and append its
//!   score record to a JSONL file
//! - `summarize`: render a JSONL results file as a markdown table

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use probe_core::catalog::{
    BubbleSort, CaesarCipher, GateCircuit, NumberGuessing, Rps7ImitateLast, UniformMotion,
};
use probe_core::{
    init_tracing, read_jsonl, render_summary_md, write_session_artifact, CircuitTask, ClientConfig,
    CodeTask, Difficulty, EncryptionTask, Evaluation, GameTask, JsonlSink, OpenAiCompatClient,
    Participant, PhysicsTask, ProcessSandbox, PuzzleTask, SampleSet, SandboxConfig,
    SessionArtifact, SessionConfig, TaskFamily,
};

const SYSTEM_PROMPT: &str = "You are an intelligent agent exploring a black-box system. \
Use your queries to work out how it behaves, then answer questions about it.";

#[derive(Parser)]
#[command(name = "probe")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Black-box reasoning probe for language models", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one session of a built-in task
    Run(RunArgs),

    /// Summarize a JSONL results file
    Summarize {
        /// Results file written by `probe run`
        #[arg(default_value = "results.jsonl")]
        results: PathBuf,
    },
}

/// Built-in reference tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Task {
    Caesar,
    NumberGuessing,
    Rps7,
    PrefixXor,
    BubbleSort,
    UniformMotion,
}

impl Task {
    fn id(self) -> &'static str {
        match self {
            Task::Caesar => "caesar_cipher",
            Task::NumberGuessing => "number_guessing",
            Task::Rps7 => "rps7_imitate_last",
            Task::PrefixXor => "prefix_xor",
            Task::BubbleSort => "bubble_sort",
            Task::UniformMotion => "uniform_motion",
        }
    }

    fn intro(self) -> &'static str {
        match self {
            Task::Caesar => "The black-box encrypts a plaintext. Send a plaintext and it returns the ciphertext. Work out the encryption rule.",
            Task::NumberGuessing => "The black-box hides a number between 0 and 100. Query with 'Number X' and it answers 'Close' or 'Far'. Answer in the same 'Number X' format.",
            Task::Rps7 => "You play rock, paper, scissors, fire, water, air, sponge against an opponent with a fixed strategy. Find the strategy and beat it.",
            Task::PrefixXor => "The black-box is a Boolean circuit. Send a list of input bits and it returns the output of every gate.",
            Task::BubbleSort => "The black-box is an instrumented function. Set its inputs and query its checkpoints to learn what it does.",
            Task::UniformMotion => "The black-box is a mechanical system. Send a time and it returns the coordinate of each object at that time.",
        }
    }

    /// Samples used when no `--samples` file is given.
    fn default_samples(self) -> &'static str {
        match self {
            Task::Caesar => r#"[{"plaintext": "hello world"}, {"plaintext": "black box"}, {"plaintext": "Reasoning"}]"#,
            Task::NumberGuessing => r#"[{"answer": "Number 42"}, {"answer": "Number 7"}, {"answer": "Number 88"}]"#,
            Task::Rps7 => r#"[{"total_turns": 10}]"#,
            Task::PrefixXor => r#"[{"input": [1, 0, 1, 1, 0, 0, 0, 1]}, {"input": [0, 1, 1, 0, 1, 0, 0, 1]}]"#,
            Task::BubbleSort => r#"[{"var_names": ["arr"], "var_values": [[5, 2, 4, 1]], "checkpoints": [[2, 3, "arr"], [3, 1, "arr"]]}]"#,
            Task::UniformMotion => r#"[{"time": 2.0}, {"time": 3.5}]"#,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Task to run
    #[arg(long, value_enum)]
    task: Task,

    /// JSON array of samples (default: built-in samples for the task)
    #[arg(long)]
    samples: Option<PathBuf>,

    /// Difficulty tag recorded with the score
    #[arg(long, default_value = "baseline")]
    difficulty: String,

    /// Exploration turns before answering
    #[arg(long, default_value_t = 10)]
    max_turns: u32,

    /// Extra answer attempts after a wrong answer
    #[arg(long, default_value_t = 0)]
    failure_num: u32,

    /// Label distinguishing repeated runs
    #[arg(long, default_value = "run-1")]
    run_label: String,

    /// OpenAI-compatible base URL
    #[arg(long, env = "PROBE_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// Model name
    #[arg(long, env = "PROBE_MODEL", default_value = "gpt-4o")]
    model: String,

    /// API key
    #[arg(long, env = "PROBE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Participant family recorded with the score
    #[arg(long, default_value = "openai")]
    participant_family: String,

    /// Record the participant as a thinking model
    #[arg(long)]
    thinking: bool,

    /// Physics only: ask for a program instead of coordinates
    #[arg(long)]
    sandbox: bool,

    /// Interpreter used by --sandbox
    #[arg(long, default_value = "python3")]
    python: String,

    /// JSONL file the score record is appended to
    #[arg(long, default_value = "results.jsonl")]
    results: PathBuf,

    /// Also write the full session artifact here
    #[arg(long)]
    artifact: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Summarize { results } => cmd_summarize(&results),
    }
}

fn load_samples<T: DeserializeOwned>(raw: &str, origin: &str) -> Result<SampleSet<T>> {
    SampleSet::from_json(raw).with_context(|| format!("Failed to load samples from {origin}"))
}

fn build_family(args: &RunArgs) -> Result<TaskFamily> {
    let (raw, origin) = match &args.samples {
        Some(path) => (
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read samples {:?}", path))?,
            format!("{:?}", path),
        ),
        None => (
            args.task.default_samples().to_string(),
            "built-in samples".to_string(),
        ),
    };

    let family = match args.task {
        Task::Caesar => TaskFamily::Encryption(EncryptionTask::new(
            Arc::new(CaesarCipher::default()),
            load_samples(&raw, &origin)?,
        )),
        Task::NumberGuessing => TaskFamily::Puzzle(PuzzleTask::new(
            Arc::new(NumberGuessing),
            load_samples(&raw, &origin)?,
        )),
        Task::Rps7 => TaskFamily::Game(GameTask::new(
            Arc::new(Rps7ImitateLast),
            load_samples(&raw, &origin)?,
        )),
        Task::PrefixXor => TaskFamily::Circuit(CircuitTask::new(
            Arc::new(GateCircuit::prefix_xor(8)),
            load_samples(&raw, &origin)?,
        )),
        Task::BubbleSort => TaskFamily::Code(CodeTask::new(
            Arc::new(BubbleSort::new()),
            load_samples(&raw, &origin)?,
        )),
        Task::UniformMotion => {
            let task = PhysicsTask::new(
                Arc::new(UniformMotion::single()),
                load_samples(&raw, &origin)?,
            );
            if args.sandbox {
                let sandbox = ProcessSandbox::new(SandboxConfig {
                    program: args.python.clone(),
                    ..SandboxConfig::default()
                })
                .context("Failed to configure sandbox")?;
                TaskFamily::Physics(task.with_sandbox(Arc::new(sandbox)))
            } else {
                TaskFamily::Physics(task)
            }
        }
    };
    Ok(family)
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let difficulty: Difficulty = args.difficulty.parse()?;
    let family = build_family(&args)?;

    let participant =
        Participant::new(&args.participant_family, &args.model).with_thinking(args.thinking);
    let config = SessionConfig::new(args.task.id(), participant)
        .with_difficulty(difficulty)
        .with_max_turns(args.max_turns)
        .with_failure_num(args.failure_num)
        .with_run_label(&args.run_label)
        .with_prompts(SYSTEM_PROMPT, args.task.intro());

    let client = OpenAiCompatClient::new(ClientConfig {
        base_url: args.base_url.clone(),
        model: args.model.clone(),
        api_key: args.api_key.clone(),
        ..ClientConfig::default()
    })
    .context("Failed to build model client")?;

    let evaluation = Evaluation::new(config, family);
    let abort = evaluation.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current turn");
            abort.abort();
        }
    });

    info!("Running {} against {}", args.task.id(), args.model);
    let sink = JsonlSink::new(&args.results);
    let report = evaluation
        .run_to_sink(Arc::new(client), &sink)
        .await
        .context("Session failed")?;

    if let Some(path) = &args.artifact {
        write_session_artifact(path, &SessionArtifact::from_report(&report))?;
        println!("Artifact: {:?}", path);
    }

    let record = &report.record;
    println!(
        "{} [{}] {}: {}/{} correct (accuracy {:.4}){}",
        record.task_id,
        record.difficulty,
        record.participant_name,
        record.correct_count,
        record.total_count,
        record.accuracy,
        if report.aborted { ", aborted" } else { "" }
    );
    println!("Results appended to {:?}", args.results);
    Ok(())
}

fn cmd_summarize(results: &Path) -> Result<()> {
    let records = read_jsonl(results)
        .with_context(|| format!("Failed to read results {:?}", results))?;
    print!("{}", render_summary_md(&records));
    Ok(())
}
