mod acquisition;
mod cleaning;
mod config;
mod embedding;
mod errors;
mod models;
mod paths;
mod pipeline;
mod ranking;
mod retry;
mod storage;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::acquisition::{AcquireStage, ListingSource, RapidApiSource};
use crate::cleaning::CleanStage;
use crate::config::Config;
use crate::embedding::{EmbedStage, EmbeddingClient, OpenAiTransport};
use crate::paths::ArtifactPaths;
use crate::pipeline::{
    CheckpointStore, FileCheckpointStore, Orchestrator, PipelineOptions, Stage, StageKind,
};
use crate::ranking::stage::DEFAULT_TOP_N;
use crate::ranking::RankStage;

#[derive(Parser, Debug)]
#[command(
    name = "jobmatch",
    version,
    about = "Rank job postings by semantic similarity to a resume"
)]
struct Cli {
    /// Directory holding every pipeline artifact and the checkpoint records
    #[arg(long, global = true, env = "JOBMATCH_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run acquire → clean → embed → rank, resuming from checkpoints
    Run(RunArgs),
    /// Rank existing embeddings only and print the top matches
    Rank(RankArgs),
    /// Show each stage's checkpoint record and whether it counts as complete
    Status,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Resume file (.pdf or .txt); defaults to resume.pdf in the work directory
    #[arg(long, env = "JOBMATCH_RESUME")]
    resume: Option<PathBuf>,

    /// Skip a stage (repeatable)
    #[arg(long, value_enum)]
    skip: Vec<StageKind>,

    /// Run a stage even if its outputs are complete (repeatable)
    #[arg(long, value_enum)]
    force: Vec<StageKind>,

    /// Run every stage regardless of existing outputs
    #[arg(long, default_value_t = false)]
    no_skip_existing: bool,

    /// Keep going after a stage fails
    #[arg(long, default_value_t = false)]
    continue_on_error: bool,

    /// Number of ranked jobs to keep
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    top: usize,

    /// Per-stage time limit in seconds
    #[arg(long)]
    stage_timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct RankArgs {
    /// Number of ranked jobs to keep
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    top: usize,

    /// Job embeddings JSONL (defaults to the work directory's)
    #[arg(long)]
    jobs: Option<PathBuf>,

    /// Resume embedding JSON (defaults to the work directory's)
    #[arg(long)]
    resume: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting jobmatch v{}", env!("CARGO_PKG_VERSION"));

    let paths = ArtifactPaths::new(&cli.work_dir);
    let outcome = match cli.command {
        Command::Run(args) => run_pipeline(&config, &paths, args).await,
        Command::Rank(args) => rank_only(&paths, args).await,
        Command::Status => show_status(&config, &paths),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn listing_source(config: &Config) -> Result<Option<Arc<dyn ListingSource>>> {
    let Some(key) = config.rapidapi_key.as_deref() else {
        return Ok(None);
    };
    let source = RapidApiSource::new(key, &config.acquire).context("Failed to build listing HTTP client")?;
    Ok(Some(Arc::new(source)))
}

fn embedding_client(config: &Config) -> Result<Option<EmbeddingClient>> {
    let Some(key) = config.openai_api_key.as_deref() else {
        return Ok(None);
    };
    let embedding = &config.embedding;
    let transport = OpenAiTransport::new(
        key,
        &embedding.base_url,
        embedding.dimensions,
        embedding.request_timeout,
    )
    .context("Failed to build embedding HTTP client")?;
    info!("Embedding client initialized (model: {})", embedding.model);
    Ok(Some(EmbeddingClient::new(Arc::new(transport), embedding)))
}

/// The four stages in pipeline order. Stages without credentials fail their precondition when run.
fn build_stages(
    config: &Config,
    paths: &ArtifactPaths,
    resume: PathBuf,
    top: usize,
    source: Option<Arc<dyn ListingSource>>,
    client: Option<EmbeddingClient>,
) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(AcquireStage::new(paths.clone(), config.acquire.clone(), source)) as Box<dyn Stage>,
        Box::new(CleanStage::new(paths.clone(), resume, config.cleaning.clone())),
        Box::new(EmbedStage::new(paths.clone(), client)),
        Box::new(RankStage::new(paths, top)),
    ]
}

async fn run_pipeline(config: &Config, paths: &ArtifactPaths, args: RunArgs) -> Result<u8> {
    let resume = args
        .resume
        .unwrap_or_else(|| paths.work_dir.join("resume.pdf"));
    if resume.is_file() {
        info!("Found resume: {}", resume.display());
    } else {
        info!("Resume not found at {}", resume.display());
    }

    let stages = build_stages(
        config,
        paths,
        resume,
        args.top,
        listing_source(config)?,
        embedding_client(config)?,
    );
    let options = PipelineOptions {
        skip: args.skip.into_iter().collect(),
        force: args.force.into_iter().collect(),
        skip_if_complete: !args.no_skip_existing,
        continue_on_error: args.continue_on_error,
        stage_timeout: args.stage_timeout_secs.map(Duration::from_secs),
        ..PipelineOptions::default()
    };
    let checkpoints = Arc::new(FileCheckpointStore::new(&paths.checkpoint_dir));

    let report = Orchestrator::new(stages, checkpoints, options).run().await;
    println!("\n{}", report.render_summary());
    Ok(report.exit_code())
}

async fn rank_only(paths: &ArtifactPaths, args: RankArgs) -> Result<u8> {
    let stage = RankStage::new(paths, args.top).with_inputs(args.jobs, args.resume);
    let result = match stage.check_preconditions() {
        Ok(()) => stage.run().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(report) => {
            info!("Ranking finished: {} results", report.records_written);
            Ok(0)
        }
        Err(e) => {
            error!("Ranking failed: {e}");
            Ok(e.failure_kind().exit_code())
        }
    }
}

fn show_status(config: &Config, paths: &ArtifactPaths) -> Result<u8> {
    let store = FileCheckpointStore::new(&paths.checkpoint_dir);
    let stages = build_stages(
        config,
        paths,
        paths.work_dir.join("resume.pdf"),
        DEFAULT_TOP_N,
        None,
        None,
    );

    println!("Work directory: {}", paths.work_dir.display());
    for stage in &stages {
        let kind = stage.kind();
        let complete = store.is_complete(kind, &stage.outputs())?;
        let record = match store.load(kind)? {
            Some(c) => format!(
                "{:?} at {} (run {}){}",
                c.status,
                c.timestamp.to_rfc3339(),
                c.run_id,
                c.detail.map(|d| format!(": {d}")).unwrap_or_default()
            ),
            None => "no record".to_string(),
        };
        println!(
            "  {:<8} {:<11} {}",
            kind,
            if complete { "complete" } else { "incomplete" },
            record
        );
    }
    Ok(0)
}
