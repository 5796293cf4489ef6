//! Cadence CLI: runs pipeline stages against the configured database, bucket
//! and encoder.
//!
//! Configuration comes from the environment (or a `.env` file); see
//! `cadence_core::Config`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cadence_cli::{build_context, read_event};
use cadence_core::{Config, ErrorMetadata};
use cadence_db::LibraryRepository;
use cadence_infra::{init_telemetry, LogFormat};
use cadence_processing::{
    Mover, MoveInput, Orchestrator, PipelineError, RegisterInput, ReprocessCoordinator,
    StatusInput, TrackRegistrar, TranscodeInitiator, TranscodeInput,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "cadence", about = "Audio upload pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StageCommand {
    Register,
    Move,
    Transcode,
    Status,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single stage on an event and print its output
    Stage {
        #[arg(value_enum)]
        stage: StageCommand,
        /// Event JSON file; stdin when omitted
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Record a new upload from a registration event and run the pipeline
    Submit {
        /// Event JSON file; stdin when omitted
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Run the remaining stages of an upload
    Process {
        #[arg(long)]
        user: String,
        #[arg(long)]
        upload: String,
    },
    /// Resume a failed upload at a stage
    Reprocess {
        #[arg(long)]
        user: String,
        #[arg(long)]
        upload: String,
        /// register, move or transcode
        #[arg(long)]
        from: String,
    },
    /// List a user's tracks by an artist
    Tracks {
        #[arg(long)]
        user: String,
        #[arg(long)]
        artist: String,
    },
    /// List a user's albums by an artist
    Albums {
        #[arg(long)]
        user: String,
        #[arg(long)]
        artist: String,
    },
    /// Apply database migrations
    Migrate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorOutput {
    error: String,
    error_code: &'static str,
    recoverable: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a pipeline error as JSON on stderr, then propagate it
fn report(err: PipelineError) -> anyhow::Error {
    let output = ErrorOutput {
        error: err.to_string(),
        error_code: err.error_code(),
        recoverable: err.is_recoverable(),
    };
    if let Ok(json) = serde_json::to_string(&output) {
        eprintln!("{}", json);
    }
    anyhow::Error::new(err)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    let format = config
        .log_format
        .parse::<LogFormat>()
        .map_err(|e| anyhow::anyhow!(e))?;
    init_telemetry(format).map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    if let Commands::Migrate = cli.command {
        let pool = cadence_db::connect(&config).await?;
        cadence_db::run_migrations(&pool).await?;
        return Ok(());
    }

    let ctx = build_context(&config).await?;

    match cli.command {
        Commands::Stage { stage, event } => {
            let path = event.as_deref();
            match stage {
                StageCommand::Register => {
                    let input: RegisterInput = read_event(path)?;
                    let out = TrackRegistrar::new(ctx).run(&input).await.map_err(report)?;
                    print_json(&out)?;
                }
                StageCommand::Move => {
                    let input: MoveInput = read_event(path)?;
                    let out = Mover::new(ctx).run(&input).await.map_err(report)?;
                    print_json(&out)?;
                }
                StageCommand::Transcode => {
                    let input: TranscodeInput = read_event(path)?;
                    let out = TranscodeInitiator::new(ctx)
                        .run(&input)
                        .await
                        .map_err(report)?;
                    print_json(&out)?;
                }
                StageCommand::Status => {
                    let input: StatusInput = read_event(path)?;
                    let out = Orchestrator::new(ctx)
                        .record_status(&input)
                        .await
                        .map_err(report)?;
                    print_json(&out)?;
                }
            }
        }
        Commands::Submit { event } => {
            let input: RegisterInput = read_event(event.as_deref())?;
            let orchestrator = Orchestrator::new(ctx);
            let upload = orchestrator.accept(&input).await.map_err(report)?;
            let outcome = orchestrator
                .process(&upload.user_id, &upload.id)
                .await
                .map_err(report)?;
            print_json(&outcome)?;
        }
        Commands::Process { user, upload } => {
            let outcome = Orchestrator::new(ctx)
                .process(&user, &upload)
                .await
                .map_err(report)?;
            print_json(&outcome)?;
        }
        Commands::Reprocess { user, upload, from } => {
            let coordinator = ReprocessCoordinator::new(Orchestrator::new(ctx));
            let outcome = coordinator
                .reprocess(&user, &upload, &from)
                .await
                .map_err(report)?;
            print_json(&outcome)?;
        }
        Commands::Tracks { user, artist } => {
            let tracks = ctx
                .repo
                .list_tracks_by_artist(&user, &artist)
                .await
                .context("Failed to list tracks")?;
            print_json(&tracks)?;
        }
        Commands::Albums { user, artist } => {
            let albums = ctx
                .repo
                .list_albums_by_artist(&user, &artist)
                .await
                .context("Failed to list albums")?;
            print_json(&albums)?;
        }
        // Handled before any client is built
        Commands::Migrate => {}
    }

    Ok(())
}
