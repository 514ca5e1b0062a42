use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use livecheck_core::{FrameSample, LivenessEvaluator};
use livecheck_engine::{
    submit_blocking, Config, HttpSubmitter, Orchestrator, RunError, VerificationOutcome,
};
use tracing_subscriber::EnvFilter;

mod trace;

use trace::{ReplayExtractor, ReplaySource, Trace};

#[derive(Parser)]
#[command(name = "livecheck", version, about = "Blink and head-turn liveness check")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded landmark trace through the full step sequence
    Run {
        /// JSON-lines landmark trace, one record per poll tick
        #[arg(long)]
        trace: PathBuf,
        /// Still image used as the content of every replayed frame
        #[arg(long)]
        image: Option<PathBuf>,
        /// Endpoint to POST the outcome to (overrides LIVECHECK_SUBMIT_URL)
        #[arg(long)]
        submit: Option<String>,
        /// Write the submission payload as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fold every trace frame through the evaluator and print the running state
    Inspect {
        #[arg(long)]
        trace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            trace,
            image,
            submit,
            output,
        } => run(&trace, image.as_deref(), submit, output.as_deref()).await,
        Command::Inspect { trace } => inspect(&trace),
    }
}

async fn run(
    trace_path: &Path,
    image_path: Option<&Path>,
    submit_url: Option<String>,
    output: Option<&Path>,
) -> Result<()> {
    let config = Config::from_env();
    let trace = Trace::load(trace_path)?;
    let still = image_path
        .map(|p| {
            image::open(p)
                .map(|img| img.to_rgb8())
                .with_context(|| format!("failed to load image {}", p.display()))
        })
        .transpose()?;

    tracing::info!(
        trace = %trace_path.display(),
        frames = trace.len(),
        extractor = ?trace.extractor_kind(),
        "starting liveness run"
    );

    let mut orchestrator = Orchestrator::new(
        ReplaySource::new(trace.clone(), still),
        ReplayExtractor::new(trace),
        config.liveness.clone(),
        config.run.clone(),
    );

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut phases = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = phases.borrow_and_update().clone();
            println!("[{phase}] {}", phase.instruction());
        }
    });

    let result = orchestrator.run().await;
    drop(orchestrator);
    let _ = printer.await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(RunError::Failed(reason)) => bail!("liveness check failed: {reason}"),
        Err(e) => return Err(e.into()),
    };
    print_outcome(&outcome);

    let payload = outcome.submission_payload();
    if let Some(path) = output {
        let json = serde_json::to_vec_pretty(&payload)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("payload written to {}", path.display());
    }

    if let Some(url) = submit_url.or(config.submit_url) {
        let submitter = Arc::new(HttpSubmitter::new(url, config.submit_timeout));
        submit_blocking(Arc::clone(&submitter), payload)
            .await
            .with_context(|| format!("failed to submit outcome to {}", submitter.url()))?;
        println!("outcome submitted to {}", submitter.url());
    }

    Ok(())
}

fn print_outcome(outcome: &VerificationOutcome) {
    let s = &outcome.liveness;
    println!("run:            {}", outcome.run_id);
    println!("blinks:         {}", s.blink_count);
    println!("blink detected: {}", s.blink_detected);
    println!("head movement:  {}", s.head_movement);
    println!(
        "image:          {}x{} JPEG, {} bytes",
        outcome.image.width,
        outcome.image.height,
        outcome.image.jpeg.len()
    );
    println!("completed at:   {}", outcome.completed_at.to_rfc3339());
}

fn inspect(trace_path: &Path) -> Result<()> {
    let config = Config::from_env();
    let trace = Trace::load(trace_path)?;
    if trace.is_empty() {
        bail!("trace {} has no frames", trace_path.display());
    }

    let mut evaluator = LivenessEvaluator::new(config.liveness);
    println!(
        "{:>5}  {:>4}  {:>6}  {:>7}  {:>7}  {:>6}  {:>5}  {:>4}",
        "frame", "face", "ear", "yaw", "pitch", "blinks", "blink", "turn"
    );

    for (i, record) in trace.records().iter().enumerate() {
        let face = match record.resolve() {
            Ok(face) => face,
            Err(e) => {
                println!("{i:>5}  detection error: {e}");
                None
            }
        };
        let ear = face.as_ref().and_then(|f| f.eye_aspect_ratio());
        let pose = face.as_ref().map(|f| f.head_pose());
        let state = evaluator.process(&FrameSample::new(Utc::now(), face));

        println!(
            "{:>5}  {:>4}  {:>6}  {:>7}  {:>7}  {:>6}  {:>5}  {:>4}",
            i,
            if state.face_present { "yes" } else { "no" },
            ear.map(|e| format!("{e:.3}")).unwrap_or_else(|| "-".into()),
            pose.map(|p| format!("{:.1}", p.yaw)).unwrap_or_else(|| "-".into()),
            pose.map(|p| format!("{:.1}", p.pitch)).unwrap_or_else(|| "-".into()),
            state.blink_count,
            state.blink_detected,
            state.head_movement,
        );
    }

    let state = evaluator.state();
    println!();
    println!(
        "frames: {}  blinks: {}  blink detected: {}  head movement: {}  live: {}",
        state.frames_seen,
        state.blink_count,
        state.blink_detected,
        state.head_movement,
        state.is_live()
    );
    Ok(())
}
