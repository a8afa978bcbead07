//! demo - end-to-end synthetic run for Crowd Sentry
//!
//! Generates a few seconds of synthetic crowd footage, runs it through the
//! full pipeline (stub model session by default, heuristic fallback with
//! `--no-model`), and writes a JSON summary.

use std::fs;
use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use crowd_sentry::detect::backends::StubBackend;
use crowd_sentry::ui::Ui;
use crowd_sentry::{
    BackendStrategy, DetectionResult, Frame, FrameSource, HealthStatus, LoadStrategy, Pipeline,
    PipelineSettings, ProcessingMetrics, RawOutput, SyntheticConfig, SyntheticSource,
    DEFAULT_SUB_BATCH, PERSON_CLASS,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds of synthetic footage.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Frames per second of synthetic footage.
    #[arg(long, default_value_t = 4)]
    fps: u32,
    /// Synthetic scene edge length (square frames).
    #[arg(long, default_value_t = 640)]
    size: u32,
    /// People rendered into each synthetic frame.
    #[arg(long, default_value_t = 12)]
    people: usize,
    /// Skip the model session entirely to exercise the fallback estimator.
    #[arg(long)]
    no_model: bool,
    /// Output path for the JSON summary.
    #[arg(long, default_value = "demo_out/summary.json")]
    out: String,
    /// UI mode: auto, plain, pretty.
    #[arg(long)]
    ui: Option<String>,
}

#[derive(Serialize)]
struct Summary {
    frames: usize,
    metrics: ProcessingMetrics,
    degraded_frames: usize,
    mean_count: f64,
    last_result: Option<DetectionResult>,
    health: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::from_flag(args.ui.as_deref(), std::io::stderr().is_terminal());

    let frames = {
        let _stage = ui.stage("generate synthetic footage");
        generate_frames(&args)?
    };

    let settings = PipelineSettings {
        input_size: args.size.clamp(64, 1_920),
        ..PipelineSettings::default()
    };
    let strategies = if args.no_model {
        Vec::new()
    } else {
        demo_strategies(settings.input_size)
    };
    let mut pipeline = Pipeline::new(settings, strategies);

    let results = {
        let _stage = ui.stage("run detection pipeline");
        let bar = ui.frame_bar(frames.len() as u64);
        let mut results = Vec::with_capacity(frames.len());
        for chunk in frames.chunks(DEFAULT_SUB_BATCH) {
            let chunk_results = pipeline.process_batch(chunk, DEFAULT_SUB_BATCH);
            bar.inc(chunk_results.len() as u64);
            results.extend(chunk_results);
        }
        bar.finish_and_clear();
        results
    };

    let summary = summarize(&pipeline, &results);
    write_summary(&summary, Path::new(&args.out))?;

    println!(
        "{} frames processed, mean count {:.1}, {} degraded, health: {}",
        summary.frames, summary.mean_count, summary.degraded_frames, summary.health
    );
    println!("summary written to {}", args.out);
    Ok(())
}

fn generate_frames(args: &Args) -> Result<Vec<Frame>> {
    let mut source = SyntheticSource::new(SyntheticConfig {
        url: "stub://demo".to_string(),
        width: args.size,
        height: args.size,
        people: args.people,
    })?;
    let total = (args.seconds * args.fps as u64).max(1) as usize;
    (0..total).map(|_| source.next_frame()).collect()
}

/// Stub strategy replaying a canned tensor with a handful of well-spread
/// person candidates, so the full decode/suppress path has something to do.
fn demo_strategies(input_size: u32) -> Vec<Box<dyn LoadStrategy>> {
    let backend = StubBackend::with_output(input_size, canned_people(input_size, 5));
    vec![Box::new(BackendStrategy::once("demo-stub", backend))]
}

fn canned_people(input_size: u32, people: usize) -> RawOutput {
    let fields = 85;
    let size = input_size as f32;
    let mut data = Vec::with_capacity(people * fields);
    for i in 0..people {
        let t = (i as f32 + 1.0) / (people as f32 + 1.0);
        // cx, cy, w, h in input pixels, then objectness and class scores.
        data.extend_from_slice(&[size * t, size * (1.0 - t), size * 0.06, size * 0.15, 0.95]);
        let mut scores = vec![0.0f32; 80];
        scores[PERSON_CLASS] = 0.9;
        data.extend_from_slice(&scores);
    }
    RawOutput::new(data, vec![1, people, fields])
}

fn summarize(pipeline: &Pipeline, results: &[DetectionResult]) -> Summary {
    let degraded_frames = results.iter().filter(|r| r.degraded).count();
    let mean_count = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.count as f64).sum::<f64>() / results.len() as f64
    };
    Summary {
        frames: results.len(),
        metrics: pipeline.metrics(),
        degraded_frames,
        mean_count,
        last_result: results.last().cloned(),
        health: match pipeline.health() {
            HealthStatus::Healthy => "healthy".to_string(),
            HealthStatus::Degraded(reason) => format!("degraded: {reason}"),
        },
    }
}

fn write_summary(summary: &Summary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(path, json).with_context(|| format!("write summary to {}", path.display()))?;
    Ok(())
}
