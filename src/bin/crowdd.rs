//! crowdd - crowd monitoring daemon
//!
//! This daemon:
//! 1. Loads configuration from `CROWD_CONFIG` / `CROWD_*` env overrides
//! 2. Builds the detection pipeline and walks the model load cascade
//! 3. Runs continuous monitoring over the configured frame source
//! 4. Logs per-tick results and a periodic health/metrics summary
//! 5. Shuts down cleanly on ctrl-c

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crowd_sentry::{
    spawn_monitor, CrowddConfig, DensityLevel, HealthStatus, LoadStrategy, Pipeline,
    SyntheticConfig, SyntheticSource,
};

/// Seconds between health/metrics summary log lines.
const SUMMARY_PERIOD: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = CrowddConfig::load()?;
    log::info!(
        "crowdd starting: source={}, interval={}ms, people_only={}",
        cfg.source_url,
        cfg.interval_ms,
        cfg.settings.people_only
    );

    let pipeline = Pipeline::new(cfg.settings.clone(), build_strategies(&cfg));
    match pipeline.health() {
        HealthStatus::Healthy => {
            log::info!("model session ready, state {:?}", pipeline.session_state())
        }
        HealthStatus::Degraded(reason) => {
            log::warn!("starting degraded: {reason}")
        }
    }

    // Capture is an external collaborator; only the synthetic stub source
    // ships with the daemon.
    if !cfg.source_url.starts_with("stub://") {
        return Err(anyhow!(
            "unsupported source url {} (only stub:// sources are built in)",
            cfg.source_url
        ));
    }
    let source = SyntheticSource::new(SyntheticConfig {
        url: cfg.source_url.clone(),
        width: cfg.source_width,
        height: cfg.source_height,
        ..SyntheticConfig::default()
    })?;

    let running = Arc::new(AtomicBool::new(true));
    let running_flag = running.clone();
    ctrlc::set_handler(move || {
        running_flag.store(false, Ordering::SeqCst);
    })?;

    let mut tick_count = 0u64;
    let mut degraded_count = 0u64;
    let mut last_summary = Instant::now();
    let handle = spawn_monitor(
        pipeline,
        source,
        Duration::from_millis(cfg.interval_ms),
        move |result| {
            tick_count += 1;
            if result.degraded {
                degraded_count += 1;
            }
            log::debug!(
                "tick #{}: count={} density={:?} degraded={} ({}ms)",
                tick_count,
                result.count,
                result.density,
                result.degraded,
                result.processing_ms
            );
            if result.density == DensityLevel::Critical {
                log::warn!("critical density: {} people in scene", result.count);
            }
            if last_summary.elapsed() >= SUMMARY_PERIOD {
                last_summary = Instant::now();
                log::info!(
                    "summary: {} ticks, {} degraded, last count={} ({:?})",
                    tick_count,
                    degraded_count,
                    result.count,
                    result.density
                );
            }
        },
    );

    log::info!("crowdd running; ctrl-c to stop");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutting down");
    handle.stop();
    if let Some(pipeline) = handle.join() {
        let metrics = pipeline.metrics();
        log::info!(
            "processed {} frames ({} ok), avg {:.1}ms",
            metrics.total,
            metrics.successes,
            metrics.avg_ms
        );
    }
    Ok(())
}

fn build_strategies(cfg: &CrowddConfig) -> Vec<Box<dyn LoadStrategy>> {
    let mut strategies: Vec<Box<dyn LoadStrategy>> = Vec::new();

    #[cfg(feature = "backend-tract")]
    if let Some(path) = &cfg.model_path {
        strategies.push(Box::new(crowd_sentry::TractStrategy::new(
            path.clone(),
            cfg.settings.input_size,
        )));
    }

    #[cfg(not(feature = "backend-tract"))]
    if cfg.model_path.is_some() {
        log::warn!("model_path configured but crowdd was built without backend-tract");
    }

    if strategies.is_empty() {
        log::warn!("no load strategies available; running on heuristic fallback only");
    }
    strategies
}
