//! Pipeline orchestration.
//!
//! One `Pipeline` instance owns the whole per-frame chain: cache lookup,
//! preprocessing, inference, decoding, suppression, result assembly,
//! cache write, metrics. `process` never surfaces an error; any stage
//! failure degrades to the heuristic estimator so the caller always gets a
//! number. Batch mode serializes fixed-size sub-batches with a pause
//! between them, and continuous mode runs the pipeline on a cancellable
//! timer thread feeding a caller-supplied sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cache::{CacheKey, ResultCache};
use crate::config::{PipelineSettings, SettingsError, SettingsUpdate};
use crate::detect::{
    decode, suppress, DetectionResult, LoadStrategy, ModelSessionManager, SessionState,
};
use crate::fallback;
use crate::frame::{Frame, FrameSource};
use crate::preprocess;

/// Consecutive failures before health reports degraded.
const FAILURE_HEALTH_THRESHOLD: u32 = 3;

/// Pause between sub-batches to bound peak resource usage.
const BATCH_PAUSE: Duration = Duration::from_millis(50);

/// Default frames per sub-batch.
pub const DEFAULT_SUB_BATCH: usize = 8;

/// Process-wide invocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ProcessingMetrics {
    pub total: u64,
    pub successes: u64,
    pub last_ms: u64,
    /// Running average duration across all invocations.
    pub avg_ms: f64,
}

impl ProcessingMetrics {
    fn record(&mut self, success: bool, elapsed_ms: u64) {
        self.total += 1;
        if success {
            self.successes += 1;
        }
        self.last_ms = elapsed_ms;
        self.avg_ms += (elapsed_ms as f64 - self.avg_ms) / self.total as f64;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
}

/// The detection pipeline. One active `process` call at a time per
/// instance, enforced by `&mut self`.
pub struct Pipeline {
    settings: PipelineSettings,
    sessions: ModelSessionManager,
    cache: ResultCache,
    metrics: ProcessingMetrics,
    consecutive_failures: u32,
}

impl Pipeline {
    /// Build a pipeline and walk the load cascade once. A failed cascade is
    /// not an error here: the pipeline starts in fallback-only operation
    /// and `health()` reports it.
    pub fn new(settings: PipelineSettings, strategies: Vec<Box<dyn LoadStrategy>>) -> Self {
        let mut sessions = ModelSessionManager::new(strategies);
        sessions.initialize();
        let cache = ResultCache::new(settings.cache_capacity);
        Self {
            settings,
            sessions,
            cache,
            metrics: ProcessingMetrics::default(),
            consecutive_failures: 0,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> ProcessingMetrics {
        self.metrics
    }

    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }

    /// Process one frame. Always returns a well-formed result; failures
    /// degrade to the heuristic estimate instead of propagating.
    pub fn process(&mut self, frame: &Frame) -> DetectionResult {
        let started = Instant::now();
        let key = CacheKey::of(frame, self.settings.cache_bucket_ms);

        if let Some(hit) = self.cache.get(&key) {
            let result = hit.clone();
            // The call counts toward invocation totals even when inference
            // is skipped.
            self.metrics.record(true, elapsed_ms(started));
            return result;
        }

        match self.run_chain(frame, started) {
            Ok(result) => {
                self.cache.put(key, result.clone());
                self.metrics.record(true, result.processing_ms);
                self.consecutive_failures = 0;
                result
            }
            Err(e) => self.fall_back(frame, started, &format!("{e:#}")),
        }
    }

    /// preprocess -> infer -> decode -> suppress -> assemble, strictly in
    /// order. Any error here sends the caller to the fallback path.
    fn run_chain(&mut self, frame: &Frame, started: Instant) -> Result<DetectionResult> {
        let tensor =
            preprocess::preprocess(frame, self.settings.input_size).context("preprocess frame")?;
        let raw = self.sessions.infer(&tensor)?;
        let candidates = decode(
            &raw,
            self.settings.confidence_threshold,
            self.settings.input_size,
            self.settings.people_only,
        );
        let detections = suppress(
            candidates,
            self.settings.nms_threshold,
            self.settings.max_detections,
        );
        Ok(DetectionResult::from_detections(
            detections,
            elapsed_ms(started),
            &self.sessions.model_id(),
        ))
    }

    fn fall_back(&mut self, frame: &Frame, started: Instant, reason: &str) -> DetectionResult {
        log::warn!("pipeline degraded for this frame: {reason}");
        self.consecutive_failures += 1;
        let count = fallback::estimate_count(frame);
        let result = DetectionResult::degraded_estimate(
            count,
            fallback::FALLBACK_CONFIDENCE,
            elapsed_ms(started),
            reason,
        );
        self.metrics.record(false, result.processing_ms);
        result
    }

    /// Process a sequence of frames in fixed-size sub-batches with a short
    /// pause between them. A failing sub-batch substitutes fallback results
    /// for every frame in that sub-batch; the rest of the batch continues.
    pub fn process_batch(&mut self, frames: &[Frame], sub_batch: usize) -> Vec<DetectionResult> {
        let sub = sub_batch.max(1);
        let mut results = Vec::with_capacity(frames.len());

        for (index, chunk) in frames.chunks(sub).enumerate() {
            if index > 0 {
                std::thread::sleep(BATCH_PAUSE);
            }
            match self.try_sub_batch(chunk) {
                Ok(mut chunk_results) => results.append(&mut chunk_results),
                Err(e) => {
                    let reason = format!("sub-batch {index} failed: {e:#}");
                    for frame in chunk {
                        results.push(self.fall_back(frame, Instant::now(), &reason));
                    }
                }
            }
        }

        results
    }

    /// Strict variant of the per-frame chain: the first error rejects the
    /// whole sub-batch. Successful per-frame results are cached right away
    /// (they are valid), but their metrics are recorded only when the whole
    /// sub-batch lands.
    fn try_sub_batch(&mut self, frames: &[Frame]) -> Result<Vec<DetectionResult>> {
        let mut pending = Vec::with_capacity(frames.len());

        for frame in frames {
            let started = Instant::now();
            let key = CacheKey::of(frame, self.settings.cache_bucket_ms);
            if let Some(hit) = self.cache.get(&key) {
                pending.push((hit.clone(), elapsed_ms(started)));
                continue;
            }
            let result = self.run_chain(frame, started)?;
            self.cache.put(key, result.clone());
            pending.push((result.clone(), result.processing_ms));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (result, ms) in pending {
            self.metrics.record(true, ms);
            results.push(result);
        }
        self.consecutive_failures = 0;
        Ok(results)
    }

    /// Apply a settings update all-or-nothing. The cache is rebuilt when
    /// its capacity changes.
    pub fn update_settings(&mut self, update: &SettingsUpdate) -> Result<(), SettingsError> {
        let old_capacity = self.settings.cache_capacity;
        self.settings.apply_update(update)?;
        if self.settings.cache_capacity != old_capacity {
            self.cache = ResultCache::new(self.settings.cache_capacity);
        }
        Ok(())
    }

    pub fn health(&self) -> HealthStatus {
        if self.sessions.state() == SessionState::Failed {
            return HealthStatus::Degraded(
                "no model session; running on heuristic fallback".to_string(),
            );
        }
        let failures = self
            .consecutive_failures
            .max(self.sessions.consecutive_failures());
        if failures >= FAILURE_HEALTH_THRESHOLD {
            return HealthStatus::Degraded(format!("{failures} consecutive failures"));
        }
        HealthStatus::Healthy
    }

    /// Explicit operator recovery: clear the cache, reset counters and
    /// metrics, walk the load cascade again.
    pub fn recover(&mut self) {
        log::info!("explicit recovery requested");
        self.cache.clear();
        self.consecutive_failures = 0;
        self.metrics = ProcessingMetrics::default();
        self.sessions.initialize();
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ----------------------------------------------------------------------------
// Continuous mode
// ----------------------------------------------------------------------------

/// Stop/join handle for a continuous monitor.
///
/// `stop` is idempotent and does not interrupt an in-flight tick; the
/// worker observes the flag before its next tick.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Pipeline>>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stop and wait for the worker, returning the pipeline for inspection.
    pub fn join(mut self) -> Option<Pipeline> {
        self.stop();
        self.thread.take().and_then(|t| t.join().ok())
    }
}

/// Run the pipeline on a repeating timer over a frame source.
///
/// Each tick grabs the next available frame, processes it, and hands the
/// result to `sink`. Capture failures are logged and skipped; the timer
/// keeps ticking until the handle is stopped.
pub fn spawn_monitor<S, F>(
    mut pipeline: Pipeline,
    mut source: S,
    interval: Duration,
    mut sink: F,
) -> MonitorHandle
where
    S: FrameSource + 'static,
    F: FnMut(DetectionResult) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let thread = std::thread::spawn(move || {
        log::info!("monitor started, interval {:?}", interval);
        while !stop_flag.load(Ordering::SeqCst) {
            let tick_started = Instant::now();
            match source.next_frame() {
                Ok(frame) => sink(pipeline.process(&frame)),
                Err(e) => log::warn!("monitor: frame capture failed: {e:#}"),
            }
            if let Some(remaining) = interval.checked_sub(tick_started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
        log::info!("monitor stopped");
        pipeline
    });

    MonitorHandle {
        stop,
        thread: Some(thread),
    }
}
