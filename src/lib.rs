//! Crowd Sentry Core
//!
//! Detection pipeline for crowd-safety monitoring: ingest frames, count
//! people, profile where they are in the scene.
//!
//! # Architecture
//!
//! The pipeline is a fixed chain with a degraded-but-never-silent failure
//! posture:
//!
//! 1. **Preprocess**: frame -> canonical NCHW tensor (`preprocess`)
//! 2. **Infer**: session manager runs the loaded backend (`detect::session`)
//! 3. **Decode**: raw tensor -> detection candidates (`detect::decoder`)
//! 4. **Suppress**: greedy NMS + people-only cap (`detect::suppress`)
//! 5. **Cache**: time-bucketed memoization of results (`cache`)
//! 6. **Fallback**: heuristic estimate when any stage fails (`fallback`)
//!
//! `pipeline::Pipeline` wires the chain and owns all mutable state; there
//! are no ambient globals. `process` always returns a result - degradation
//! is a flag on the result, never an error to the caller.
//!
//! # Module Structure
//!
//! - `geometry`: box representation, IoU
//! - `detect`: backend contract, decoding, suppression, session cascade
//! - `cache`: fingerprint + time-bucket FIFO cache
//! - `fallback`: last-resort pixel-heuristic estimator
//! - `frame`: RGBA frame container, frame sources
//! - `preprocess`: canonical tensor construction
//! - `spatial`: centroid/spread/cluster summaries
//! - `pipeline`: orchestration, batch and continuous modes, metrics
//! - `config`: settings validation/clamping, daemon configuration

pub mod cache;
pub mod config;
pub mod detect;
pub mod fallback;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod preprocess;
pub mod spatial;
pub mod ui;

pub use cache::{CacheKey, FrameFingerprint, ResultCache, TimeBucket};
pub use config::{CrowddConfig, PipelineSettings, SettingsError, SettingsUpdate};
pub use detect::{
    decode, suppress, BackendKind, BackendStrategy, Detection, DetectionResult, DensityLevel,
    InferenceBackend, IoSpec, LoadError, LoadStrategy, ModelSession, ModelSessionManager,
    RawOutput, SessionState, PERSON_CLASS,
};
pub use fallback::{FALLBACK_CONFIDENCE, MAX_ESTIMATE};
pub use frame::{Frame, FrameSource, SourceStats, SyntheticConfig, SyntheticSource};
pub use geometry::BoundingBox;
pub use pipeline::{
    spawn_monitor, HealthStatus, MonitorHandle, Pipeline, ProcessingMetrics, DEFAULT_SUB_BATCH,
};
pub use preprocess::{preprocess, InputTensor};
pub use spatial::SpatialSummary;

#[cfg(feature = "backend-tract")]
pub use detect::TractStrategy;
