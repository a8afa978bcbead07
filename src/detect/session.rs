//! Model session management.
//!
//! Loading a model is a cascade: an ordered list of strategies, each of
//! which may internally retry across execution variants before giving up.
//! A strategy's "success" only counts after the session passes validation
//! and a warm-up inference; anything less and the cascade continues. When
//! every strategy is exhausted the manager parks in `Failed` and reports
//! that through its state, never through fabricated detections - deciding
//! what to do next (the heuristic fallback) is the orchestrator's call.

use std::fmt;

use anyhow::{anyhow, Context, Result};

use crate::detect::backend::{BackendKind, InferenceBackend, IoSpec, RawOutput};
use crate::preprocess::InputTensor;

/// Attempts per execution variant before moving to the next one.
const ATTEMPTS_PER_VARIANT: u32 = 2;

/// Session manager lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

// ----------------------------------------------------------------------------
// Load errors
// ----------------------------------------------------------------------------

/// Why a load strategy (or variant) failed.
#[derive(Debug)]
pub enum LoadError {
    /// Known execution-variant incompatibility. Retrying the same variant
    /// is pointless; the cascade moves to the next variant immediately.
    Incompatible(String),
    /// Backend or model file unavailable (missing file, feature off).
    Unavailable(String),
    /// The loader reported success but the session failed validation.
    Validation(String),
}

impl LoadError {
    pub fn message(&self) -> &str {
        match self {
            LoadError::Incompatible(m) | LoadError::Unavailable(m) | LoadError::Validation(m) => m,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Incompatible(m) => write!(f, "incompatible execution variant: {m}"),
            LoadError::Unavailable(m) => write!(f, "backend unavailable: {m}"),
            LoadError::Validation(m) => write!(f, "session validation failed: {m}"),
        }
    }
}

impl std::error::Error for LoadError {}

// ----------------------------------------------------------------------------
// Strategies
// ----------------------------------------------------------------------------

/// One way of obtaining a model session.
///
/// Strategies are tried in a fixed priority order by the manager. Internal
/// retries across execution variants belong inside `attempt`; see
/// [`attempt_variants`].
pub trait LoadStrategy: Send {
    fn name(&self) -> &'static str;

    fn attempt(&mut self) -> Result<ModelSession, LoadError>;
}

/// Walk execution variants for one strategy.
///
/// Each variant gets up to [`ATTEMPTS_PER_VARIANT`] tries. A
/// `LoadError::Incompatible` skips the remaining tries of that variant and
/// falls through to the next one right away. The last error wins when all
/// variants are exhausted.
pub fn attempt_variants<F>(
    strategy: &str,
    variants: &[&'static str],
    mut build: F,
) -> Result<ModelSession, LoadError>
where
    F: FnMut(&'static str) -> Result<ModelSession, LoadError>,
{
    let mut last_error = LoadError::Unavailable(format!("{strategy}: no variants"));

    for &variant in variants {
        for attempt in 1..=ATTEMPTS_PER_VARIANT {
            match build(variant) {
                Ok(session) => {
                    log::debug!("{strategy}: variant {variant} succeeded on attempt {attempt}");
                    return Ok(session);
                }
                Err(e @ LoadError::Incompatible(_)) => {
                    log::debug!("{strategy}: variant {variant} incompatible: {e}");
                    last_error = e;
                    break;
                }
                Err(e) => {
                    log::debug!("{strategy}: variant {variant} attempt {attempt} failed: {e}");
                    last_error = e;
                }
            }
        }
    }

    Err(last_error)
}

/// Strategy wrapping a prebuilt backend or a backend factory.
///
/// This is how tests and the demo inject stub backends into the cascade.
pub struct BackendStrategy {
    name: &'static str,
    factory: Box<dyn FnMut() -> Result<Box<dyn InferenceBackend>, LoadError> + Send>,
}

impl BackendStrategy {
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn InferenceBackend>, LoadError> + Send + 'static,
    {
        Self {
            name,
            factory: Box::new(factory),
        }
    }

    /// Strategy that hands out the given backend exactly once.
    pub fn once<B: InferenceBackend + 'static>(name: &'static str, backend: B) -> Self {
        let mut slot = Some(Box::new(backend) as Box<dyn InferenceBackend>);
        Self::new(name, move || {
            slot.take()
                .ok_or_else(|| LoadError::Unavailable("backend already consumed".to_string()))
        })
    }
}

impl LoadStrategy for BackendStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn attempt(&mut self) -> Result<ModelSession, LoadError> {
        (self.factory)().map(ModelSession::new)
    }
}

/// Tract ONNX strategy: optimized plan first, plain plan as the permissive
/// fallback variant.
#[cfg(feature = "backend-tract")]
pub struct TractStrategy {
    model_path: std::path::PathBuf,
    input_size: u32,
}

#[cfg(feature = "backend-tract")]
impl TractStrategy {
    pub fn new<P: Into<std::path::PathBuf>>(model_path: P, input_size: u32) -> Self {
        Self {
            model_path: model_path.into(),
            input_size,
        }
    }
}

#[cfg(feature = "backend-tract")]
impl LoadStrategy for TractStrategy {
    fn name(&self) -> &'static str {
        "tract-onnx"
    }

    fn attempt(&mut self) -> Result<ModelSession, LoadError> {
        use crate::detect::backends::TractBackend;

        if !self.model_path.exists() {
            return Err(LoadError::Unavailable(format!(
                "model file {} not found",
                self.model_path.display()
            )));
        }

        let path = self.model_path.clone();
        let size = self.input_size;
        attempt_variants(self.name(), &["optimized", "plain"], move |variant| {
            let built = match variant {
                "optimized" => TractBackend::optimized(&path, size),
                _ => TractBackend::plain(&path, size),
            };
            built.map(|b| ModelSession::new(Box::new(b))).map_err(|e| {
                let msg = format!("{e:#}");
                // Optimizer rejections (unsupported ops/dtypes) are variant
                // incompatibilities, not transient failures.
                if msg.contains("unsupported") || msg.contains("not supported") {
                    LoadError::Incompatible(msg)
                } else {
                    LoadError::Unavailable(msg)
                }
            })
        })
    }
}

// ----------------------------------------------------------------------------
// Sessions
// ----------------------------------------------------------------------------

/// A loaded inference session. Owned exclusively by the manager.
pub struct ModelSession {
    backend: Box<dyn InferenceBackend>,
    validated: bool,
}

impl ModelSession {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            validated: false,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn io_spec(&self) -> &IoSpec {
        self.backend.io_spec()
    }

    /// Check the declared tensor interface. A session that fails here is a
    /// failed load, whatever the loader claimed.
    fn validate(&mut self) -> Result<(), LoadError> {
        let spec = self.backend.io_spec();
        if spec.input_name.is_empty() || spec.output_name.is_empty() {
            return Err(LoadError::Validation(
                "declared input/output names are empty".to_string(),
            ));
        }
        if spec.input_shape.len() != 4 || spec.input_shape.iter().any(|&d| d == 0) {
            return Err(LoadError::Validation(format!(
                "implausible input shape {:?}",
                spec.input_shape
            )));
        }
        if spec.output_shape.len() != 3 || spec.output_shape[1] == 0 || spec.output_shape[2] <= 5 {
            return Err(LoadError::Validation(format!(
                "implausible output shape {:?}",
                spec.output_shape
            )));
        }
        self.validated = true;
        Ok(())
    }

    /// One inference on a zero tensor. Catches sessions that load but
    /// cannot actually run.
    fn warm_up(&mut self) -> Result<(), LoadError> {
        let size = self.backend.io_spec().input_shape[2] as u32;
        let input = InputTensor::zeros(size);
        self.backend
            .run(&input)
            .map(|_| ())
            .map_err(|e| LoadError::Validation(format!("warm-up inference failed: {e:#}")))
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput> {
        if !self.validated {
            return Err(anyhow!("session was never validated"));
        }
        self.backend.run(input)
    }
}

// ----------------------------------------------------------------------------
// Manager
// ----------------------------------------------------------------------------

/// Owns the strategy cascade and the live session.
///
/// State machine: `Uninitialized -> Loading -> Ready | Failed`. Disposal
/// returns to `Uninitialized`; re-initializing from `Failed` is always
/// legal and is the explicit recovery path.
pub struct ModelSessionManager {
    state: SessionState,
    session: Option<ModelSession>,
    strategies: Vec<Box<dyn LoadStrategy>>,
    consecutive_failures: u32,
}

impl ModelSessionManager {
    pub fn new(strategies: Vec<Box<dyn LoadStrategy>>) -> Self {
        Self {
            state: SessionState::Uninitialized,
            session: None,
            strategies,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Inference failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Identifier of the live backend, for result records.
    pub fn model_id(&self) -> String {
        match &self.session {
            Some(session) => session.kind().as_str().to_string(),
            None => "none".to_string(),
        }
    }

    /// Walk the strategy cascade. Never returns an error: the outcome is the
    /// resulting state, which callers inspect.
    pub fn initialize(&mut self) -> SessionState {
        self.dispose();
        self.state = SessionState::Loading;

        for strategy in &mut self.strategies {
            let name = strategy.name();
            match strategy.attempt() {
                Ok(mut session) => {
                    if let Err(e) = session.validate().and_then(|()| session.warm_up()) {
                        log::warn!("strategy {name} produced an unusable session: {e}");
                        continue;
                    }
                    log::info!("model session ready via {name} ({})", session.kind().as_str());
                    self.session = Some(session);
                    self.state = SessionState::Ready;
                    return self.state;
                }
                Err(e) => {
                    log::warn!("strategy {name} failed: {e}");
                }
            }
        }

        log::warn!("all load strategies exhausted; no model session");
        self.state = SessionState::Failed;
        self.state
    }

    /// Run inference on the live session.
    pub fn infer(&mut self, input: &InputTensor) -> Result<RawOutput> {
        if self.state != SessionState::Ready {
            return Err(anyhow!("no model session (state {:?})", self.state));
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("ready state without a session"))?;

        match session.run(input).context("inference call failed") {
            Ok(output) => {
                self.consecutive_failures = 0;
                Ok(output)
            }
            Err(e) => {
                // A single failed call does not tear down the session.
                self.consecutive_failures += 1;
                Err(e)
            }
        }
    }

    /// Release the session and return to `Uninitialized`.
    pub fn dispose(&mut self) {
        self.session = None;
        self.consecutive_failures = 0;
        self.state = SessionState::Uninitialized;
    }
}
