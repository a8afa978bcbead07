//! Inference backend contract.
//!
//! The core never assumes a specific runtime. A backend is an opaque
//! "canonical tensor in, raw tensor out" function; decoding its output is
//! the decoder's job, and choosing/validating a backend is the session
//! manager's job.

use anyhow::Result;

use crate::preprocess::InputTensor;

/// Which execution path produced a session.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Optimized ONNX plan (tract, graph-level optimizations applied).
    OnnxOptimized,
    /// Plain ONNX plan without graph optimization.
    OnnxPlain,
    /// In-process stub returning canned tensors.
    Stub,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OnnxOptimized => "onnx-optimized",
            BackendKind::OnnxPlain => "onnx-plain",
            BackendKind::Stub => "stub",
        }
    }
}

/// Declared tensor interface of a loaded model.
///
/// Session validation checks these before the backend is ever handed to the
/// decoder: empty names or implausible shapes mean the load did not really
/// succeed, whatever the loader claimed.
#[derive(Clone, Debug)]
pub struct IoSpec {
    pub input_name: String,
    pub output_name: String,
    /// Declared input shape, NCHW.
    pub input_shape: Vec<usize>,
    /// Declared output shape, `[batch, candidates, fields]`.
    pub output_shape: Vec<usize>,
}

/// Raw model output: a flat buffer plus its declared shape.
#[derive(Clone, Debug)]
pub struct RawOutput {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl RawOutput {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        Self { data, shape }
    }

    /// All-zero output with the given shape. Used for warm-up checks and
    /// stub backends.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            data: vec![0.0; len],
            shape,
        }
    }
}

/// Inference backend trait.
///
/// Implementations must treat the input tensor as read-only and must not
/// retain it beyond the call.
pub trait InferenceBackend: Send {
    fn kind(&self) -> BackendKind;

    fn io_spec(&self) -> &IoSpec;

    /// Run inference on a preprocessed tensor.
    fn run(&mut self, input: &InputTensor) -> Result<RawOutput>;
}
