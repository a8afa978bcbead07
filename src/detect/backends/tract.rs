#![cfg(feature = "backend-tract")]

//! Tract-based ONNX backend.
//!
//! Loads a local model file and runs it on the canonical NCHW tensor. Two
//! plan variants exist: the optimized plan (graph-level optimizations, the
//! fast path) and a plain typed plan for models the optimizer rejects. The
//! session cascade decides which variant to attempt.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{BackendKind, InferenceBackend, IoSpec, RawOutput};
use crate::preprocess::InputTensor;

/// ONNX inference backend running a tract plan.
pub struct TractBackend {
    plan: TypedSimplePlan<TypedModel>,
    spec: IoSpec,
    kind: BackendKind,
}

impl TractBackend {
    /// Load with graph optimizations applied.
    pub fn optimized<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        Self::load(model_path.as_ref(), input_size, true)
    }

    /// Load without graph optimization. Slower, more permissive.
    pub fn plain<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        Self::load(model_path.as_ref(), input_size, false)
    }

    fn load(model_path: &Path, input_size: u32, optimize: bool) -> Result<Self> {
        let s = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, s, s)))
            .context("set model input fact")?
            .into_typed()
            .context("type ONNX model")?;

        let plan = if optimize {
            model
                .into_optimized()
                .context("optimize ONNX model")?
                .into_runnable()
                .context("build optimized runnable plan")?
        } else {
            model.into_runnable().context("build runnable plan")?
        };

        // Probe with zeros to learn the concrete output shape up front; a
        // model that cannot run here will not run later either.
        let probe = plan
            .run(tvec!(Tensor::zero::<f32>(&[1, 3, s, s])
                .context("build probe tensor")?
                .into()))
            .context("probe inference run")?;
        let output_shape: Vec<usize> = probe
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?
            .shape()
            .to_vec();

        let spec = IoSpec {
            input_name: "images".to_string(),
            output_name: "output0".to_string(),
            input_shape: vec![1, 3, s, s],
            output_shape,
        };

        Ok(Self {
            plan,
            spec,
            kind: if optimize {
                BackendKind::OnnxOptimized
            } else {
                BackendKind::OnnxPlain
            },
        })
    }
}

impl InferenceBackend for TractBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn io_spec(&self) -> &IoSpec {
        &self.spec
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput> {
        let tensor = tract_ndarray::Array::from_shape_vec(
            (
                input.shape[0],
                input.shape[1],
                input.shape[2],
                input.shape[3],
            ),
            input.data.clone(),
        )
        .context("shape input tensor")?
        .into_tensor();

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        Ok(RawOutput::new(
            view.iter().copied().collect(),
            view.shape().to_vec(),
        ))
    }
}
