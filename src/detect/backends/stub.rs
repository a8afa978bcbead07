//! Stub backends for tests and the demo.
//!
//! `StubBackend` replays a canned output tensor and counts its invocations,
//! which is what the cache tests key on. `FailingBackend` errors on every
//! call to exercise the fallback path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::detect::backend::{BackendKind, InferenceBackend, IoSpec, RawOutput};
use crate::preprocess::InputTensor;

fn stub_io_spec(input_size: u32, candidates: usize, fields: usize) -> IoSpec {
    let s = input_size as usize;
    IoSpec {
        input_name: "images".to_string(),
        output_name: "output0".to_string(),
        input_shape: vec![1, 3, s, s],
        output_shape: vec![1, candidates, fields],
    }
}

/// Deterministic in-process backend replaying a canned tensor.
pub struct StubBackend {
    spec: IoSpec,
    output: RawOutput,
    calls: Arc<AtomicUsize>,
    /// When set, calls beyond this count fail. Lets tests take a session
    /// through warm-up and then break it.
    fail_after: Option<usize>,
}

impl StubBackend {
    /// Stub producing an all-zero output of YOLO-ish shape.
    pub fn zeros(input_size: u32, candidates: usize, fields: usize) -> Self {
        Self::with_output(input_size, RawOutput::zeros(vec![1, candidates, fields]))
    }

    /// Stub replaying a specific output tensor on every call.
    pub fn with_output(input_size: u32, output: RawOutput) -> Self {
        let (candidates, fields) = match output.shape.as_slice() {
            [_, c, f] => (*c, *f),
            _ => (0, 0),
        };
        Self {
            spec: stub_io_spec(input_size, candidates, fields),
            output,
            calls: Arc::new(AtomicUsize::new(0)),
            fail_after: None,
        }
    }

    /// Fail every call after the first `calls` successful ones.
    pub fn failing_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Shared invocation counter; clones observe future calls.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl InferenceBackend for StubBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Stub
    }

    fn io_spec(&self) -> &IoSpec {
        &self.spec
    }

    fn run(&mut self, _input: &InputTensor) -> Result<RawOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if call >= limit {
                return Err(anyhow!("simulated backend failure on call {call}"));
            }
        }
        Ok(self.output.clone())
    }
}

/// Backend that fails every inference call.
pub struct FailingBackend {
    spec: IoSpec,
    calls: Arc<AtomicUsize>,
}

impl FailingBackend {
    pub fn new(input_size: u32) -> Self {
        Self {
            spec: stub_io_spec(input_size, 8400, 85),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl InferenceBackend for FailingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Stub
    }

    fn io_spec(&self) -> &IoSpec {
        &self.spec
    }

    fn run(&mut self, _input: &InputTensor) -> Result<RawOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("simulated backend failure"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_replays_output_and_counts_calls() {
        let mut backend = StubBackend::zeros(640, 8400, 85);
        let counter = backend.call_counter();
        let input = InputTensor::zeros(640);

        let out = backend.run(&input).unwrap();
        assert_eq!(out.shape, vec![1, 8400, 85]);
        assert!(out.data.iter().all(|&v| v == 0.0));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        backend.run(&input).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_after_allows_warm_up_then_breaks() {
        let mut backend = StubBackend::zeros(640, 8400, 85).failing_after(1);
        let input = InputTensor::zeros(640);
        assert!(backend.run(&input).is_ok());
        assert!(backend.run(&input).is_err());
        assert!(backend.run(&input).is_err());
    }

    #[test]
    fn failing_backend_always_errors() {
        let mut backend = FailingBackend::new(640);
        let input = InputTensor::zeros(640);
        assert!(backend.run(&input).is_err());
        assert!(backend.run(&input).is_err());
        assert_eq!(backend.call_counter().load(Ordering::SeqCst), 2);
    }
}
