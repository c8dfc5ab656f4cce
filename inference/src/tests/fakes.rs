use crate::engine::backends::{BackendLoader, InferenceBackend, ModelSource};
use crate::error::CropScanError;
use cropscan_types::backend::{BackendKind, InputShape, TensorLayout};
use ndarray::{ArrayView, Ix4};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const FAKE_SHAPE: InputShape = InputShape {
    width: 8,
    height: 8,
    channels: 3,
    layout: TensorLayout::NHWC,
};

/// Backend returning fixed scores, counting how often it was asked
#[derive(Debug, Clone)]
pub(crate) struct FakeBackend {
    kind: BackendKind,
    scores: Vec<f32>,
    shape: InputShape,
    delay: Option<Duration>,
    failing: bool,
    panicking: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub(crate) fn new(scores: Vec<f32>) -> Self {
        Self {
            kind: BackendKind::Full,
            scores,
            shape: FAKE_SHAPE,
            delay: None,
            failing: false,
            panicking: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn with_shape(mut self, shape: InputShape) -> Self {
        self.shape = shape;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.panicking = true;
        self
    }

    /// Shared counter, still readable after the backend is boxed into a registry
    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl InferenceBackend for FakeBackend {
    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn output_width(&self) -> Option<usize> {
        Some(self.scores.len())
    }

    fn infer(&self, _input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, CropScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.panicking {
            panic!("forward pass panicked");
        }
        if self.failing {
            return Err(CropScanError::InferenceError {
                backend: self.kind,
                message: "forward pass failed".to_string(),
            });
        }
        Ok(self.scores.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeLoader {
    scores: Vec<f32>,
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self { scores: vec![1.0] }
    }
}

impl FakeLoader {
    pub(crate) fn with_output(scores: Vec<f32>) -> Self {
        Self { scores }
    }
}

impl BackendLoader for FakeLoader {
    fn load(
        &self,
        kind: BackendKind,
        _source: &ModelSource,
    ) -> Result<Box<dyn InferenceBackend>, CropScanError> {
        Ok(Box::new(
            FakeBackend::new(self.scores.clone()).with_kind(kind),
        ))
    }
}
