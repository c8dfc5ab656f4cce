pub mod onnx;

use crate::error::CropScanError;
use cropscan_types::backend::{BackendKind, InputShape, OutputActivation, PixelScaling};
use ndarray::{ArrayView, Ix4};
use std::fmt::Debug;
use std::path::PathBuf;

/// A loaded model that can run forward passes.
///
/// Implementations must be safe to call concurrently, weights are never mutated after load.
pub trait InferenceBackend: Send + Sync + Debug {
    /// Input the model declares
    fn input_shape(&self) -> InputShape;

    /// Number of scores per image, when the artifact declares it statically
    fn output_width(&self) -> Option<usize>;

    /// Raw scores for a single-image batch, in class index order
    fn infer(&self, input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, CropScanError>;
}

/// Everything needed to bring a slot up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSource {
    pub model_path: PathBuf,
    /// JSON array of class labels in training index order, shipped with the model
    pub labels_path: PathBuf,
    pub scaling: PixelScaling,
    pub activation: OutputActivation,
}

pub trait BackendLoader: Send + Sync {
    fn load(
        &self,
        kind: BackendKind,
        source: &ModelSource,
    ) -> Result<Box<dyn InferenceBackend>, CropScanError>;
}
