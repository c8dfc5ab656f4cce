use crate::engine::backends::{BackendLoader, InferenceBackend, ModelSource};
use crate::error::CropScanError;
use cropscan_types::backend::{BackendKind, InputShape, TensorLayout};
use ndarray::{ArrayView, Ix4};
use ort::ExecutionProvider as _;
use ort::{
    CUDAExecutionProvider, CoreMLExecutionProvider, DirectMLExecutionProvider, Session,
    SessionBuilder, TensorRTExecutionProvider, ValueType,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};

#[derive(
    clap::ValueEnum,
    EnumIter,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    Default,
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
    TensorRt,
    CoreMl,
    DirectMl,
}

fn register_provider(
    provider: ExecutionProvider,
    builder: &SessionBuilder,
) -> Result<(), ort::Error> {
    match provider {
        ExecutionProvider::TensorRt => TensorRTExecutionProvider::default().register(builder)?,
        ExecutionProvider::Cuda => CUDAExecutionProvider::default().register(builder)?,
        ExecutionProvider::DirectMl => DirectMLExecutionProvider::default().register(builder)?,
        ExecutionProvider::CoreMl => CoreMLExecutionProvider::default().register(builder)?,
        ExecutionProvider::Cpu => (),
    };
    Ok(())
}

/// Works out spatial size, channels and layout from declared input dimensions.
///
/// Dynamic spatial dimensions (`-1`) fall back to `fallback_size`.
pub(crate) fn input_shape_from_dims(
    dims: &[i64],
    fallback_size: u32,
) -> Result<InputShape, String> {
    let [_, d1, d2, d3] = dims else {
        return Err(format!("expected a rank 4 image input, found dims {dims:?}"));
    };
    let spatial = |value: i64| {
        if value > 0 {
            value as u32
        } else {
            fallback_size
        }
    };
    let is_channels = |value: i64| value == 1 || value == 3;
    if is_channels(*d3) {
        Ok(InputShape {
            height: spatial(*d1),
            width: spatial(*d2),
            channels: *d3 as u32,
            layout: TensorLayout::NHWC,
        })
    } else if is_channels(*d1) {
        Ok(InputShape {
            channels: *d1 as u32,
            height: spatial(*d2),
            width: spatial(*d3),
            layout: TensorLayout::NCHW,
        })
    } else {
        Err(format!("cannot infer channel axis from dims {dims:?}"))
    }
}

/// Builds ONNX Runtime sessions for either slot
#[derive(Clone, Debug)]
pub struct OrtLoader {
    provider: ExecutionProvider,
    intra_threads: usize,
    fallback_size: u32,
}

impl OrtLoader {
    pub fn new(provider: ExecutionProvider, intra_threads: usize, fallback_size: u32) -> Self {
        Self {
            provider,
            intra_threads,
            fallback_size,
        }
    }

    #[tracing::instrument(skip(self))]
    fn build_session(&self, path: &Path) -> Result<Session, ort::Error> {
        let builder = Session::builder()?.with_intra_threads(self.intra_threads)?;
        register_provider(self.provider, &builder)?;
        builder.commit_from_file(path)
    }
}

impl BackendLoader for OrtLoader {
    fn load(
        &self,
        kind: BackendKind,
        source: &ModelSource,
    ) -> Result<Box<dyn InferenceBackend>, CropScanError> {
        let load_error = |message: String| CropScanError::ModelLoadError {
            backend: kind,
            message,
        };
        if !source.model_path.is_file() {
            return Err(load_error(format!(
                "artifact {} does not exist",
                source.model_path.display()
            )));
        }
        let session = self
            .build_session(&source.model_path)
            .map_err(|e| load_error(e.to_string()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| load_error("model declares no inputs".to_string()))?;
        let input_shape = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => {
                input_shape_from_dims(dimensions, self.fallback_size).map_err(load_error)?
            }
            other => return Err(load_error(format!("unsupported input type {other:?}"))),
        };
        let input_name = input.name.clone();
        let output_width = session.outputs.first().and_then(|output| {
            match &output.output_type {
                ValueType::Tensor { dimensions, .. } => dimensions
                    .last()
                    .filter(|width| **width > 0)
                    .map(|width| *width as usize),
                _ => None,
            }
        });

        tracing::info!(
            backend = %kind,
            artifact = %source.model_path.display(),
            width = input_shape.width,
            height = input_shape.height,
            layout = %input_shape.layout,
            "Session committed"
        );
        Ok(Box::new(OrtBackend {
            kind,
            session,
            input_name,
            input_shape,
            output_width,
        }))
    }
}

pub struct OrtBackend {
    kind: BackendKind,
    session: Session,
    input_name: String,
    input_shape: InputShape,
    output_width: Option<usize>,
}

impl fmt::Debug for OrtBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrtBackend")
            .field("kind", &self.kind)
            .field("input_name", &self.input_name)
            .field("input_shape", &self.input_shape)
            .field("output_width", &self.output_width)
            .finish()
    }
}

impl InferenceBackend for OrtBackend {
    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn output_width(&self) -> Option<usize> {
        self.output_width
    }

    #[tracing::instrument(skip_all, fields(backend = %self.kind))]
    fn infer(&self, input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, CropScanError> {
        let inference_error = |message: String| CropScanError::InferenceError {
            backend: self.kind,
            message,
        };
        let session_inputs = ort::inputs![
            self.input_name.as_str() => input,
        ]
        .map_err(|e| inference_error(e.to_string()))?;

        let outputs = self
            .session
            .run(session_inputs)
            .map_err(|e| inference_error(e.to_string()))?;

        let scores = outputs
            .values()
            .next()
            .ok_or_else(|| inference_error("No output tensor found".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error(e.to_string()))?;
        Ok(scores.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropscan_types::backend::{OutputActivation, PixelScaling};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(&[1, 224, 224, 3], 224, 224, 3, TensorLayout::NHWC; "keras export")]
    #[test_case(&[1, 3, 256, 192], 192, 256, 3, TensorLayout::NCHW; "torch export")]
    #[test_case(&[-1, -1, -1, 3], 160, 160, 3, TensorLayout::NHWC; "dynamic spatial dims")]
    #[test_case(&[1, 1, 28, 28], 28, 28, 1, TensorLayout::NCHW; "grayscale")]
    fn detects_layout_from_dims(
        dims: &[i64],
        width: u32,
        height: u32,
        channels: u32,
        layout: TensorLayout,
    ) {
        assert_eq!(
            input_shape_from_dims(dims, 160).unwrap(),
            InputShape {
                width,
                height,
                channels,
                layout,
            }
        );
    }

    #[test]
    fn rejects_non_image_inputs() {
        assert!(input_shape_from_dims(&[1, 128], 224).is_err());
        assert!(input_shape_from_dims(&[1, 64, 64, 64], 224).is_err());
    }

    #[test]
    fn missing_artifact_fails_without_touching_runtime() {
        let loader = OrtLoader::new(ExecutionProvider::Cpu, 1, 224);
        let source = ModelSource {
            model_path: "/nonexistent/leaf_model.onnx".into(),
            labels_path: "/nonexistent/class_labels.json".into(),
            scaling: PixelScaling::ZeroToOne,
            activation: OutputActivation::Probabilities,
        };
        let err = loader.load(BackendKind::Optimized, &source).unwrap_err();
        assert_eq!(
            err.kind(),
            cropscan_types::server::ErrorKind::ModelLoad,
            "{err}"
        );
    }
}
