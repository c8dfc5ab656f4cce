use cropscan_types::backend::BackendKind;
use cropscan_types::server::{ErrorDescriptor, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CropScanError {
    #[error("Could not read {path}: {message}")]
    InputReadError { path: String, message: String },

    #[error("Image payload is empty")]
    EmptyImagePayload,

    #[error("Image size ({size} bytes) exceeds maximum allowed ({max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Image format [{0}] is not allowed")]
    ImageFormatNotAllowed(String),

    #[error("Bytes could not be successfully decoded into an image: {0}")]
    ImageBytesDecodeError(String),

    #[error(
        "Image can't have zero value in any dimension. Found height: {height}, width: {width}"
    )]
    ImageNonzeroDimensionError { width: u32, height: u32 },

    #[error("Image preprocessing failed: {0}")]
    PreprocessingError(String),

    #[error("Image with {channels} channels cannot be produced, expected 1 or 3")]
    UnsupportedChannelCount { channels: u32 },

    #[error("Tensor of shape {actual:?} does not match the expected model shape {expected:?}")]
    TensorShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error(
        "top_k must be at least 1{}, got {top_k}",
        .max.map(|max| format!(" and at most {max}")).unwrap_or_default()
    )]
    TopKOutOfBounds { top_k: usize, max: Option<usize> },

    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Batch size {size} exceeds maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Model output is malformed: {0}")]
    MalformedProbabilities(String),

    #[error("[{backend}] model is not loaded")]
    ModelNotReady { backend: BackendKind },

    #[error("[{backend}] model failed on running inference: {message}")]
    InferenceError {
        backend: BackendKind,
        message: String,
    },

    #[error("[{backend}] model produced {actual} scores but has {expected} class labels")]
    OutputWidthMismatch {
        backend: BackendKind,
        expected: usize,
        actual: usize,
    },

    #[error("[{backend}] model could not be loaded: {message}")]
    ModelLoadError {
        backend: BackendKind,
        message: String,
    },

    #[error("[{backend}] class labels have no knowledge base entry: {missing:?}")]
    LabelsWithoutRecords {
        backend: BackendKind,
        missing: Vec<String>,
    },

    #[error("No disease record found for label {0}")]
    LabelNotFound(String),

    #[error("Knowledge base could not be loaded: {0}")]
    KnowledgeBaseLoadError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request did not complete within {millis}ms")]
    RequestTimeout { millis: u128 },

    #[error("Worker pool failed: {0}")]
    WorkerPoolError(String),
}

impl CropScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputReadError { .. }
            | Self::EmptyImagePayload
            | Self::ImageTooLarge { .. }
            | Self::ImageFormatNotAllowed(_)
            | Self::ImageBytesDecodeError(_)
            | Self::ImageNonzeroDimensionError { .. }
            | Self::TopKOutOfBounds { .. }
            | Self::EmptyBatch
            | Self::BatchTooLarge { .. }
            | Self::MalformedProbabilities(_) => ErrorKind::Validation,
            Self::ModelNotReady { .. } => ErrorKind::ModelNotReady,
            Self::PreprocessingError(_)
            | Self::UnsupportedChannelCount { .. }
            | Self::TensorShapeMismatch { .. }
            | Self::InferenceError { .. }
            | Self::OutputWidthMismatch { .. } => ErrorKind::Inference,
            Self::ModelLoadError { .. } | Self::LabelsWithoutRecords { .. } => {
                ErrorKind::ModelLoad
            }
            Self::LabelNotFound(_) => ErrorKind::NotFound,
            Self::KnowledgeBaseLoadError(_)
            | Self::InvalidConfig(_)
            | Self::WorkerPoolError(_) => ErrorKind::Configuration,
            Self::RequestTimeout { .. } => ErrorKind::Timeout,
        }
    }

    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
