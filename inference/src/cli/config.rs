use crate::engine::backends::ModelSource;
use crate::engine::backends::onnx::ExecutionProvider;
use crate::engine::normalizer::{ImageNormalizer, parse_formats};
use crate::engine::orchestrator::RequestLimits;
use crate::engine::ranker::{
    DEFAULT_MODERATE_THRESHOLD, DEFAULT_PROBABILITY_TOLERANCE, DEFAULT_SEVERE_THRESHOLD, Ranker,
};
use crate::error::CropScanError;
use clap::{ArgAction, Args};
use cropscan_types::DEFAULT_TOP_K;
use cropscan_types::backend::{BackendKind, OutputActivation, PixelScaling};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Full precision model artifact
    #[arg(
        long,
        env = "CROPSCAN_FULL_MODEL",
        default_value = "models/leaf_disease_full.onnx"
    )]
    pub full_model: PathBuf,

    /// Class label file shipped with the full model
    #[arg(
        long,
        env = "CROPSCAN_FULL_LABELS",
        default_value = "models/class_labels.json"
    )]
    pub full_labels: PathBuf,

    /// Pixel range the full model was trained on
    #[arg(long, env = "CROPSCAN_FULL_SCALING", default_value_t = PixelScaling::ZeroToOne)]
    pub full_scaling: PixelScaling,

    /// Whether the full model ends in a softmax
    #[arg(long, env = "CROPSCAN_FULL_ACTIVATION", default_value_t = OutputActivation::Probabilities)]
    pub full_activation: OutputActivation,

    /// Size and latency optimized model artifact
    #[arg(
        long,
        env = "CROPSCAN_OPTIMIZED_MODEL",
        default_value = "models/leaf_disease_optimized.onnx"
    )]
    pub optimized_model: PathBuf,

    /// Class label file shipped with the optimized model
    #[arg(
        long,
        env = "CROPSCAN_OPTIMIZED_LABELS",
        default_value = "models/class_labels.json"
    )]
    pub optimized_labels: PathBuf,

    #[arg(long, env = "CROPSCAN_OPTIMIZED_SCALING", default_value_t = PixelScaling::ZeroToOne)]
    pub optimized_scaling: PixelScaling,

    #[arg(long, env = "CROPSCAN_OPTIMIZED_ACTIVATION", default_value_t = OutputActivation::Probabilities)]
    pub optimized_activation: OutputActivation,

    /// Input edge length used when a model declares dynamic spatial dimensions
    #[arg(long, env = "CROPSCAN_IMAGE_SIZE", default_value_t = 224)]
    pub image_size: u32,

    /// ONNX Runtime execution provider
    #[arg(long, env = "CROPSCAN_EXECUTION_PROVIDER", value_enum, default_value_t = ExecutionProvider::Cpu)]
    pub execution_provider: ExecutionProvider,

    /// Intra-op threads per model session
    #[arg(long, env = "CROPSCAN_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Largest accepted image payload in MiB
    #[arg(long, env = "CROPSCAN_MAX_IMAGE_MB", default_value_t = 10)]
    pub max_image_mb: usize,

    /// Image formats accepted for decoding
    #[arg(
        long,
        env = "CROPSCAN_ALLOWED_FORMATS",
        value_delimiter = ',',
        default_values_t = [String::from("jpeg"), String::from("png")]
    )]
    pub allowed_formats: Vec<String>,

    /// Most images accepted in a single batch
    #[arg(long, env = "CROPSCAN_MAX_BATCH_SIZE", default_value_t = 10)]
    pub max_batch_size: usize,

    #[arg(long, env = "CROPSCAN_DEFAULT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub default_top_k: usize,

    /// Optional cap on requested candidates. Without it a request may ask for every class.
    #[arg(long, env = "CROPSCAN_MAX_TOP_K")]
    pub max_top_k: Option<usize>,

    /// Confidence at or above which a disease is tagged severe
    #[arg(long, env = "CROPSCAN_SEVERE_THRESHOLD", default_value_t = DEFAULT_SEVERE_THRESHOLD)]
    pub severe_threshold: f32,

    /// Confidence at or above which a disease is tagged moderate
    #[arg(long, env = "CROPSCAN_MODERATE_THRESHOLD", default_value_t = DEFAULT_MODERATE_THRESHOLD)]
    pub moderate_threshold: f32,

    /// Allowed distance of a probability vector's sum from 1
    #[arg(long, env = "CROPSCAN_PROBABILITY_TOLERANCE", default_value_t = DEFAULT_PROBABILITY_TOLERANCE)]
    pub probability_tolerance: f32,

    /// Threads used to fan out the images of one batch
    #[arg(long, env = "CROPSCAN_BATCH_WORKERS", default_value_t = 4)]
    pub batch_workers: usize,

    /// Seconds a request may run before it is abandoned
    #[arg(long, env = "CROPSCAN_REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,

    /// Replaces the built in disease knowledge base
    #[arg(long, env = "CROPSCAN_KNOWLEDGE_BASE")]
    pub knowledge_base: Option<PathBuf>,

    /// Log level, as `EnvFilter` directives
    #[arg(long, env = "CROPSCAN_LOG_LEVEL", default_value_t = String::from("info"))]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false, action=ArgAction::SetTrue)]
    pub json_logs: bool,

    /// Export spans to an OTLP collector
    #[arg(long, default_value_t = false, action=ArgAction::SetTrue)]
    pub enable_tracing: bool,

    /// Otel collector url to send traces to
    #[arg(long, env = "CROPSCAN_OTEL_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            full_model: PathBuf::from("models/leaf_disease_full.onnx"),
            full_labels: PathBuf::from("models/class_labels.json"),
            full_scaling: PixelScaling::ZeroToOne,
            full_activation: OutputActivation::Probabilities,
            optimized_model: PathBuf::from("models/leaf_disease_optimized.onnx"),
            optimized_labels: PathBuf::from("models/class_labels.json"),
            optimized_scaling: PixelScaling::ZeroToOne,
            optimized_activation: OutputActivation::Probabilities,

            image_size: 224,
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 4,

            max_image_mb: 10,
            allowed_formats: vec![String::from("jpeg"), String::from("png")],
            max_batch_size: 10,
            default_top_k: DEFAULT_TOP_K,
            max_top_k: None,

            severe_threshold: DEFAULT_SEVERE_THRESHOLD,
            moderate_threshold: DEFAULT_MODERATE_THRESHOLD,
            probability_tolerance: DEFAULT_PROBABILITY_TOLERANCE,

            batch_workers: 4,
            request_timeout: 30,
            knowledge_base: None,

            log_level: String::from("info"),
            json_logs: false,
            enable_tracing: false,
            otel_endpoint: None,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), CropScanError> {
        let invalid = |message: &str| Err(CropScanError::InvalidConfig(message.to_string()));
        if self.max_batch_size == 0 {
            return invalid("max batch size must be at least 1");
        }
        if self.batch_workers == 0 {
            return invalid("batch workers must be at least 1");
        }
        if self.intra_threads == 0 {
            return invalid("intra threads must be at least 1");
        }
        if self.max_image_mb == 0 {
            return invalid("max image size must be at least 1 MiB");
        }
        if self.image_size == 0 {
            return invalid("image size must be at least 1");
        }
        if self.request_timeout == 0 {
            return invalid("request timeout must be at least 1 second");
        }
        if self.max_top_k == Some(0) || self.default_top_k == 0 {
            return invalid("top-k limits must be at least 1");
        }
        if let Some(max_top_k) = self.max_top_k.filter(|max| self.default_top_k > *max) {
            return Err(CropScanError::InvalidConfig(format!(
                "default top-k {} is above max top-k {max_top_k}",
                self.default_top_k
            )));
        }
        if self.enable_tracing && self.otel_endpoint.is_none() {
            return invalid("tracing is enabled but no otel endpoint is set");
        }
        self.max_payload_bytes()?;
        self.ranker()?;
        parse_formats(&self.allowed_formats)?;
        Ok(())
    }

    pub fn model_source(&self, kind: BackendKind) -> ModelSource {
        match kind {
            BackendKind::Full => ModelSource {
                model_path: self.full_model.clone(),
                labels_path: self.full_labels.clone(),
                scaling: self.full_scaling,
                activation: self.full_activation,
            },
            BackendKind::Optimized => ModelSource {
                model_path: self.optimized_model.clone(),
                labels_path: self.optimized_labels.clone(),
                scaling: self.optimized_scaling,
                activation: self.optimized_activation,
            },
        }
    }

    pub fn max_payload_bytes(&self) -> Result<usize, CropScanError> {
        self.max_image_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            CropScanError::InvalidConfig(format!(
                "max image size of {} MiB does not fit in memory",
                self.max_image_mb
            ))
        })
    }

    pub fn ranker(&self) -> Result<Ranker, CropScanError> {
        Ranker::new(
            self.severe_threshold,
            self.moderate_threshold,
            self.probability_tolerance,
        )
    }

    pub fn normalizer(&self) -> Result<ImageNormalizer, CropScanError> {
        Ok(ImageNormalizer::new(
            self.max_payload_bytes()?,
            parse_formats(&self.allowed_formats)?,
        ))
    }

    pub fn limits(&self) -> RequestLimits {
        RequestLimits {
            max_batch_size: self.max_batch_size,
            max_top_k: self.max_top_k,
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    pub fn set_model(mut self, kind: BackendKind, model: PathBuf, labels: PathBuf) -> Self {
        match kind {
            BackendKind::Full => {
                self.full_model = model;
                self.full_labels = labels;
            }
            BackendKind::Optimized => {
                self.optimized_model = model;
                self.optimized_labels = labels;
            }
        }
        self
    }

    pub fn set_severity_thresholds(mut self, severe: f32, moderate: f32) -> Self {
        self.severe_threshold = severe;
        self.moderate_threshold = moderate;
        self
    }

    pub fn set_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn set_max_image_mb(mut self, max_image_mb: usize) -> Self {
        self.max_image_mb = max_image_mb;
        self
    }

    pub fn set_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }

    pub fn set_knowledge_base(mut self, path: PathBuf) -> Self {
        self.knowledge_base = Some(path);
        self
    }
}
