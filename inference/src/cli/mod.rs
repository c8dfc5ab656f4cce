mod config;

pub use config::ServiceConfig;

use crate::engine::knowledge::KnowledgeBase;
use crate::engine::orchestrator::{InferenceContext, Orchestrator};
use crate::error::CropScanError;
use clap::{Parser, Subcommand};
use cropscan_types::backend::BackendKind;
use cropscan_types::image::EncodedImage;
use cropscan_types::query::{BatchPredictRequest, PredictRequest};
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracer::{LogFormat, TracingOptions};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ServiceConfig,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Classifies a single leaf image
    Predict {
        image: PathBuf,
        #[arg(long, default_value_t = BackendKind::Full)]
        backend: BackendKind,
        /// Defaults to the configured top-k
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Classifies several leaf images independently
    Batch {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long, default_value_t = BackendKind::Full)]
        backend: BackendKind,
        /// Candidates per image, one when unset
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Reports which backends are ready
    Health,
    /// Lists class labels in model index order
    Classes {
        #[arg(long)]
        backend: Option<BackendKind>,
    },
    /// Describes both backend slots
    ModelInfo,
    /// Looks up the reference record for a class label
    Disease { label: String },
    /// Lists reference records for a crop
    Crop { name: String },
    /// Reports format and dimensions of an image without running a model
    ImageInfo { image: PathBuf },
}

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

fn read_image(path: &Path) -> Result<Vec<u8>, CropScanError> {
    std::fs::read(path).map_err(|e| CropScanError::InputReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn orchestrator(config: &ServiceConfig) -> Result<Arc<Orchestrator>, CropScanError> {
    let context = InferenceContext::from_config(config)?;
    Ok(Arc::new(Orchestrator::from_config(context, config)?))
}

impl ServiceConfig {
    pub fn tracing_options(&self) -> TracingOptions<'_> {
        TracingOptions {
            service_name: crate::SERVICE_NAME,
            log_level: &self.log_level,
            format: if self.json_logs {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            otel_endpoint: if self.enable_tracing {
                self.otel_endpoint.as_deref()
            } else {
                None
            },
        }
    }
}

impl Cli {
    /// Executes the subcommand and returns what should be printed
    pub async fn run(self) -> CliResult<Value> {
        let Cli { config, command } = self;
        let output = match command {
            Commands::Predict {
                image,
                backend,
                top_k,
            } => {
                let request = PredictRequest {
                    image: read_image(&image)?.into(),
                    backend,
                    top_k: top_k.unwrap_or(config.default_top_k),
                };
                serde_json::to_value(orchestrator(&config)?.handle_predict(request).await?)?
            }
            Commands::Batch {
                images,
                backend,
                top_k,
            } => {
                let request = BatchPredictRequest {
                    images: images
                        .iter()
                        .map(|path| read_image(path).map(EncodedImage::from))
                        .collect::<Result<Vec<_>, _>>()?,
                    backend,
                    top_k,
                };
                serde_json::to_value(orchestrator(&config)?.handle_batch(request).await?)?
            }
            Commands::Health => serde_json::to_value(orchestrator(&config)?.health())?,
            Commands::Classes { backend } => {
                serde_json::to_value(orchestrator(&config)?.classes(backend)?)?
            }
            Commands::ModelInfo => serde_json::to_value(orchestrator(&config)?.model_info())?,
            Commands::Disease { label } => {
                let knowledge = KnowledgeBase::load(config.knowledge_base.as_deref())?;
                serde_json::to_value(knowledge.lookup(&label)?)?
            }
            Commands::Crop { name } => {
                let knowledge = KnowledgeBase::load(config.knowledge_base.as_deref())?;
                serde_json::to_value(knowledge.search_by_crop(&name))?
            }
            Commands::ImageInfo { image } => {
                let info = config.normalizer()?.image_info(&read_image(&image)?)?;
                serde_json::to_value(info)?
            }
        };
        Ok(output)
    }
}
