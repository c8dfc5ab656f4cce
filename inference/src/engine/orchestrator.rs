use crate::cli::ServiceConfig;
use crate::engine::backends::onnx::OrtLoader;
use crate::engine::knowledge::KnowledgeBase;
use crate::engine::normalizer::ImageNormalizer;
use crate::engine::pool::BatchPool;
use crate::engine::ranker::{PredictionCandidate, Ranker};
use crate::engine::registry::{LoadedBackend, ModelRegistry};
use crate::error::CropScanError;
use cropscan_types::backend::BackendKind;
use cropscan_types::query::{BatchPredictRequest, PredictRequest};
use cropscan_types::server::{
    AlternativePrediction, BatchItemResponse, BatchPredictResponse, ClassesResponse,
    HealthResponse, ModelInfoResponse, PredictResponse, PrimaryPrediction,
};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, IntoEnumIterator};
use tracing::Span;

/// Per item outcome of a batch, positioned like its input
pub type BatchItemResult = Result<PredictResponse, CropScanError>;

/// Process wide shared state, constructed once and handed to the orchestrator
#[derive(Clone, Debug)]
pub struct InferenceContext {
    pub registry: Arc<ModelRegistry>,
    pub knowledge: Arc<KnowledgeBase>,
}

impl InferenceContext {
    pub fn new(registry: Arc<ModelRegistry>, knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            registry,
            knowledge,
        }
    }

    /// Loads the knowledge base, then both backends. A backend that fails to load is left not
    /// ready and reported through `status`; only a broken knowledge base aborts.
    #[tracing::instrument(skip_all)]
    pub fn from_config(config: &ServiceConfig) -> Result<Self, CropScanError> {
        let knowledge = Arc::new(KnowledgeBase::load(config.knowledge_base.as_deref())?);
        let loader = OrtLoader::new(
            config.execution_provider,
            config.intra_threads,
            config.image_size,
        );
        let registry = ModelRegistry::new(loader).with_coverage(knowledge.clone());
        let failed: Vec<BackendKind> = BackendKind::iter()
            .filter(|kind| registry.load(*kind, &config.model_source(*kind)).is_err())
            .collect();
        if failed.len() == BackendKind::iter().count() {
            tracing::warn!("No backend is ready, every prediction will fail until one loads");
        }
        Ok(Self::new(Arc::new(registry), knowledge))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_batch_size: usize,
    /// Optional ceiling below the class count. Unset means a request may ask for every class.
    pub max_top_k: Option<usize>,
    pub request_timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_top_k: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Steps a single prediction moves through
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PredictionStage {
    Received,
    Validated,
    Normalized,
    Inferred,
    Ranked,
    Enriched,
    Returned,
}

fn primary_from(candidate: PredictionCandidate) -> PrimaryPrediction {
    PrimaryPrediction {
        label: candidate.label,
        class_index: candidate.class_index,
        confidence: candidate.probability,
        severity: candidate.severity,
    }
}

fn alternative_from(candidate: PredictionCandidate) -> AlternativePrediction {
    AlternativePrediction {
        label: candidate.label,
        class_index: candidate.class_index,
        confidence: candidate.probability,
        severity: candidate.severity,
    }
}

pub struct Orchestrator {
    context: InferenceContext,
    normalizer: ImageNormalizer,
    ranker: Ranker,
    pool: BatchPool,
    limits: RequestLimits,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("ranker", &self.ranker)
            .field("limits", &self.limits)
            .field("workers", &self.pool.workers())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        context: InferenceContext,
        normalizer: ImageNormalizer,
        ranker: Ranker,
        pool: BatchPool,
        limits: RequestLimits,
    ) -> Self {
        Self {
            context,
            normalizer,
            ranker,
            pool,
            limits,
        }
    }

    pub fn from_config(
        context: InferenceContext,
        config: &ServiceConfig,
    ) -> Result<Self, CropScanError> {
        config.validate()?;
        Ok(Self::new(
            context,
            config.normalizer()?,
            config.ranker()?,
            BatchPool::new(config.batch_workers)?,
            config.limits(),
        ))
    }

    pub fn context(&self) -> &InferenceContext {
        &self.context
    }

    pub fn limits(&self) -> &RequestLimits {
        &self.limits
    }

    fn check_top_k(&self, top_k: usize) -> Result<(), CropScanError> {
        let above_ceiling = self.limits.max_top_k.is_some_and(|max| top_k > max);
        if top_k == 0 || above_ceiling {
            return Err(CropScanError::TopKOutOfBounds {
                top_k,
                max: self.limits.max_top_k,
            });
        }
        Ok(())
    }

    /// Classifies one image on the chosen backend and enriches the top class.
    ///
    /// Never falls back to the other backend. `top_k` above the class count yields every class.
    #[tracing::instrument(skip(self, image), fields(size = image.len()))]
    pub fn predict_one(
        &self,
        image: &[u8],
        backend: BackendKind,
        top_k: usize,
    ) -> Result<PredictResponse, CropScanError> {
        // one handle for the whole request, a concurrent reload cannot mix versions
        let loaded = self.context.registry.backend(backend);
        self.predict_on(image, backend, top_k, loaded.as_ref())
    }

    fn predict_on(
        &self,
        image: &[u8],
        backend: BackendKind,
        top_k: usize,
        loaded: Result<&Arc<LoadedBackend>, &CropScanError>,
    ) -> Result<PredictResponse, CropScanError> {
        let mut stage = PredictionStage::Received;
        let outcome = self.run_stages(image, backend, top_k, loaded, &mut stage);
        if let Err(error) = &outcome {
            tracing::warn!(
                backend = %backend,
                failed_at = %stage,
                kind = %error.kind(),
                error = %error,
                "Prediction failed"
            );
        }
        outcome
    }

    // `stage` names the step being attempted, so on failure it is where the request stopped.
    // An unready backend is reported only after the input itself passed validation.
    fn run_stages(
        &self,
        image: &[u8],
        backend: BackendKind,
        top_k: usize,
        loaded: Result<&Arc<LoadedBackend>, &CropScanError>,
        stage: &mut PredictionStage,
    ) -> Result<PredictResponse, CropScanError> {
        *stage = PredictionStage::Validated;
        self.check_top_k(top_k)?;
        self.normalizer.validate_payload(image)?;
        let loaded = loaded.map_err(Clone::clone)?;

        *stage = PredictionStage::Normalized;
        let tensor = self.normalizer.normalize(image, loaded.input_spec())?;

        *stage = PredictionStage::Inferred;
        let probabilities = loaded.infer(tensor.view())?;

        *stage = PredictionStage::Ranked;
        let labels = loaded.labels();
        let ranked = self
            .ranker
            .rank(&probabilities, labels, top_k.min(labels.len()))?;

        *stage = PredictionStage::Enriched;
        let disease_info = self.context.knowledge.lookup(&ranked.primary.label)?.clone();

        *stage = PredictionStage::Returned;
        Ok(PredictResponse {
            backend,
            primary: primary_from(ranked.primary),
            alternatives: ranked.alternatives.into_iter().map(alternative_from).collect(),
            disease_info,
        })
    }

    /// Classifies every image independently. A failing item only fills its own slot.
    ///
    /// The call as a whole is rejected when the batch is empty, larger than the configured
    /// maximum, or asks for an invalid `top_k`. Items default to a single candidate. Every item
    /// runs on the model version that was loaded when the batch started.
    #[tracing::instrument(skip(self, images), fields(count = images.len()))]
    pub fn predict_batch<I>(
        &self,
        images: &[I],
        backend: BackendKind,
        top_k: Option<usize>,
    ) -> Result<Vec<BatchItemResult>, CropScanError>
    where
        I: AsRef<[u8]> + Sync,
    {
        if images.is_empty() {
            return Err(CropScanError::EmptyBatch);
        }
        if images.len() > self.limits.max_batch_size {
            return Err(CropScanError::BatchTooLarge {
                size: images.len(),
                max: self.limits.max_batch_size,
            });
        }
        let top_k = top_k.unwrap_or(1);
        self.check_top_k(top_k)?;

        let loaded = self.context.registry.backend(backend);
        let parent = Span::current();
        let results = self.pool.map_ordered(images, |index, image| {
            let _guard = tracing::info_span!(parent: &parent, "batch-item", index).entered();
            self.predict_on(image.as_ref(), backend, top_k, loaded.as_ref())
        });
        let failed = results.iter().filter(|result| result.is_err()).count();
        tracing::info!(
            backend = %backend,
            succeeded = results.len() - failed,
            failed,
            "Batch finished"
        );
        Ok(results)
    }

    /// Runs `predict_one` on the blocking pool, giving up after the request timeout.
    ///
    /// Abandoned work runs to completion against read-only state and its result is dropped.
    pub async fn predict_one_within(
        self: &Arc<Self>,
        image: Vec<u8>,
        backend: BackendKind,
        top_k: usize,
    ) -> Result<PredictResponse, CropScanError> {
        let this = Arc::clone(self);
        self.within(backend, move || this.predict_one(&image, backend, top_k))
            .await
    }

    pub async fn predict_batch_within(
        self: &Arc<Self>,
        images: Vec<Vec<u8>>,
        backend: BackendKind,
        top_k: Option<usize>,
    ) -> Result<Vec<BatchItemResult>, CropScanError> {
        let this = Arc::clone(self);
        self.within(backend, move || this.predict_batch(&images, backend, top_k))
            .await
    }

    /// Entry point for a decoded single prediction request
    pub async fn handle_predict(
        self: &Arc<Self>,
        request: PredictRequest,
    ) -> Result<PredictResponse, CropScanError> {
        let PredictRequest {
            image,
            backend,
            top_k,
        } = request;
        self.predict_one_within(image.into_inner(), backend, top_k)
            .await
    }

    /// Entry point for a decoded batch request. Item failures land in their own slot.
    pub async fn handle_batch(
        self: &Arc<Self>,
        request: BatchPredictRequest,
    ) -> Result<BatchPredictResponse, CropScanError> {
        let BatchPredictRequest {
            images,
            backend,
            top_k,
        } = request;
        let images = images.into_iter().map(|image| image.into_inner()).collect();
        self.predict_batch_within(images, backend, top_k)
            .await
            .map(batch_response)
    }

    async fn within<T, F>(&self, backend: BackendKind, job: F) -> Result<T, CropScanError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CropScanError> + Send + 'static,
    {
        let timeout = self.limits.request_timeout;
        let handle = tokio::task::spawn_blocking(job);
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            // a panic can only come from inside the pipeline, cancellation from the runtime
            Ok(Err(join_error)) if join_error.is_panic() => {
                let error = CropScanError::InferenceError {
                    backend,
                    message: join_error.to_string(),
                };
                tracing::error!(kind = %error.kind(), error = %error, "Prediction panicked");
                Err(error)
            }
            Ok(Err(join_error)) => Err(CropScanError::WorkerPoolError(join_error.to_string())),
            Err(_) => {
                let error = CropScanError::RequestTimeout {
                    millis: timeout.as_millis(),
                };
                tracing::warn!(kind = %error.kind(), error = %error, "Request abandoned");
                Err(error)
            }
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            models_ready: self.context.registry.models_ready(),
            num_classes: self
                .context
                .registry
                .class_labels()
                .map_or(0, |labels| labels.len()),
        }
    }

    pub fn model_info(&self) -> ModelInfoResponse {
        let class_labels = self.context.registry.class_labels().unwrap_or_default();
        ModelInfoResponse {
            num_classes: class_labels.len(),
            class_labels,
            backends: self.context.registry.status(),
        }
    }

    /// Class labels of one backend, or of the first ready one
    pub fn classes(&self, backend: Option<BackendKind>) -> Result<ClassesResponse, CropScanError> {
        let classes = match backend {
            Some(kind) => self.context.registry.backend(kind)?.labels().to_vec(),
            None => self
                .context
                .registry
                .class_labels()
                .ok_or(CropScanError::ModelNotReady {
                    backend: BackendKind::default(),
                })?,
        };
        Ok(ClassesResponse {
            num_classes: classes.len(),
            classes,
        })
    }
}

pub fn batch_response(results: Vec<BatchItemResult>) -> BatchPredictResponse {
    BatchPredictResponse::new(
        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(response) => BatchItemResponse {
                    index,
                    success: true,
                    result: Some(response),
                    error: None,
                },
                Err(error) => BatchItemResponse {
                    index,
                    success: false,
                    result: None,
                    error: Some(error.descriptor()),
                },
            })
            .collect(),
    )
}
