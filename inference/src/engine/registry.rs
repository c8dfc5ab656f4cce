use crate::engine::backends::{BackendLoader, InferenceBackend, ModelSource};
use crate::engine::normalizer::InputSpec;
use crate::engine::ranker::softmax;
use crate::error::CropScanError;
use cropscan_types::backend::{BackendKind, OutputActivation, PixelScaling};
use cropscan_types::server::{BackendInfo, ModelsReady};
use ndarray::{ArrayView, Ix4};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use strum::IntoEnumIterator;

/// Answers which class labels have no reference record
pub trait LabelCoverage: Send + Sync {
    fn missing_labels(&self, labels: &[String]) -> Vec<String>;
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Reads the class label file shipped with a model artifact
pub fn read_labels(kind: BackendKind, path: &Path) -> Result<Vec<String>, CropScanError> {
    let load_error = |message: String| CropScanError::ModelLoadError {
        backend: kind,
        message,
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| load_error(format!("failed to read labels {}: {e}", path.display())))?;
    let labels: Vec<String> = serde_json::from_str(&raw)
        .map_err(|e| load_error(format!("labels {} are not a JSON array: {e}", path.display())))?;
    check_labels(kind, &labels)?;
    Ok(labels)
}

fn check_labels(kind: BackendKind, labels: &[String]) -> Result<(), CropScanError> {
    let load_error = |message: String| CropScanError::ModelLoadError {
        backend: kind,
        message,
    };
    if labels.is_empty() {
        return Err(load_error("class label list is empty".to_string()));
    }
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if label.trim().is_empty() {
            return Err(load_error("class label list contains a blank label".to_string()));
        }
        if !seen.insert(label.as_str()) {
            return Err(load_error(format!("class label [{label}] appears twice")));
        }
    }
    Ok(())
}

/// A ready backend together with the artifacts that were loaded alongside it.
///
/// Requests hold an `Arc` to one of these for their whole lifetime so a concurrent reload
/// never mixes the labels or input spec of one version with the weights of another.
#[derive(Debug)]
pub struct LoadedBackend {
    kind: BackendKind,
    backend: Box<dyn InferenceBackend>,
    labels: Vec<String>,
    spec: InputSpec,
    activation: OutputActivation,
    artifact: Option<String>,
    loaded_at: u64,
}

impl LoadedBackend {
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn input_spec(&self) -> &InputSpec {
        &self.spec
    }

    /// Forward pass returning probabilities in class index order
    pub fn infer(&self, input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, CropScanError> {
        let expected = self.spec.shape.dims();
        if input.shape() != expected {
            return Err(CropScanError::TensorShapeMismatch {
                expected: expected.to_vec(),
                actual: input.shape().to_vec(),
            });
        }
        let scores = self.backend.infer(input)?;
        if scores.len() != self.labels.len() {
            return Err(CropScanError::OutputWidthMismatch {
                backend: self.kind,
                expected: self.labels.len(),
                actual: scores.len(),
            });
        }
        Ok(match self.activation {
            OutputActivation::Probabilities => scores,
            OutputActivation::Logits => softmax(&scores),
        })
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            backend: self.kind,
            ready: true,
            artifact: self.artifact.clone(),
            input: Some(self.spec.shape),
            scaling: Some(self.spec.scaling),
            activation: Some(self.activation),
            num_classes: self.labels.len(),
            loaded_at: Some(self.loaded_at),
            last_error: None,
        }
    }
}

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    NotLoaded,
    Ready(Arc<LoadedBackend>),
    Failed {
        error: CropScanError,
        artifact: Option<String>,
    },
}

#[derive(Debug, Default)]
struct Slot {
    state: RwLock<SlotState>,
    // serialises loads of the same slot; never held by inference
    load_gate: Mutex<()>,
}

/// Owns the `full` and `optimized` backend slots
pub struct ModelRegistry {
    full: Slot,
    optimized: Slot,
    loader: Box<dyn BackendLoader>,
    coverage: Option<Arc<dyn LabelCoverage>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("full", &self.full)
            .field("optimized", &self.optimized)
            .finish()
    }
}

impl ModelRegistry {
    pub fn new(loader: impl BackendLoader + 'static) -> Self {
        Self {
            full: Slot::default(),
            optimized: Slot::default(),
            loader: Box::new(loader),
            coverage: None,
        }
    }

    /// Every load is checked against `coverage` before the slot becomes ready
    pub fn with_coverage(mut self, coverage: Arc<dyn LabelCoverage>) -> Self {
        self.coverage = Some(coverage);
        self
    }

    fn slot(&self, kind: BackendKind) -> &Slot {
        match kind {
            BackendKind::Full => &self.full,
            BackendKind::Optimized => &self.optimized,
        }
    }

    /// Loads an artifact into a slot.
    ///
    /// The new backend is fully built and validated before it replaces the previous one, so
    /// inference running concurrently only ever observes a complete model. A failure leaves the
    /// slot not ready and is reported through `status`.
    #[tracing::instrument(skip(self, source), fields(artifact = %source.model_path.display()))]
    pub fn load(&self, kind: BackendKind, source: &ModelSource) -> Result<(), CropScanError> {
        let slot = self.slot(kind);
        let _gate = slot.load_gate.lock();
        let artifact = Some(source.model_path.display().to_string());
        let built = read_labels(kind, &source.labels_path).and_then(|labels| {
            let backend = self.loader.load(kind, source)?;
            self.prepare(
                kind,
                backend,
                labels,
                source.scaling,
                source.activation,
                artifact.clone(),
            )
        });
        self.commit(kind, built, artifact)
    }

    /// Places an already constructed backend into a slot, applying the same checks as `load`
    pub fn install(
        &self,
        kind: BackendKind,
        backend: Box<dyn InferenceBackend>,
        labels: Vec<String>,
        scaling: PixelScaling,
        activation: OutputActivation,
    ) -> Result<(), CropScanError> {
        let slot = self.slot(kind);
        let _gate = slot.load_gate.lock();
        let built = check_labels(kind, &labels)
            .and_then(|_| self.prepare(kind, backend, labels, scaling, activation, None));
        self.commit(kind, built, None)
    }

    fn prepare(
        &self,
        kind: BackendKind,
        backend: Box<dyn InferenceBackend>,
        labels: Vec<String>,
        scaling: PixelScaling,
        activation: OutputActivation,
        artifact: Option<String>,
    ) -> Result<LoadedBackend, CropScanError> {
        if let Some(width) = backend.output_width() {
            if width != labels.len() {
                return Err(CropScanError::ModelLoadError {
                    backend: kind,
                    message: format!(
                        "model outputs {width} scores but {} class labels were supplied",
                        labels.len()
                    ),
                });
            }
        }
        if let Some(coverage) = &self.coverage {
            let missing = coverage.missing_labels(&labels);
            if !missing.is_empty() {
                return Err(CropScanError::LabelsWithoutRecords {
                    backend: kind,
                    missing,
                });
            }
        }
        let shape = backend.input_shape();
        Ok(LoadedBackend {
            kind,
            backend,
            labels,
            spec: InputSpec { shape, scaling },
            activation,
            artifact,
            loaded_at: unix_now(),
        })
    }

    fn commit(
        &self,
        kind: BackendKind,
        built: Result<LoadedBackend, CropScanError>,
        artifact: Option<String>,
    ) -> Result<(), CropScanError> {
        let mut state = self.slot(kind).state.write();
        match built {
            Ok(loaded) => {
                tracing::info!(
                    backend = %kind,
                    num_classes = loaded.labels.len(),
                    "Backend ready"
                );
                *state = SlotState::Ready(Arc::new(loaded));
                Ok(())
            }
            Err(error) => {
                tracing::error!(
                    backend = %kind,
                    kind = %error.kind(),
                    error = %error,
                    artifact = artifact.as_deref().unwrap_or("<in memory>"),
                    "Backend failed to load"
                );
                *state = SlotState::Failed {
                    error: error.clone(),
                    artifact,
                };
                Err(error)
            }
        }
    }

    /// Returns a slot to not ready. In-flight requests finish on the backend they already hold.
    pub fn unload(&self, kind: BackendKind) {
        let slot = self.slot(kind);
        let _gate = slot.load_gate.lock();
        *slot.state.write() = SlotState::NotLoaded;
        tracing::info!(backend = %kind, "Backend unloaded");
    }

    /// Readiness gate. The returned handle stays valid across later reloads.
    pub fn backend(&self, kind: BackendKind) -> Result<Arc<LoadedBackend>, CropScanError> {
        match &*self.slot(kind).state.read() {
            SlotState::Ready(loaded) => Ok(Arc::clone(loaded)),
            SlotState::NotLoaded | SlotState::Failed { .. } => {
                Err(CropScanError::ModelNotReady { backend: kind })
            }
        }
    }

    pub fn infer(
        &self,
        kind: BackendKind,
        input: ArrayView<f32, Ix4>,
    ) -> Result<Vec<f32>, CropScanError> {
        self.backend(kind)?.infer(input)
    }

    pub fn is_ready(&self, kind: BackendKind) -> bool {
        matches!(&*self.slot(kind).state.read(), SlotState::Ready(_))
    }

    pub fn models_ready(&self) -> ModelsReady {
        ModelsReady {
            full: self.is_ready(BackendKind::Full),
            optimized: self.is_ready(BackendKind::Optimized),
        }
    }

    /// Labels of the first ready slot, `full` first
    pub fn class_labels(&self) -> Option<Vec<String>> {
        BackendKind::iter()
            .find_map(|kind| self.backend(kind).ok())
            .map(|loaded| loaded.labels.clone())
    }

    pub fn status(&self) -> Vec<BackendInfo> {
        BackendKind::iter()
            .map(|kind| match &*self.slot(kind).state.read() {
                SlotState::Ready(loaded) => loaded.info(),
                SlotState::NotLoaded => BackendInfo {
                    backend: kind,
                    ready: false,
                    artifact: None,
                    input: None,
                    scaling: None,
                    activation: None,
                    num_classes: 0,
                    loaded_at: None,
                    last_error: None,
                },
                SlotState::Failed { error, artifact } => BackendInfo {
                    backend: kind,
                    ready: false,
                    artifact: artifact.clone(),
                    input: None,
                    scaling: None,
                    activation: None,
                    num_classes: 0,
                    loaded_at: None,
                    last_error: Some(error.to_string()),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::{FakeBackend, FakeLoader};
    use crate::tests::fixtures;
    use pretty_assertions::assert_eq;

    fn labels(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("Crop_disease_{i}")).collect()
    }

    struct NoRecords;

    impl LabelCoverage for NoRecords {
        fn missing_labels(&self, labels: &[String]) -> Vec<String> {
            labels.to_vec()
        }
    }

    #[test]
    fn slots_start_not_ready() {
        let registry = ModelRegistry::new(FakeLoader::default());
        assert_eq!(registry.models_ready(), ModelsReady::default());
        let err = registry
            .infer(
                BackendKind::Full,
                ndarray::Array4::zeros((1, 4, 4, 3)).view(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            CropScanError::ModelNotReady {
                backend: BackendKind::Full
            }
        );
    }

    #[test]
    fn load_reads_labels_and_marks_slot_ready() {
        let dir = tempfile::tempdir().unwrap();
        let source = fixtures::model_source(dir.path(), &labels(3));
        let registry = ModelRegistry::new(FakeLoader::with_output(vec![0.2, 0.5, 0.3]));
        registry.load(BackendKind::Optimized, &source).unwrap();

        assert_eq!(
            registry.models_ready(),
            ModelsReady {
                full: false,
                optimized: true
            }
        );
        let status = registry.status();
        assert_eq!(status[1].num_classes, 3);
        assert!(status[1].loaded_at.is_some());
        assert_eq!(registry.class_labels(), Some(labels(3)));
    }

    #[test]
    fn failed_load_leaves_other_slot_usable() {
        let dir = tempfile::tempdir().unwrap();
        let good = fixtures::model_source(dir.path(), &labels(2));
        let mut bad = good.clone();
        bad.labels_path = dir.path().join("missing.json");

        let registry = ModelRegistry::new(FakeLoader::with_output(vec![0.4, 0.6]));
        registry.load(BackendKind::Full, &good).unwrap();
        let err = registry.load(BackendKind::Optimized, &bad).unwrap_err();

        assert_eq!(err.kind(), cropscan_types::server::ErrorKind::ModelLoad);
        assert!(registry.is_ready(BackendKind::Full));
        assert!(!registry.is_ready(BackendKind::Optimized));
        assert!(registry.status()[1].last_error.is_some());
    }

    #[test]
    fn failed_load_reports_the_broken_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = fixtures::model_source(dir.path(), &labels(3));

        let registry = ModelRegistry::new(FakeLoader::with_output(vec![0.5, 0.5]));
        let err = registry.load(BackendKind::Optimized, &source).unwrap_err();

        let status = &registry.status()[1];
        assert_eq!(status.backend, BackendKind::Optimized);
        assert!(!status.ready);
        assert_eq!(
            status.artifact,
            Some(source.model_path.display().to_string())
        );
        assert_eq!(status.last_error, Some(err.to_string()));
    }

    #[test]
    fn label_file_problems_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(FakeLoader::with_output(vec![1.0]));
        for bad in [vec![], vec!["a".to_string(), "a".to_string()]] {
            let source = fixtures::model_source(dir.path(), &bad);
            assert!(matches!(
                registry.load(BackendKind::Full, &source),
                Err(CropScanError::ModelLoadError { .. })
            ));
        }
    }

    #[test]
    fn output_width_must_match_labels() {
        let registry = ModelRegistry::new(FakeLoader::default());
        let err = registry
            .install(
                BackendKind::Full,
                Box::new(FakeBackend::new(vec![0.5, 0.5])),
                labels(3),
                PixelScaling::ZeroToOne,
                OutputActivation::Probabilities,
            )
            .unwrap_err();
        assert!(matches!(err, CropScanError::ModelLoadError { .. }));
    }

    #[test]
    fn coverage_gap_is_loud_at_load_time() {
        let registry = ModelRegistry::new(FakeLoader::default()).with_coverage(Arc::new(NoRecords));
        let err = registry
            .install(
                BackendKind::Full,
                Box::new(FakeBackend::new(vec![0.5, 0.5])),
                labels(2),
                PixelScaling::ZeroToOne,
                OutputActivation::Probabilities,
            )
            .unwrap_err();
        assert_eq!(
            err,
            CropScanError::LabelsWithoutRecords {
                backend: BackendKind::Full,
                missing: labels(2),
            }
        );
        assert!(!registry.is_ready(BackendKind::Full));
    }

    #[test]
    fn logits_are_turned_into_probabilities() {
        let registry = ModelRegistry::new(FakeLoader::default());
        registry
            .install(
                BackendKind::Full,
                Box::new(FakeBackend::new(vec![2.0, 2.0])),
                labels(2),
                PixelScaling::ZeroToOne,
                OutputActivation::Logits,
            )
            .unwrap();
        let shape = registry.backend(BackendKind::Full).unwrap().input_spec().shape;
        let input = ndarray::Array4::zeros(shape.dims());
        assert_eq!(
            registry.infer(BackendKind::Full, input.view()).unwrap(),
            vec![0.5, 0.5]
        );
    }

    #[test]
    fn wrong_tensor_shape_is_an_inference_error() {
        let registry = ModelRegistry::new(FakeLoader::default());
        registry
            .install(
                BackendKind::Full,
                Box::new(FakeBackend::new(vec![1.0])),
                labels(1),
                PixelScaling::ZeroToOne,
                OutputActivation::Probabilities,
            )
            .unwrap();
        let err = registry
            .infer(BackendKind::Full, ndarray::Array4::zeros((1, 3, 3, 3)).view())
            .unwrap_err();
        assert_eq!(err.kind(), cropscan_types::server::ErrorKind::Inference);
    }

    #[test]
    fn unload_returns_slot_to_not_ready() {
        let registry = ModelRegistry::new(FakeLoader::default());
        registry
            .install(
                BackendKind::Optimized,
                Box::new(FakeBackend::new(vec![1.0])),
                labels(1),
                PixelScaling::ZeroToOne,
                OutputActivation::Probabilities,
            )
            .unwrap();
        let held = registry.backend(BackendKind::Optimized).unwrap();
        registry.unload(BackendKind::Optimized);
        assert!(!registry.is_ready(BackendKind::Optimized));
        assert_eq!(held.labels(), labels(1).as_slice());
    }
}
