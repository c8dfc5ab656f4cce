use crate::backend::{BackendKind, InputShape, OutputActivation, PixelScaling};
use crate::disease::{DiseaseRecord, Severity};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Failure classes a caller can act on
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// malformed, oversized or out of range input
    Validation,
    /// requested backend was never successfully loaded, another backend may work
    ModelNotReady,
    /// backend failed during the forward pass, retrying will not help
    Inference,
    /// artifact missing or corrupt
    ModelLoad,
    /// label has no knowledge base entry
    NotFound,
    Configuration,
    Timeout,
}

impl ErrorKind {
    /// True when the caller is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::Validation)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryPrediction {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    /// Absent for healthy classes
    pub severity: Option<Severity>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativePrediction {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub backend: BackendKind,
    pub primary: PrimaryPrediction,
    pub alternatives: Vec<AlternativePrediction>,
    pub disease_info: DiseaseRecord,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResponse {
    pub index: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PredictResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictResponse {
    pub results: Vec<BatchItemResponse>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchPredictResponse {
    pub fn new(results: Vec<BatchItemResponse>) -> Self {
        let succeeded = results.iter().filter(|item| item.success).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            succeeded,
            failed,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsReady {
    pub full: bool,
    pub optimized: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub models_ready: ModelsReady,
    pub num_classes: usize,
}

/// Reflection over a single backend slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInfo {
    pub backend: BackendKind,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<PixelScaling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<OutputActivation>,
    pub num_classes: usize,
    /// Seconds since the unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfoResponse {
    pub num_classes: usize,
    pub class_labels: Vec<String>,
    pub backends: Vec<BackendInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassesResponse {
    pub classes: Vec<String>,
    pub num_classes: usize,
}
