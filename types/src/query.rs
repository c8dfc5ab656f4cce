use crate::DEFAULT_TOP_K;
use crate::backend::BackendKind;
use crate::image::EncodedImage;
use serde::{Deserialize, Serialize};

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Classify a single image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    pub image: EncodedImage,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Classify several images independently
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictRequest {
    pub images: Vec<EncodedImage>,
    #[serde(default)]
    pub backend: BackendKind,
    /// Per item top-k, a single candidate when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}
