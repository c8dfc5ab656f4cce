use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// One of the two interchangeable inference engines a request can be routed to.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BackendKind {
    /// Full precision model
    #[default]
    Full,
    /// Size and latency optimized variant of the same model
    Optimized,
}

/// Numeric range pixel values are mapped into before inference.
///
/// This is a property of how a particular model was trained and therefore tracked per backend.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PixelScaling {
    /// `value / 255`
    #[default]
    ZeroToOne,
    /// `value / 127.5 - 1`
    MinusOneToOne,
    /// untouched 0..=255, for graphs that rescale internally
    Raw,
}

impl PixelScaling {
    /// Returns the `(scale, offset)` pair such that `scaled = raw * scale + offset`
    pub fn coefficients(&self) -> (f32, f32) {
        match self {
            PixelScaling::ZeroToOne => (1.0 / 255.0, 0.0),
            PixelScaling::MinusOneToOne => (1.0 / 127.5, -1.0),
            PixelScaling::Raw => (1.0, 0.0),
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TensorLayout {
    /// batch, height, width, channels
    NHWC,
    /// batch, channels, height, width
    NCHW,
}

/// What the final layer of a model emits
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutputActivation {
    #[default]
    Probabilities,
    Logits,
}

/// Exact input a backend requires
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub layout: TensorLayout,
}

impl InputShape {
    /// Shape of a single-image batch in the order the model expects
    pub fn dims(&self) -> [usize; 4] {
        let (w, h, c) = (
            self.width as usize,
            self.height as usize,
            self.channels as usize,
        );
        match self.layout {
            TensorLayout::NHWC => [1, h, w, c],
            TensorLayout::NCHW => [1, c, h, w],
        }
    }
}
