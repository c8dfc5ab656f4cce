use crate::error::CropScanError;
use image::DynamicImage;
use ndarray::{Array, Ix4};

pub mod rescale;
pub mod resize;
pub mod to_ndarray;

pub trait Preprocessor: Send + Sync {
    fn process(&self, data: PreprocessorData) -> Result<PreprocessorData, CropScanError>;
}

pub enum PreprocessorData {
    Image(DynamicImage),
    NdArray(Array<f32, Ix4>),
}

impl PreprocessorData {
    fn variant_name(&self) -> &'static str {
        match self {
            PreprocessorData::Image(_) => "Image",
            PreprocessorData::NdArray(_) => "NdArray",
        }
    }
}
