use crate::engine::processors::{Preprocessor, PreprocessorData};
use crate::error::CropScanError;
use cropscan_types::backend::PixelScaling;

/// Affine pixel mapping, `raw * scale + offset`
pub struct Rescale {
    scale: f32,
    offset: f32,
}

impl From<PixelScaling> for Rescale {
    fn from(scaling: PixelScaling) -> Self {
        let (scale, offset) = scaling.coefficients();
        Self { scale, offset }
    }
}

impl Preprocessor for Rescale {
    #[tracing::instrument(skip_all)]
    fn process(&self, data: PreprocessorData) -> Result<PreprocessorData, CropScanError> {
        match data {
            PreprocessorData::NdArray(mut array) => {
                let (scale, offset) = (self.scale, self.offset);
                array.mapv_inplace(|v| v * scale + offset);
                Ok(PreprocessorData::NdArray(array))
            }
            other => Err(CropScanError::PreprocessingError(format!(
                "Rescale process failed. Expected NdArray, got {}",
                other.variant_name()
            ))),
        }
    }
}
