use crate::engine::processors::{Preprocessor, PreprocessorData};
use crate::error::CropScanError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};

/// Resizes to an exact target, ignoring aspect ratio
pub struct Resize {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: FilterType::Lanczos3,
        }
    }
}

impl Preprocessor for Resize {
    #[tracing::instrument(skip_all)]
    fn process(&self, data: PreprocessorData) -> Result<PreprocessorData, CropScanError> {
        match data {
            PreprocessorData::Image(image) => {
                if image.dimensions() == (self.width, self.height) {
                    return Ok(PreprocessorData::Image(image));
                }
                let resized = match image {
                    DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(imageops::resize(
                        &gray,
                        self.width,
                        self.height,
                        self.filter,
                    )),
                    other => DynamicImage::ImageRgb8(imageops::resize(
                        &other.to_rgb8(),
                        self.width,
                        self.height,
                        self.filter,
                    )),
                };
                Ok(PreprocessorData::Image(resized))
            }
            other => Err(CropScanError::PreprocessingError(format!(
                "Resize failed. Expected Image, got {}",
                other.variant_name()
            ))),
        }
    }
}
