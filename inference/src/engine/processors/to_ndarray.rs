use crate::engine::processors::{Preprocessor, PreprocessorData};
use crate::error::CropScanError;
use cropscan_types::backend::{InputShape, TensorLayout};
use image::GenericImageView;
use ndarray::Array4;

/// Lays out raw 0..=255 channel values as a single-image batch
pub struct ImageToNdArray {
    shape: InputShape,
}

impl ImageToNdArray {
    pub fn new(shape: InputShape) -> Self {
        Self { shape }
    }
}

impl Preprocessor for ImageToNdArray {
    #[tracing::instrument(skip_all)]
    fn process(&self, data: PreprocessorData) -> Result<PreprocessorData, CropScanError> {
        let image = match data {
            PreprocessorData::Image(image) => image,
            other => {
                return Err(CropScanError::PreprocessingError(format!(
                    "ImageToNdArray failed. Expected Image, got {}",
                    other.variant_name()
                )));
            }
        };
        let (width, height) = image.dimensions();
        if (width, height) != (self.shape.width, self.shape.height) {
            return Err(CropScanError::TensorShapeMismatch {
                expected: self.shape.dims().to_vec(),
                actual: vec![1, height as usize, width as usize],
            });
        }
        let (w, h) = (width as usize, height as usize);
        let layout = self.shape.layout;
        let array = match self.shape.channels {
            3 => {
                let rgb = image.to_rgb8();
                let dims = self.shape.dims();
                Array4::from_shape_fn((dims[0], dims[1], dims[2], dims[3]), |(_, a, b, c)| {
                    let (y, x, ch) = match layout {
                        TensorLayout::NHWC => (a, b, c),
                        TensorLayout::NCHW => (b, c, a),
                    };
                    f32::from(rgb.get_pixel(x as u32, y as u32)[ch])
                })
            }
            1 => {
                let luma = image.to_luma8();
                let dims = match layout {
                    TensorLayout::NHWC => (1, h, w, 1),
                    TensorLayout::NCHW => (1, 1, h, w),
                };
                Array4::from_shape_fn(dims, |(_, a, b, c)| {
                    let (y, x) = match layout {
                        TensorLayout::NHWC => (a, b),
                        TensorLayout::NCHW => (b, c),
                    };
                    f32::from(luma.get_pixel(x as u32, y as u32)[0])
                })
            }
            channels => return Err(CropScanError::UnsupportedChannelCount { channels }),
        };
        Ok(PreprocessorData::NdArray(array))
    }
}
