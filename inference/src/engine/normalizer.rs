use crate::engine::processors::rescale::Rescale;
use crate::engine::processors::resize::Resize;
use crate::engine::processors::to_ndarray::ImageToNdArray;
use crate::engine::processors::{Preprocessor, PreprocessorData};
use crate::error::CropScanError;
use cropscan_types::backend::{InputShape, PixelScaling};
use image::{DynamicImage, GenericImageView, ImageFormat};
use ndarray::{Array, Ix4};
use serde::Serialize;

/// What a backend needs its input tensor to look like
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputSpec {
    pub shape: InputShape,
    pub scaling: PixelScaling,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub format: String,
    pub color_type: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

pub(crate) fn format_name(format: ImageFormat) -> String {
    format
        .extensions_str()
        .first()
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| format!("{format:?}").to_lowercase())
}

/// Parses format names such as `jpeg`, `jpg` or `png`
pub fn parse_formats<S: AsRef<str>>(names: &[S]) -> Result<Vec<ImageFormat>, CropScanError> {
    names
        .iter()
        .map(|name| {
            ImageFormat::from_extension(name.as_ref().trim().to_lowercase()).ok_or_else(|| {
                CropScanError::InvalidConfig(format!(
                    "unknown image format [{}]",
                    name.as_ref()
                ))
            })
        })
        .collect()
}

/// Turns encoded image bytes into model ready tensors.
///
/// Holds no per call state, so a single instance is shared by every request.
#[derive(Clone, Debug)]
pub struct ImageNormalizer {
    max_payload_bytes: usize,
    allowed_formats: Vec<ImageFormat>,
}

impl ImageNormalizer {
    pub fn new(max_payload_bytes: usize, allowed_formats: Vec<ImageFormat>) -> Self {
        Self {
            max_payload_bytes,
            allowed_formats,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Cheap checks that need no decoding. Runs before any model is touched.
    pub fn validate_payload(&self, bytes: &[u8]) -> Result<ImageFormat, CropScanError> {
        if bytes.is_empty() {
            return Err(CropScanError::EmptyImagePayload);
        }
        if bytes.len() > self.max_payload_bytes {
            return Err(CropScanError::ImageTooLarge {
                size: bytes.len(),
                max: self.max_payload_bytes,
            });
        }
        let format = image::guess_format(bytes)
            .map_err(|e| CropScanError::ImageBytesDecodeError(e.to_string()))?;
        if !self.allowed_formats.contains(&format) {
            return Err(CropScanError::ImageFormatNotAllowed(format_name(format)));
        }
        Ok(format)
    }

    fn decode_with_format(
        &self,
        bytes: &[u8],
    ) -> Result<(ImageFormat, DynamicImage), CropScanError> {
        let format = self.validate_payload(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| CropScanError::ImageBytesDecodeError(e.to_string()))?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CropScanError::ImageNonzeroDimensionError { width, height });
        }
        Ok((format, image))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CropScanError> {
        self.decode_with_format(bytes).map(|(_, image)| image)
    }

    #[tracing::instrument(skip_all, fields(size = bytes.len()))]
    pub fn normalize(
        &self,
        bytes: &[u8],
        spec: &InputSpec,
    ) -> Result<Array<f32, Ix4>, CropScanError> {
        let image = self.decode(bytes)?;

        let mut data = PreprocessorData::Image(image);
        data = Resize::new(spec.shape.width, spec.shape.height).process(data)?;
        data = ImageToNdArray::new(spec.shape).process(data)?;
        data = Rescale::from(spec.scaling).process(data)?;

        match data {
            PreprocessorData::NdArray(array) => Ok(array),
            _ => Err(CropScanError::PreprocessingError(
                "Expected NdArray after processing".to_string(),
            )),
        }
    }

    pub fn image_info(&self, bytes: &[u8]) -> Result<ImageInfo, CropScanError> {
        let (format, image) = self.decode_with_format(bytes)?;
        let (width, height) = image.dimensions();
        Ok(ImageInfo {
            format: format_name(format),
            color_type: format!("{:?}", image.color()),
            width,
            height,
            size_bytes: bytes.len(),
        })
    }
}
