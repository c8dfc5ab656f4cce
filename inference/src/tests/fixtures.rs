use crate::engine::backends::ModelSource;
use crate::engine::knowledge::KnowledgeBase;
use cropscan_types::backend::{OutputActivation, PixelScaling};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use once_cell::sync::Lazy;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Bundled knowledge base, parsed once per test binary
pub(crate) static KNOWLEDGE: Lazy<Arc<KnowledgeBase>> = Lazy::new(|| {
    Arc::new(KnowledgeBase::embedded().expect("embedded knowledge base should parse"))
});

fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, format)
        .expect("fixture image should encode");
    buffer.into_inner()
}

/// Solid colour PNG
pub(crate) fn png_bytes(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    encode(
        RgbImage::from_pixel(width, height, Rgb(colour)),
        ImageFormat::Png,
    )
}

/// JPEG with a deterministic gradient so it does not compress to almost nothing
pub(crate) fn noisy_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 13) % 256) as u8,
            ((x * 31) ^ (y * 17)) as u8,
            ((x + y) * 5 % 256) as u8,
        ])
    });
    encode(image, ImageFormat::Jpeg)
}

pub(crate) fn encoded_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    encode(
        RgbImage::from_pixel(width, height, Rgb([90, 160, 60])),
        format,
    )
}

/// Labels of the bundled PlantVillage model, in class index order
pub(crate) fn plant_village_labels() -> Vec<String> {
    serde_json::from_str(include_str!("../../data/class_labels.json"))
        .expect("bundled class labels should parse")
}

/// Writes `labels` next to a (nonexistent) model artifact inside `dir`
pub(crate) fn model_source(dir: &Path, labels: &[String]) -> ModelSource {
    let labels_path = dir.join("labels.json");
    std::fs::write(
        &labels_path,
        serde_json::to_vec(labels).expect("labels should serialize"),
    )
    .expect("labels file should be writable");
    ModelSource {
        model_path: dir.join("model.onnx"),
        labels_path,
        scaling: PixelScaling::ZeroToOne,
        activation: OutputActivation::Probabilities,
    }
}

/// Probabilities with `peak` at `index` and the remainder spread evenly over the other classes
pub(crate) fn peaked(index: usize, peak: f32, classes: usize) -> Vec<f32> {
    let rest = (1.0 - peak) / (classes - 1) as f32;
    (0..classes)
        .map(|i| if i == index { peak } else { rest })
        .collect()
}
