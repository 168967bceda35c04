//! Normalize a downloaded image for storage: flatten transparency onto
//! white, downscale past the maximum dimension with Lanczos, re-encode JPEG.

use crate::error::ProcessError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use sha2::{Digest, Sha256};

pub const STORED_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Pixels as stored, the input to quality assessment.
    pub image: DynamicImage,
    pub jpeg: Vec<u8>,
    /// Hex SHA-256 of `jpeg`.
    pub sha256: String,
    pub original_width: u32,
    pub original_height: u32,
}

impl ProcessedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub fn process(bytes: &[u8], max_dimension: u32, quality: u8) -> Result<ProcessedImage, ProcessError> {
    let decoded = image::load_from_memory(bytes).map_err(ProcessError::Decode)?;
    let (original_width, original_height) = (decoded.width(), decoded.height());

    let rgb = flatten_onto_white(&decoded);
    let rgb = match fit_within(original_width, original_height, max_dimension) {
        Some((w, h)) => imageops::resize(&rgb, w, h, FilterType::Lanczos3),
        None => rgb,
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(ProcessError::Encode)?;
    let sha256 = hex::encode(Sha256::digest(&jpeg));

    Ok(ProcessedImage {
        image: DynamicImage::ImageRgb8(rgb),
        jpeg,
        sha256,
        original_width,
        original_height,
    })
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let over = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([over(r), over(g), over(b)])
    })
}

/// Target size when the longest side exceeds `max_dimension`.
fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max_dimension || max_dimension == 0 {
        return None;
    }
    let scale = max_dimension as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_dimension);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_dimension);
    Some((w, h))
}
