//! Brightness, contrast and histogram clipping.

use super::finite;
use crate::config::QualityConfig;
use crate::error::MetricError;
use image::GrayImage;
use serde::Serialize;

/// Histogram bins holding less than this share are ignored for dynamic range.
const RANGE_BIN_FLOOR: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExposureMetrics {
    pub mean_brightness: f64,
    /// Standard deviation of grey levels.
    pub contrast: f64,
    /// Occupied span of the histogram over 255.
    pub dynamic_range: f64,
    pub dark_ratio: f64,
    pub bright_ratio: f64,
    pub is_well_exposed: bool,
    pub has_contrast: bool,
    pub is_clipped: bool,
}

impl ExposureMetrics {
    pub fn fallback() -> Self {
        Self {
            mean_brightness: 0.0,
            contrast: 0.0,
            dynamic_range: 0.0,
            dark_ratio: 1.0,
            bright_ratio: 0.0,
            is_well_exposed: false,
            has_contrast: false,
            is_clipped: true,
        }
    }
}

pub fn measure(gray: &GrayImage, config: &QualityConfig) -> Result<ExposureMetrics, MetricError> {
    let total = gray.as_raw().len();
    if total == 0 {
        return Err(MetricError::TooSmall {
            metric: "exposure",
            width: gray.width(),
            height: gray.height(),
        });
    }

    let mut hist = [0u64; 256];
    for &v in gray.as_raw() {
        hist[v as usize] += 1;
    }
    let n = total as f64;

    let mean = hist
        .iter()
        .enumerate()
        .map(|(level, &c)| level as f64 * c as f64)
        .sum::<f64>()
        / n;
    let variance = hist
        .iter()
        .enumerate()
        .map(|(level, &c)| (level as f64 - mean).powi(2) * c as f64)
        .sum::<f64>()
        / n;
    let mean_brightness = finite("brightness", mean)?;
    let contrast = finite("contrast", variance.sqrt())?;

    let dark_ratio = hist[..config.dark_level as usize].iter().sum::<u64>() as f64 / n;
    let bright_ratio = hist[config.bright_level as usize..].iter().sum::<u64>() as f64 / n;
    let is_clipped = dark_ratio > config.clip_ratio || bright_ratio > config.clip_ratio;

    let occupied: Vec<usize> = hist
        .iter()
        .enumerate()
        .filter(|(_, c)| **c as f64 / n > RANGE_BIN_FLOOR)
        .map(|(level, _)| level)
        .collect();
    let dynamic_range = match (occupied.first(), occupied.last()) {
        (Some(lo), Some(hi)) if occupied.len() > 1 => (hi - lo) as f64 / 255.0,
        _ => 0.0,
    };

    Ok(ExposureMetrics {
        mean_brightness,
        contrast,
        dynamic_range,
        dark_ratio,
        bright_ratio,
        is_well_exposed: config.min_brightness < mean_brightness
            && mean_brightness < config.max_brightness
            && !is_clipped,
        has_contrast: contrast > config.min_contrast,
        is_clipped,
    })
}
