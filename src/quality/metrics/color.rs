//! Colour-histogram statistics for logo and flat-graphic detection.

use super::finite;
use crate::config::QualityConfig;
use crate::error::MetricError;
use image::RgbImage;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorMetrics {
    /// Distinct RGB triples, saturating at the configured cap.
    pub unique_colors: usize,
    pub dominant_ratio: f64,
    pub top3_ratio: f64,
    /// Histogram entropy normalized by `log2(unique_colors)`.
    pub entropy: f64,
    pub is_diverse: bool,
    pub is_logo_like: bool,
    pub is_solid: bool,
}

impl ColorMetrics {
    pub fn fallback() -> Self {
        Self {
            unique_colors: 0,
            dominant_ratio: 1.0,
            top3_ratio: 1.0,
            entropy: 0.0,
            is_diverse: false,
            is_logo_like: true,
            is_solid: true,
        }
    }

    /// A palette above the cap is photographic by construction.
    fn complex(cap: usize) -> Self {
        Self {
            unique_colors: cap,
            dominant_ratio: 0.0,
            top3_ratio: 0.0,
            entropy: 1.0,
            is_diverse: true,
            is_logo_like: false,
            is_solid: false,
        }
    }
}

pub fn measure(rgb: &RgbImage, config: &QualityConfig) -> Result<ColorMetrics, MetricError> {
    let total = rgb.width() as u64 * rgb.height() as u64;
    if total == 0 {
        return Err(MetricError::TooSmall {
            metric: "color",
            width: rgb.width(),
            height: rgb.height(),
        });
    }

    let Some(histogram) = histogram(rgb, config.color_count_cap) else {
        return Ok(ColorMetrics::complex(config.color_count_cap));
    };

    let mut counts: Vec<u64> = histogram.into_values().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let unique_colors = counts.len();
    let total_f = total as f64;

    let dominant_ratio = counts[0] as f64 / total_f;
    let top3_ratio = if unique_colors >= 3 {
        counts[..3].iter().sum::<u64>() as f64 / total_f
    } else {
        1.0
    };

    let raw_entropy: f64 = counts
        .iter()
        .map(|&c| c as f64 / total_f)
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.log2())
        .sum();
    let max_entropy = if unique_colors > 1 {
        (unique_colors as f64).log2()
    } else {
        1.0
    };
    let entropy = finite("color_entropy", raw_entropy / max_entropy)?;

    let is_logo_like = unique_colors < config.logo_max_colors
        || dominant_ratio > config.logo_dominant_ratio
        || top3_ratio > config.logo_top3_ratio
        || entropy < config.logo_min_entropy;

    Ok(ColorMetrics {
        unique_colors,
        dominant_ratio,
        top3_ratio,
        entropy,
        is_diverse: unique_colors >= config.min_color_diversity,
        is_logo_like,
        is_solid: dominant_ratio > config.solid_dominant_ratio,
    })
}

/// Share of pixels taken by the most common colour. Cheap enough to run on
/// images the scorer rejects for size before the full suite.
pub fn dominant_ratio(rgb: &RgbImage) -> f64 {
    let total = rgb.width() as u64 * rgb.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
    for p in rgb.pixels() {
        *counts.entry(p.0).or_default() += 1;
    }
    counts.values().copied().max().unwrap_or(0) as f64 / total as f64
}

/// Colour histogram, or `None` once more than `cap` distinct colours appear.
fn histogram(rgb: &RgbImage, cap: usize) -> Option<HashMap<[u8; 3], u64>> {
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
    for p in rgb.pixels() {
        *counts.entry(p.0).or_default() += 1;
        if counts.len() > cap {
            return None;
        }
    }
    Some(counts)
}
