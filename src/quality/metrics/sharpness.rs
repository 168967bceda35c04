//! Blur detection by three estimators blended together.
//!
//! - Laplacian variance: the binary sharp/blurry gate.
//! - Brenner gradient, mean of `(g[x+2] - g[x])²`: sensitive to motion blur.
//! - Mean Sobel magnitude: low under Gaussian blur.
//!
//! The blended score is `0.5·lap/200 + 0.3·brenner/200 + 0.2·sobel/50`,
//! each term capped at 1.

use super::{Pixels, finite, require_size};
use crate::config::QualityConfig;
use crate::error::MetricError;
use image::GrayImage;
use serde::Serialize;
use std::fmt;

const LAPLACIAN_NORM: f64 = 200.0;
const BRENNER_NORM: f64 = 200.0;
const SOBEL_NORM: f64 = 50.0;

const MOTION_BRENNER_CEILING: f64 = 100.0;
const GAUSSIAN_SOBEL_CEILING: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurType {
    MotionBlur,
    GaussianBlur,
    OutOfFocus,
    Unreadable,
}

impl fmt::Display for BlurType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlurType::MotionBlur => "motion_blur",
            BlurType::GaussianBlur => "gaussian_blur",
            BlurType::OutOfFocus => "out_of_focus",
            BlurType::Unreadable => "unreadable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharpnessMetrics {
    pub laplacian_variance: f64,
    pub brenner: f64,
    pub sobel_mean: f64,
    pub is_sharp: bool,
    /// Blended estimator in `[0, 1]`.
    pub score: f64,
    /// Set only when the image failed the sharpness gate.
    pub blur_type: Option<BlurType>,
}

impl SharpnessMetrics {
    pub fn fallback() -> Self {
        Self {
            laplacian_variance: 0.0,
            brenner: 0.0,
            sobel_mean: 0.0,
            is_sharp: false,
            score: 0.0,
            blur_type: Some(BlurType::Unreadable),
        }
    }
}

pub fn measure(pixels: &Pixels, config: &QualityConfig) -> Result<SharpnessMetrics, MetricError> {
    let (w, h) = pixels.dimensions();
    require_size("sharpness", w, h, 3)?;

    let laplacian_variance = finite("laplacian", laplacian_variance(&pixels.gray))?;
    let brenner = finite("brenner", brenner(&pixels.gray))?;
    let total: u64 = pixels.gradient.pixels().map(|p| p[0] as u64).sum();
    let sobel_mean = finite("sobel", total as f64 / (w as f64 * h as f64))?;

    let is_sharp = laplacian_variance >= config.sharpness_threshold();
    let blur_type = (!is_sharp).then(|| {
        if brenner < MOTION_BRENNER_CEILING {
            BlurType::MotionBlur
        } else if sobel_mean < GAUSSIAN_SOBEL_CEILING {
            BlurType::GaussianBlur
        } else {
            BlurType::OutOfFocus
        }
    });

    let score = (laplacian_variance / LAPLACIAN_NORM).min(1.0) * 0.5
        + (brenner / BRENNER_NORM).min(1.0) * 0.3
        + (sobel_mean / SOBEL_NORM).min(1.0) * 0.2;

    Ok(SharpnessMetrics {
        laplacian_variance,
        brenner,
        sobel_mean,
        is_sharp,
        score,
        blur_type,
    })
}

/// Variance of the 4-neighbour Laplacian over the interior pixels.
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    let (w, h) = (w as usize, h as usize);
    let buf = gray.as_raw();

    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    let mut n = 0u64;
    for y in 1..h - 1 {
        let row = y * w;
        for x in 1..w - 1 {
            let i = row + x;
            let lap = buf[i - w] as i32 + buf[i + w] as i32 + buf[i - 1] as i32 + buf[i + 1] as i32
                - 4 * buf[i] as i32;
            let lap = lap as f64;
            sum += lap;
            sum_sq += lap * lap;
            n += 1;
        }
    }
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

fn brenner(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    let (w, h) = (w as usize, h as usize);
    if w < 3 {
        return 0.0;
    }
    let buf = gray.as_raw();
    let mut acc = 0u64;
    for y in 0..h {
        let row = &buf[y * w..(y + 1) * w];
        for x in 0..w - 2 {
            let d = row[x + 2] as i64 - row[x] as i64;
            acc += (d * d) as u64;
        }
    }
    acc as f64 / (h * (w - 2)) as f64
}
