//! Edge density and coherence.
//!
//! Edges are Sobel magnitudes above a threshold, at a tight and a loose
//! level. Coherence is the 5x5-dilated edge area over the raw edge count: it
//! separates scattered natural detail from edges packed into strokes, and
//! together with a high density flags text or infographics.

use super::{Pixels, edge_density_in, edge_map, finite, require_size};
use crate::config::QualityConfig;
use crate::error::MetricError;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeMetrics {
    pub density: f64,
    pub density_loose: f64,
    pub coherence: f64,
    pub is_complex: bool,
    pub is_likely_text: bool,
    /// `density / edge_density_full_score`, capped at 1.
    pub score: f64,
}

impl EdgeMetrics {
    pub fn fallback() -> Self {
        Self {
            density: 0.0,
            density_loose: 0.0,
            coherence: 0.0,
            is_complex: false,
            is_likely_text: false,
            score: 0.0,
        }
    }
}

pub fn measure(pixels: &Pixels, config: &QualityConfig) -> Result<EdgeMetrics, MetricError> {
    let (w, h) = pixels.dimensions();
    require_size("edges", w, h, 3)?;

    let density = edge_density_in(&pixels.gradient, config.edge_threshold, 0, 0, w, h);
    let density_loose = edge_density_in(&pixels.gradient, config.edge_threshold_loose, 0, 0, w, h);

    let edges = edge_map(&pixels.gradient, config.edge_threshold);
    let edge_count = edges.pixels().filter(|p| p[0] > 0).count();
    let dilated = dilate(&edges, Norm::LInf, 2);
    let dilated_count = dilated.pixels().filter(|p| p[0] > 0).count();
    let coherence = finite("edge_coherence", dilated_count as f64 / (edge_count as f64 + 1.0))?;

    Ok(EdgeMetrics {
        density,
        density_loose,
        coherence,
        is_complex: density > config.min_edge_density,
        is_likely_text: coherence > config.text_coherence && density > config.text_min_density,
        score: (density / config.edge_density_full_score).min(1.0),
    })
}
