//! Weighted scoring, tiers and the acceptance decision.
//!
//! The acceptance decision is a conjunction: the score must reach the floor
//! and every hard gate must pass (sharp, not logo-like, not solid, no
//! watermark; in strict mode also not text-like and well exposed). A high
//! score never overrides a failed gate.
//!
//! Findings are reported in a fixed order: too small, blurry, logo-like,
//! solid colour, low complexity, likely text, poor exposure, clipped,
//! watermark. On a rejected image all of them land in `rejection_reasons`;
//! on an accepted one the soft findings are kept as `advisories`, so
//! `rejection_reasons` is empty exactly when the image is acceptable.

use super::metrics::{MetricBundle, MetricSuite, Pixels, StandardMetrics, color};
use crate::config::{QualityConfig, ScoreWeights};
use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Score reported for images below the minimum dimensions.
const TOO_SMALL_SCORE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
    Rejected,
}

impl Tier {
    pub fn from_score(score: f32) -> Self {
        if score >= 75.0 {
            Tier::High
        } else if score >= 50.0 {
            Tier::Medium
        } else if score >= 30.0 {
            Tier::Low
        } else {
            Tier::Rejected
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
            Tier::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub overall_score: f32,
    pub tier: Tier,
    pub rejection_reasons: Vec<String>,
    /// Soft findings on an accepted image.
    pub advisories: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// Absent when the image was rejected before the metric suite ran.
    pub metrics: Option<MetricBundle>,
}

impl QualityVerdict {
    pub fn is_acceptable(&self) -> bool {
        self.rejection_reasons.is_empty()
    }

    pub fn unopenable() -> Self {
        Self {
            overall_score: 0.0,
            tier: Tier::Rejected,
            rejection_reasons: vec!["Cannot open image".to_string()],
            advisories: Vec::new(),
            width: 0,
            height: 0,
            metrics: None,
        }
    }

    fn too_small(width: u32, height: u32, solid: bool) -> Self {
        let mut rejection_reasons = vec![format!("Too small: {width}x{height}")];
        if solid {
            rejection_reasons.push(SOLID_REASON.to_string());
        }
        Self {
            overall_score: TOO_SMALL_SCORE,
            tier: Tier::from_score(TOO_SMALL_SCORE),
            rejection_reasons,
            advisories: Vec::new(),
            width,
            height,
            metrics: None,
        }
    }
}

const SOLID_REASON: &str = "Solid color background";

/// Weighted 0-100 score of a metric bundle.
pub fn overall_score(bundle: &MetricBundle, weights: &ScoreWeights) -> f32 {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let exposure = if bundle.exposure.is_well_exposed && bundle.exposure.has_contrast {
        1.0
    } else {
        0.5
    };

    let score = bundle.sharpness.score.clamp(0.0, 1.0) * weights.sharpness as f64
        + flag(bundle.color.is_diverse) * weights.color_diversity as f64
        + flag(!bundle.color.is_logo_like) * weights.logo_negative as f64
        + bundle.edges.score.clamp(0.0, 1.0) * weights.edge_complexity as f64
        + exposure * weights.exposure as f64
        + flag(!bundle.watermark.has_watermark) * weights.watermark_negative as f64
        + bundle.content.content_score.clamp(0.0, 1.0) * weights.content as f64;

    (score as f32).clamp(0.0, 100.0)
}

/// Turn a metric bundle into a verdict. Pure: the same bundle and
/// configuration always give the same verdict.
pub fn verdict_from_metrics(
    bundle: MetricBundle,
    config: &QualityConfig,
    width: u32,
    height: u32,
) -> QualityVerdict {
    let score = overall_score(&bundle, &config.weights);

    // (reason, is a hard gate)
    let mut findings: Vec<(String, bool)> = Vec::new();
    let s = &bundle.sharpness;
    if !s.is_sharp {
        let kind = s
            .blur_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        findings.push((
            format!("Blurry ({kind}, Laplacian: {:.1})", s.laplacian_variance),
            true,
        ));
    }
    let c = &bundle.color;
    if c.is_logo_like {
        findings.push((
            format!(
                "Likely logo/icon ({} colors, entropy: {:.2})",
                c.unique_colors, c.entropy
            ),
            true,
        ));
    }
    if c.is_solid {
        findings.push((SOLID_REASON.to_string(), true));
    }
    let e = &bundle.edges;
    if !e.is_complex {
        findings.push((format!("Low complexity (edge: {:.2}%)", e.density * 100.0), false));
    }
    if e.is_likely_text {
        findings.push(("Likely text/infographic".to_string(), config.strict));
    }
    let x = &bundle.exposure;
    if !x.is_well_exposed {
        findings.push((
            format!("Poor exposure (brightness: {:.1})", x.mean_brightness),
            config.strict,
        ));
    }
    if x.is_clipped {
        findings.push(("Clipped highlights/shadows".to_string(), false));
    }
    let wm = &bundle.watermark;
    if wm.has_watermark {
        findings.push((
            format!("Watermark detected ({:.0}%)", wm.confidence * 100.0),
            true,
        ));
    }

    let below_floor = score < config.acceptance_floor;
    let rejected = below_floor || findings.iter().any(|(_, hard)| *hard);
    let texts = findings.into_iter().map(|(text, _)| text);

    let (rejection_reasons, advisories) = if rejected {
        let mut reasons: Vec<String> = texts.collect();
        if below_floor {
            reasons.push(format!(
                "Score below acceptance floor ({score:.1} < {:.0})",
                config.acceptance_floor
            ));
        }
        (reasons, Vec::new())
    } else {
        (Vec::new(), texts.collect())
    };

    let tier = Tier::from_score(score);
    QualityVerdict {
        overall_score: score,
        tier,
        rejection_reasons,
        advisories,
        width,
        height,
        metrics: Some(bundle),
    }
}

/// Runs the metric suite over an image and decides whether to keep it.
#[derive(Debug, Clone)]
pub struct QualityScorer<S = StandardMetrics> {
    config: QualityConfig,
    suite: S,
}

impl QualityScorer<StandardMetrics> {
    pub fn new(config: QualityConfig) -> Self {
        Self::with_suite(config, StandardMetrics::new())
    }
}

impl<S: MetricSuite> QualityScorer<S> {
    pub fn with_suite(config: QualityConfig, suite: S) -> Self {
        Self { config, suite }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Decode and assess encoded image bytes.
    pub fn assess_bytes(&self, bytes: &[u8]) -> QualityVerdict {
        match image::load_from_memory(bytes) {
            Ok(image) => self.assess(&image),
            Err(e) => {
                info!(error = %e, "Image rejected: cannot open");
                QualityVerdict::unopenable()
            }
        }
    }

    /// Assess a decoded image.
    ///
    /// Images under the minimum dimensions are rejected without running the
    /// metric suite; a single-pass fill probe still reports solid fills.
    pub fn assess(&self, image: &DynamicImage) -> QualityVerdict {
        let (width, height) = (image.width(), image.height());

        if width < self.config.min_width || height < self.config.min_height {
            let solid = color::dominant_ratio(&image.to_rgb8()) > self.config.solid_dominant_ratio;
            let verdict = QualityVerdict::too_small(width, height, solid);
            info!(
                width,
                height,
                reasons = %verdict.rejection_reasons.join("; "),
                "Image rejected"
            );
            return verdict;
        }

        let pixels = Pixels::new(image);
        let bundle = self.suite.measure(&pixels, &self.config);
        debug!(?bundle, "Computed image metrics");
        let verdict = verdict_from_metrics(bundle, &self.config, width, height);

        if verdict.is_acceptable() {
            info!(
                score = verdict.overall_score,
                tier = %verdict.tier,
                advisories = %verdict.advisories.join("; "),
                "Image accepted"
            );
        } else {
            info!(
                score = verdict.overall_score,
                tier = %verdict.tier,
                reasons = %verdict.rejection_reasons.join("; "),
                "Image rejected"
            );
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::metrics::{
        BlurType, ColorMetrics, ContentMetrics, EdgeMetrics, ExposureMetrics, SharpnessMetrics,
        WatermarkMetrics, fixtures,
    };
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSuite {
        calls: AtomicUsize,
        inner: StandardMetrics,
    }

    impl MetricSuite for CountingSuite {
        fn measure(&self, pixels: &Pixels, config: &QualityConfig) -> MetricBundle {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.measure(pixels, config)
        }
    }

    fn counting_scorer() -> QualityScorer<CountingSuite> {
        QualityScorer::with_suite(QualityConfig::default(), CountingSuite::default())
    }

    fn clean_bundle() -> MetricBundle {
        MetricBundle {
            sharpness: SharpnessMetrics {
                laplacian_variance: 900.0,
                brenner: 800.0,
                sobel_mean: 60.0,
                is_sharp: true,
                score: 1.0,
                blur_type: None,
            },
            color: ColorMetrics {
                unique_colors: 50_000,
                dominant_ratio: 0.01,
                top3_ratio: 0.02,
                entropy: 0.9,
                is_diverse: true,
                is_logo_like: false,
                is_solid: false,
            },
            edges: EdgeMetrics {
                density: 0.2,
                density_loose: 0.3,
                coherence: 2.0,
                is_complex: true,
                is_likely_text: false,
                score: 1.0,
            },
            exposure: ExposureMetrics {
                mean_brightness: 120.0,
                contrast: 50.0,
                dynamic_range: 0.9,
                dark_ratio: 0.02,
                bright_ratio: 0.02,
                is_well_exposed: true,
                has_contrast: true,
                is_clipped: false,
            },
            watermark: WatermarkMetrics {
                has_watermark: false,
                confidence: 0.0,
                indicators: 0,
            },
            content: ContentMetrics {
                content_score: 1.0,
                has_faces: false,
                face_count: 0,
            },
        }
    }

    fn png(image: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::from_score(100.0), Tier::High);
        assert_eq!(Tier::from_score(75.0), Tier::High);
        assert_eq!(Tier::from_score(74.9), Tier::Medium);
        assert_eq!(Tier::from_score(50.0), Tier::Medium);
        assert_eq!(Tier::from_score(30.0), Tier::Low);
        assert_eq!(Tier::from_score(29.9), Tier::Rejected);
    }

    #[test]
    fn test_clean_bundle_scores_full_marks() {
        let verdict = verdict_from_metrics(clean_bundle(), &QualityConfig::default(), 1200, 800);
        assert_eq!(verdict.overall_score, 100.0);
        assert_eq!(verdict.tier, Tier::High);
        assert!(verdict.is_acceptable());
        assert!(verdict.advisories.is_empty());
    }

    #[test]
    fn test_logo_flag_overrides_score() {
        let mut bundle = clean_bundle();
        bundle.color.is_logo_like = true;
        bundle.color.unique_colors = 300;
        bundle.color.entropy = 0.25;
        bundle.edges.score = 0.5;
        let verdict = verdict_from_metrics(bundle, &QualityConfig::default(), 1200, 800);
        assert!(verdict.overall_score >= 60.0);
        assert!(!verdict.is_acceptable());
        assert_eq!(
            verdict.rejection_reasons,
            vec!["Likely logo/icon (300 colors, entropy: 0.25)".to_string()]
        );
    }

    #[test]
    fn test_watermark_and_blur_are_hard_gates() {
        let mut bundle = clean_bundle();
        bundle.sharpness.is_sharp = false;
        bundle.sharpness.laplacian_variance = 42.0;
        bundle.sharpness.blur_type = Some(BlurType::OutOfFocus);
        bundle.watermark.has_watermark = true;
        bundle.watermark.confidence = 0.5;
        let verdict = verdict_from_metrics(bundle, &QualityConfig::default(), 1200, 800);
        assert_eq!(
            verdict.rejection_reasons,
            vec![
                "Blurry (out_of_focus, Laplacian: 42.0)".to_string(),
                "Watermark detected (50%)".to_string(),
            ]
        );
    }

    #[test]
    fn test_score_floor_alone_rejects() {
        let mut bundle = clean_bundle();
        bundle.sharpness.score = 0.5;
        bundle.color.is_diverse = false;
        bundle.edges.score = 0.4;
        bundle.content.content_score = 0.0;
        let verdict = verdict_from_metrics(bundle, &QualityConfig::default(), 1200, 800);
        assert!((verdict.overall_score - 53.5).abs() < 1e-4);
        assert_eq!(verdict.tier, Tier::Medium);
        assert_eq!(
            verdict.rejection_reasons,
            vec!["Score below acceptance floor (53.5 < 55)".to_string()]
        );
    }

    #[test]
    fn test_soft_findings_become_advisories() {
        let mut bundle = clean_bundle();
        bundle.exposure.is_clipped = true;
        bundle.exposure.is_well_exposed = false;
        bundle.exposure.mean_brightness = 200.0;
        let verdict = verdict_from_metrics(bundle.clone(), &QualityConfig::default(), 1200, 800);
        assert!(verdict.is_acceptable());
        assert_eq!(verdict.overall_score, 92.5);
        assert_eq!(
            verdict.advisories,
            vec![
                "Poor exposure (brightness: 200.0)".to_string(),
                "Clipped highlights/shadows".to_string(),
            ]
        );

        let strict = verdict_from_metrics(bundle, &QualityConfig::default().strict(), 1200, 800);
        assert!(!strict.is_acceptable());
        assert_eq!(strict.rejection_reasons.len(), 2);
        assert!(strict.advisories.is_empty());
    }

    #[test]
    fn test_strict_mode_gates_text() {
        let mut bundle = clean_bundle();
        bundle.edges.is_likely_text = true;
        let lenient = verdict_from_metrics(bundle.clone(), &QualityConfig::default(), 1200, 800);
        assert!(lenient.is_acceptable());
        assert_eq!(lenient.advisories, vec!["Likely text/infographic".to_string()]);

        let strict = verdict_from_metrics(bundle, &QualityConfig::default().strict(), 1200, 800);
        assert_eq!(strict.rejection_reasons, vec!["Likely text/infographic".to_string()]);
    }

    #[test]
    fn test_too_small_skips_metric_suite() {
        let scorer = counting_scorer();
        let verdict = scorer.assess(&fixtures::solid(40, 40, [0, 0, 255]));
        assert!(!verdict.is_acceptable());
        assert_eq!(verdict.overall_score, 10.0);
        assert_eq!(verdict.tier, Tier::Rejected);
        assert_eq!(
            verdict.rejection_reasons,
            vec!["Too small: 40x40".to_string(), "Solid color background".to_string()]
        );
        assert!(verdict.metrics.is_none());

        let verdict = scorer.assess(&fixtures::noise(599, 800, 1));
        assert_eq!(verdict.rejection_reasons, vec!["Too small: 599x800".to_string()]);
        assert_eq!(scorer.suite.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_solid_fill_is_rejected() {
        let scorer = counting_scorer();
        let verdict = scorer.assess(&fixtures::solid(800, 600, [30, 90, 200]));
        assert!(!verdict.is_acceptable());
        assert!(verdict.rejection_reasons.iter().any(|r| r == "Solid color background"));
        assert!(verdict.rejection_reasons.iter().any(|r| r.starts_with("Likely logo/icon")));
        assert_eq!(scorer.suite.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noise_is_accepted() {
        let verdict = QualityScorer::new(QualityConfig::default()).assess(&fixtures::noise(800, 600, 21));
        assert!(verdict.is_acceptable(), "reasons: {:?}", verdict.rejection_reasons);
        let metrics = verdict.metrics.as_ref().unwrap();
        assert!(metrics.sharpness.is_sharp);
        assert!(metrics.edges.is_complex);
        assert_eq!(verdict.tier, Tier::High);
    }

    #[test]
    fn test_noise_passes_strict_mode() {
        let scorer = QualityScorer::new(QualityConfig::default().strict());
        let verdict = scorer.assess(&fixtures::noise(800, 600, 22));
        assert!(verdict.is_acceptable(), "reasons: {:?}", verdict.rejection_reasons);
    }

    #[test]
    fn test_photo_like_image_is_accepted() {
        let verdict = QualityScorer::new(QualityConfig::default()).assess(&fixtures::photo(1200, 800, 5));
        assert!(verdict.is_acceptable(), "reasons: {:?}", verdict.rejection_reasons);
        assert!(verdict.overall_score > 90.0);
    }

    #[test]
    fn test_sky_over_crowd_is_accepted() {
        let verdict =
            QualityScorer::new(QualityConfig::default()).assess(&fixtures::sky_over_detail(1200, 800, 11));
        assert!(verdict.is_acceptable(), "reasons: {:?}", verdict.rejection_reasons);
        assert!(!verdict.metrics.as_ref().unwrap().watermark.has_watermark);
    }

    #[test]
    fn test_assess_is_idempotent() {
        let scorer = QualityScorer::new(QualityConfig::default());
        let bytes = png(&fixtures::photo(640, 480, 8));
        let first = scorer.assess_bytes(&bytes);
        let second = scorer.assess_bytes(&bytes);
        assert_eq!(first, second);
    }

    #[test]
    fn test_undecodable_bytes() {
        let verdict = counting_scorer().assess_bytes(b"<html>not an image</html>");
        assert!(!verdict.is_acceptable());
        assert_eq!(verdict.overall_score, 0.0);
        assert_eq!(verdict.rejection_reasons, vec!["Cannot open image".to_string()]);
    }
}
