//! Runtime configuration.
//!
//! Thresholds used by the image-quality engine are empirically chosen policy
//! constants, not derived values. They live in [`QualityConfig`] so each
//! environment (and each test) can tune them without touching the scorer.
//! [`PipelineConfig::from_cli`] builds and validates the whole tree once at
//! startup; a [`ConfigError`] there is fatal.

use crate::cli::Cli;
use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Grey "Sin imagen" card used when an article has no acceptable photo.
pub const DEFAULT_PLACEHOLDER_IMAGE: &str = "data:image/svg+xml,%3Csvg xmlns=%22http://www.w3.org/2000/svg%22 width=%22800%22 height=%22400%22%3E%3Crect width=%22800%22 height=%22400%22 fill=%22%23e5e7eb%22/%3E%3Ctext x=%2250%25%22 y=%2250%25%22 dominant-baseline=%22middle%22 text-anchor=%22middle%22 font-family=%22sans-serif%22 font-size=%2224%22 fill=%22%239ca3af%22%3ESin imagen%3C/text%3E%3C/svg%3E";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Points each scoring component contributes to the 0-100 overall score.
///
/// | Component | Points |
/// |---|---|
/// | sharpness | 25 |
/// | colour diversity | 20 |
/// | not logo-like | 15 |
/// | edge complexity | 15 |
/// | exposure and contrast | 15 |
/// | no watermark | 5 |
/// | content interest | 5 |
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    pub sharpness: f32,
    pub color_diversity: f32,
    pub logo_negative: f32,
    pub edge_complexity: f32,
    pub exposure: f32,
    pub watermark_negative: f32,
    pub content: f32,
}

impl ScoreWeights {
    pub fn total(&self) -> f32 {
        self.sharpness
            + self.color_diversity
            + self.logo_negative
            + self.edge_complexity
            + self.exposure
            + self.watermark_negative
            + self.content
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            sharpness: 25.0,
            color_diversity: 20.0,
            logo_negative: 15.0,
            edge_complexity: 15.0,
            exposure: 15.0,
            watermark_negative: 5.0,
            content: 5.0,
        }
    }
}

/// Thresholds for the candidate filter, metric extractors and scorer.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    // Dimensions
    pub min_width: u32,
    pub min_height: u32,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,

    // Acceptance
    pub acceptance_floor: f32,
    pub strict: bool,
    /// Stop scanning candidates once one scores at least this much.
    pub good_enough_score: Option<f32>,
    pub weights: ScoreWeights,

    // Sharpness (Laplacian variance)
    pub blur_threshold: f64,
    pub blur_threshold_strict: f64,

    // Colour
    pub color_count_cap: usize,
    pub min_color_diversity: usize,
    pub logo_max_colors: usize,
    pub logo_dominant_ratio: f64,
    pub logo_top3_ratio: f64,
    pub logo_min_entropy: f64,
    pub solid_dominant_ratio: f64,

    // Edges (Sobel magnitude thresholds)
    pub edge_threshold: u16,
    pub edge_threshold_loose: u16,
    pub min_edge_density: f64,
    pub edge_density_full_score: f64,
    pub text_coherence: f64,
    pub text_min_density: f64,

    // Exposure
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_contrast: f64,
    pub dark_level: u8,
    pub bright_level: u8,
    pub clip_ratio: f64,

    // Watermark
    pub watermark_corner_density: f64,
    pub watermark_corner_factor: f64,
    pub watermark_min_center_lines: usize,
}

impl QualityConfig {
    /// Laplacian-variance floor the sharpness gate uses in the current mode.
    pub fn sharpness_threshold(&self) -> f64 {
        if self.strict {
            self.blur_threshold_strict
        } else {
            self.blur_threshold
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let total = self.weights.total();
        if (total - 100.0).abs() > 0.01 {
            return Err(ConfigError::Invalid {
                name: "weights",
                message: format!("score weights must sum to 100, got {total}"),
            });
        }
        if !(0.0..=100.0).contains(&self.acceptance_floor) {
            return Err(ConfigError::Invalid {
                name: "MIN_QUALITY_SCORE",
                message: format!("{} is outside 0..=100", self.acceptance_floor),
            });
        }
        if self.min_width == 0 || self.min_height == 0 {
            return Err(ConfigError::Invalid {
                name: "MIN_IMAGE_WIDTH/MIN_IMAGE_HEIGHT",
                message: "minimum dimensions must be positive".into(),
            });
        }
        if self.min_aspect_ratio <= 0.0 || self.min_aspect_ratio >= self.max_aspect_ratio {
            return Err(ConfigError::Invalid {
                name: "aspect_ratio",
                message: format!(
                    "band {}..{} is empty",
                    self.min_aspect_ratio, self.max_aspect_ratio
                ),
            });
        }
        Ok(())
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_width: 600,
            min_height: 400,
            min_aspect_ratio: 0.4,
            max_aspect_ratio: 3.0,

            acceptance_floor: 55.0,
            strict: false,
            good_enough_score: None,
            weights: ScoreWeights::default(),

            blur_threshold: 150.0,
            blur_threshold_strict: 200.0,

            color_count_cap: 50_000,
            min_color_diversity: 1_500,
            logo_max_colors: 500,
            logo_dominant_ratio: 0.4,
            logo_top3_ratio: 0.85,
            logo_min_entropy: 0.3,
            solid_dominant_ratio: 0.8,

            edge_threshold: 200,
            edge_threshold_loose: 100,
            min_edge_density: 0.06,
            edge_density_full_score: 0.15,
            text_coherence: 3.0,
            text_min_density: 0.1,

            min_brightness: 35.0,
            max_brightness: 220.0,
            min_contrast: 30.0,
            dark_level: 20,
            bright_level: 235,
            clip_ratio: 0.3,

            watermark_corner_density: 0.15,
            watermark_corner_factor: 2.0,
            watermark_min_center_lines: 6,
        }
    }
}

/// Download, processing and storage-path settings for the acquisition workflow.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub timeout: Duration,
    pub download_attempts: usize,
    pub requests_per_minute: u32,
    pub max_download_bytes: usize,
    pub user_agent: String,
    pub accept_language: String,
    /// Folder inside the bucket that receives article photos.
    pub storage_prefix: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            jpeg_quality: 85,
            timeout: Duration::from_secs(30),
            download_attempts: 3,
            requests_per_minute: 30,
            max_download_bytes: 15 * 1024 * 1024,
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept_language: "es-AR,es;q=0.9,en;q=0.8".to_string(),
            storage_prefix: "articles".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
    pub table: String,
}

/// Where accepted images and article records end up.
#[derive(Debug, Clone)]
pub enum Destination {
    Supabase(SupabaseConfig),
    Local(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub quality: QualityConfig,
    pub acquisition: AcquisitionConfig,
    pub destination: Destination,
    pub download_concurrency: usize,
    pub llm_concurrency: usize,
    pub enable_rewrite: bool,
    pub rewrite_template: String,
    pub max_articles_per_source: usize,
    pub placeholder_image_url: String,
    pub sources_file: Option<PathBuf>,
    pub report_dir: Option<String>,
    pub run_interval: Option<Duration>,
}

impl PipelineConfig {
    /// Build the configuration from parsed arguments and validate it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when Supabase credentials are missing and no
    /// local store was requested, or when any numeric setting is out of range.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let destination = match &cli.local_store {
            Some(dir) => Destination::Local(dir.clone()),
            None => {
                let url = non_empty(cli.supabase_url.as_deref())
                    .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
                let service_key = non_empty(cli.supabase_key.as_deref())
                    .ok_or(ConfigError::Missing("SUPABASE_SERVICE_KEY"))?;
                Destination::Supabase(SupabaseConfig {
                    url: url.trim_end_matches('/').to_string(),
                    service_key: service_key.to_string(),
                    bucket: cli.bucket.clone(),
                    table: cli.table.clone(),
                })
            }
        };

        let quality = QualityConfig {
            min_width: cli.min_width,
            min_height: cli.min_height,
            acceptance_floor: cli.min_quality_score,
            strict: cli.strict_quality,
            ..QualityConfig::default()
        };
        quality.validate()?;

        if !(1..=100).contains(&cli.image_quality) {
            return Err(ConfigError::Invalid {
                name: "IMAGE_QUALITY",
                message: format!("{} is outside 1..=100", cli.image_quality),
            });
        }
        if cli.max_dimension == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_IMAGE_DIMENSION",
                message: "must be positive".into(),
            });
        }
        if cli.requests_per_minute == 0 {
            return Err(ConfigError::Invalid {
                name: "REQUESTS_PER_MINUTE",
                message: "must be positive".into(),
            });
        }
        if cli.download_concurrency == 0 || cli.llm_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "DOWNLOAD_CONCURRENCY/LLM_CONCURRENCY",
                message: "concurrency limits must be positive".into(),
            });
        }

        let acquisition = AcquisitionConfig {
            max_dimension: cli.max_dimension,
            jpeg_quality: cli.image_quality,
            timeout: Duration::from_secs(cli.http_timeout_secs.max(1)),
            download_attempts: cli.download_retries.max(1),
            requests_per_minute: cli.requests_per_minute,
            ..AcquisitionConfig::default()
        };

        Ok(Self {
            quality,
            acquisition,
            destination,
            download_concurrency: cli.download_concurrency,
            llm_concurrency: cli.llm_concurrency,
            enable_rewrite: cli.enable_rewrite,
            rewrite_template: cli.rewrite_template.clone(),
            max_articles_per_source: cli.max_articles_per_source,
            placeholder_image_url: non_empty(cli.placeholder_image_url.as_deref())
                .unwrap_or(DEFAULT_PLACEHOLDER_IMAGE)
                .to_string(),
            sources_file: cli.sources.clone(),
            report_dir: cli.report_dir.clone(),
            run_interval: cli
                .interval_minutes
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(m * 60)),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
