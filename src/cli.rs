//! Command-line interface definitions for the news pipeline.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option can be provided via a command-line flag or an environment
//! variable (a `.env` file in the working directory is loaded first).

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the news pipeline.
///
/// # Examples
///
/// ```sh
/// # One pass against Supabase (credentials from the environment)
/// noticias_pipeline
///
/// # Offline run writing images and articles to a local directory
/// noticias_pipeline --local-store ./data --report-dir ./reports
///
/// # Continuous mode, one pass every 30 minutes, with LLM rewriting
/// noticias_pipeline --interval-minutes 30 --enable-rewrite
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase service-role key
    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Storage bucket receiving accepted images
    #[arg(long, env = "SUPABASE_BUCKET", default_value = "noticias")]
    pub bucket: String,

    /// Table receiving article records
    #[arg(long, env = "SUPABASE_TABLE", default_value = "noticias")]
    pub table: String,

    /// Store images and articles under this directory instead of Supabase
    #[arg(long, env = "LOCAL_STORE_DIR")]
    pub local_store: Option<PathBuf>,

    /// YAML file listing RSS sources (defaults to the built-in list)
    #[arg(short, long, env = "SOURCES_FILE")]
    pub sources: Option<PathBuf>,

    /// Maximum articles taken from each feed per pass
    #[arg(long, env = "MAX_ARTICLES_PER_SOURCE", default_value_t = 10)]
    pub max_articles_per_source: usize,

    /// Minimum overall score (0-100) for an image to be accepted
    #[arg(long, env = "MIN_QUALITY_SCORE", default_value_t = 55.0)]
    pub min_quality_score: f32,

    /// Minimum accepted image width in pixels
    #[arg(long, env = "MIN_IMAGE_WIDTH", default_value_t = 600)]
    pub min_width: u32,

    /// Minimum accepted image height in pixels
    #[arg(long, env = "MIN_IMAGE_HEIGHT", default_value_t = 400)]
    pub min_height: u32,

    /// Longest side of stored images; larger images are downscaled
    #[arg(long, env = "MAX_IMAGE_DIMENSION", default_value_t = 1920)]
    pub max_dimension: u32,

    /// JPEG quality used when re-encoding stored images
    #[arg(long, env = "IMAGE_QUALITY", default_value_t = 85)]
    pub image_quality: u8,

    /// Requests per minute allowed against any single domain
    #[arg(long, env = "REQUESTS_PER_MINUTE", default_value_t = 30)]
    pub requests_per_minute: u32,

    /// Articles whose images are processed concurrently
    #[arg(long, env = "DOWNLOAD_CONCURRENCY", default_value_t = 4)]
    pub download_concurrency: usize,

    /// Concurrent LLM rewrite calls
    #[arg(long, env = "LLM_CONCURRENCY", default_value_t = 2)]
    pub llm_concurrency: usize,

    /// Timeout applied to every HTTP call, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Download attempts per image (transient failures only)
    #[arg(long, env = "DOWNLOAD_RETRIES", default_value_t = 3)]
    pub download_retries: usize,

    /// Rewrite article text with the LLM before publishing
    #[arg(long, env = "ENABLE_LLM_REWRITE")]
    pub enable_rewrite: bool,

    /// Chat template used for rewriting
    #[arg(long, env = "LLM_REWRITE_TEMPLATE", default_value = "news_rewriter")]
    pub rewrite_template: String,

    /// Strict quality mode: higher blur threshold, text and exposure become hard gates
    #[arg(long, env = "STRICT_QUALITY")]
    pub strict_quality: bool,

    /// Image reference used when no candidate is accepted
    #[arg(long, env = "PLACEHOLDER_IMAGE_URL")]
    pub placeholder_image_url: Option<String>,

    /// Directory for the end-of-run JSON report
    #[arg(long, env = "REPORT_DIR")]
    pub report_dir: Option<String>,

    /// Run continuously, sleeping this many minutes between passes
    #[arg(long, env = "RUN_INTERVAL_MINUTES")]
    pub interval_minutes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["noticias_pipeline"]);

        assert_eq!(cli.bucket, "noticias");
        assert_eq!(cli.min_quality_score, 55.0);
        assert_eq!(cli.min_width, 600);
        assert_eq!(cli.min_height, 400);
        assert!(!cli.enable_rewrite);
        assert!(!cli.strict_quality);
        assert!(cli.interval_minutes.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "noticias_pipeline",
            "--local-store",
            "/tmp/store",
            "--min-quality-score",
            "60",
            "--strict-quality",
            "-s",
            "/tmp/sources.yaml",
            "--interval-minutes",
            "15",
        ]);

        assert_eq!(cli.local_store, Some(PathBuf::from("/tmp/store")));
        assert_eq!(cli.min_quality_score, 60.0);
        assert!(cli.strict_quality);
        assert_eq!(cli.sources, Some(PathBuf::from("/tmp/sources.yaml")));
        assert_eq!(cli.interval_minutes, Some(15));
    }
}
