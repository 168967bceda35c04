//! Error taxonomy for the pipeline.
//!
//! Errors are split by the collaborator that produces them so callers can
//! decide locally whether a failure is retryable, a per-unit rejection, or
//! fatal for the whole run:
//!
//! - [`FetchError`]: image and feed downloads; [`FetchError::is_transient`]
//!   separates timeouts/5xx (retried) from 4xx/bad content (final).
//! - [`ProcessError`]: decoding and re-encoding a downloaded image.
//! - [`StoreError`]: uploads and article persistence.
//! - [`SourceError`]: feed retrieval and parsing.
//! - [`RewriteError`]: the optional LLM rewrite step.
//! - [`MetricError`]: a single image metric that could not be computed.
//! - [`ConfigError`]: startup validation; always fatal.
//! - [`PipelineError`]: what a run returns to `main`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("not an image (content-type: {content_type})")]
    NotAnImage { content_type: String },
    #[error("body of {bytes} bytes exceeds the {limit} byte limit")]
    TooLarge { bytes: usize, limit: usize },
    #[error("failed reading body from {url}: {message}")]
    Body { url: String, message: String },
    #[error("invalid request for {url}: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    /// Timeouts, connection resets, throttling and server errors are worth
    /// another attempt; everything else is a property of the resource.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Connect { .. } | FetchError::Body { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::NotAnImage { .. }
            | FetchError::TooLarge { .. }
            | FetchError::Request { .. } => false,
        }
    }

    pub fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        let url = url.to_string();
        if e.is_timeout() {
            FetchError::Timeout { url }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                url,
            }
        } else if e.is_connect() {
            FetchError::Connect {
                url,
                message: e.to_string(),
            }
        } else if e.is_body() || e.is_decode() {
            FetchError::Body {
                url,
                message: e.to_string(),
            }
        } else {
            FetchError::Request {
                url,
                message: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("cannot decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cannot encode image: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http { status, .. } => *status == 429 || *status >= 500,
            StoreError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            StoreError::Io(_) | StoreError::Json(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed feed {url}: {message}")]
    Xml { url: String, message: String },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("LLM rewriting is not compiled in (enable the `rewrite` feature)")]
    Disabled,
    #[error("LLM call failed: {0}")]
    Failed(String),
    #[error("LLM returned malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("image is {width}x{height}, too small for {metric}")]
    TooSmall {
        metric: &'static str,
        width: u32,
        height: u32,
    },
    #[error("{metric} produced a non-finite value")]
    NonFinite { metric: &'static str },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("persistence backend unreachable: {0}")]
    BackendUnreachable(#[source] StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("cannot build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
