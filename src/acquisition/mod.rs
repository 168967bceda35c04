//! Image acquisition: take one candidate URL from filter to durable storage.
//!
//! Per candidate the stages run strictly in order:
//!
//! ```text
//! Filtered -> Downloading -> Processing -> Assessed -> Accepted | Rejected
//! ```
//!
//! Only downloads are retried. A rejected candidate never reaches the
//! store; the caller falls back to the placeholder image.

pub mod fetch;
pub mod process;
pub mod rate_limit;
pub mod selector;

use crate::config::AcquisitionConfig;
use crate::error::StoreError;
use crate::quality::{CandidateFilter, FilterDecision, MetricSuite, QualityScorer, QualityVerdict, StandardMetrics};
use crate::retry::Backoff;
use crate::storage::{ImageStore, image_path};
use fetch::ImageFetcher;
use process::{ProcessedImage, STORED_CONTENT_TYPE};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub use selector::{Selection, SelectedImage, Tally};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Filtered,
    Downloading,
    Processing,
    Assessed,
    Accepted,
    Rejected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Filtered => "filtered",
            Stage::Downloading => "downloading",
            Stage::Processing => "processing",
            Stage::Assessed => "assessed",
            Stage::Accepted => "accepted",
            Stage::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Where one candidate ended up after [`AcquisitionWorkflow::evaluate`].
#[derive(Debug)]
pub enum Evaluation {
    Accepted {
        url: String,
        image: ProcessedImage,
        verdict: QualityVerdict,
    },
    Rejected {
        url: String,
        /// Last stage entered before the rejection.
        stage: Stage,
        reason: String,
        /// Present once the image was decoded far enough to be judged.
        verdict: Option<QualityVerdict>,
    },
}

impl Evaluation {
    fn filtered(url: &str, decision: &FilterDecision) -> Self {
        Evaluation::Rejected {
            url: url.to_string(),
            stage: Stage::Filtered,
            reason: decision.reason(),
            verdict: None,
        }
    }

    /// Download failures count as errors; everything else is a judgement.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Evaluation::Rejected {
                stage: Stage::Downloading,
                ..
            }
        )
    }
}

pub struct AcquisitionWorkflow<F, S, M = StandardMetrics> {
    filter: CandidateFilter,
    fetcher: F,
    store: S,
    scorer: Arc<QualityScorer<M>>,
    config: AcquisitionConfig,
    store_backoff: Backoff,
}

impl<F, S, M> fmt::Debug for AcquisitionWorkflow<F, S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionWorkflow")
            .field("max_dimension", &self.config.max_dimension)
            .field("jpeg_quality", &self.config.jpeg_quality)
            .field("store_backoff", &self.store_backoff)
            .finish()
    }
}

impl<F, S, M> AcquisitionWorkflow<F, S, M>
where
    F: ImageFetcher,
    S: ImageStore,
    M: MetricSuite + Send + Sync + 'static,
{
    pub fn new(fetcher: F, store: S, scorer: Arc<QualityScorer<M>>, config: AcquisitionConfig) -> Self {
        let filter = CandidateFilter::new(scorer.config());
        let store_backoff = Backoff::new(config.download_attempts, Duration::from_millis(500));
        Self {
            filter,
            fetcher,
            store,
            scorer,
            config,
            store_backoff,
        }
    }

    pub fn with_store_backoff(mut self, backoff: Backoff) -> Self {
        self.store_backoff = backoff;
        self
    }

    pub fn scorer(&self) -> &QualityScorer<M> {
        &self.scorer
    }

    /// Run one candidate up to the accept/reject decision without storing it.
    pub async fn evaluate(&self, url: &str) -> Evaluation {
        let decision = self.filter.should_fetch(url);
        if !decision.is_accepted() {
            debug!(url, reason = %decision.reason(), "Candidate filtered");
            return Evaluation::filtered(url, &decision);
        }
        self.evaluate_unfiltered(url).await
    }

    /// Download, process and assess a candidate that already passed the
    /// candidate filter.
    #[instrument(level = "info", skip_all, fields(url = %url))]
    async fn evaluate_unfiltered(&self, url: &str) -> Evaluation {
        let rejected = |stage: Stage, reason: String, verdict: Option<QualityVerdict>| {
            Evaluation::Rejected {
                url: url.to_string(),
                stage,
                reason,
                verdict,
            }
        };

        let fetched = match self.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "Image download failed");
                return rejected(Stage::Downloading, e.to_string(), None);
            }
        };

        let scorer = Arc::clone(&self.scorer);
        let max_dimension = self.config.max_dimension;
        let quality = self.config.jpeg_quality;
        let bytes = fetched.bytes;
        let outcome = tokio::task::spawn_blocking(move || {
            let processed = process::process(&bytes, max_dimension, quality)?;
            let verdict = scorer.assess(&processed.image);
            Ok::<_, crate::error::ProcessError>((processed, verdict))
        })
        .await;

        let (image, verdict) = match outcome {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                info!(error = %e, "Image rejected: cannot open");
                let verdict = QualityVerdict::unopenable();
                let reason = verdict.rejection_reasons.join("; ");
                return rejected(Stage::Processing, reason, Some(verdict));
            }
            Err(e) => {
                warn!(error = %e, "Image processing task failed");
                return rejected(Stage::Processing, e.to_string(), None);
            }
        };

        if verdict.is_acceptable() {
            Evaluation::Accepted {
                url: url.to_string(),
                image,
                verdict,
            }
        } else {
            let reason = verdict.rejection_reasons.join("; ");
            rejected(Stage::Assessed, reason, Some(verdict))
        }
    }

    /// Store an accepted image under its content-derived path.
    pub async fn persist(&self, image: &ProcessedImage, slug_hint: &str) -> Result<String, StoreError> {
        let path = image_path(&self.config.storage_prefix, slug_hint, &image.sha256);
        let public_url = self
            .store_backoff
            .retry(&path, StoreError::is_transient, || {
                self.store
                    .put_image(&path, image.jpeg.clone(), STORED_CONTENT_TYPE)
            })
            .await?;
        info!(path = %path, public_url = %public_url, "Stored image");
        Ok(public_url)
    }

    /// Evaluate a single candidate and store it if accepted.
    ///
    /// `None` means the caller should use the placeholder image.
    pub async fn acquire(&self, url: &str, slug_hint: &str) -> Option<String> {
        match self.evaluate(url).await {
            Evaluation::Accepted { image, .. } => match self.persist(&image, slug_hint).await {
                Ok(public_url) => Some(public_url),
                Err(e) => {
                    warn!(url, error = %e, "Could not store accepted image");
                    None
                }
            },
            Evaluation::Rejected { .. } => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod doubles {
    //! In-memory fetcher and store for workflow tests.

    use super::fetch::{FetchedImage, ImageFetcher};
    use crate::error::{FetchError, StoreError};
    use crate::storage::ImageStore;
    use image::DynamicImage;
    use image::codecs::jpeg::JpegEncoder;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn png(image: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub fn jpeg(image: &DynamicImage, quality: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&image.to_rgb8())
            .unwrap();
        buf
    }

    /// Serves canned bodies by URL; unknown URLs answer 404.
    #[derive(Default)]
    pub struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
            self.bodies.insert(url.to_string(), body);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.bodies.get(url) {
                Some(body) => Ok(FetchedImage {
                    bytes: body.clone(),
                    content_type: Some("image/jpeg".into()),
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub puts: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        pub fn put_count(&self) -> usize {
            self.puts.lock().unwrap().len()
        }
    }

    impl ImageStore for MemoryStore {
        async fn put_image(
            &self,
            path: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, StoreError> {
            self.puts.lock().unwrap().push(path.to_string());
            Ok(format!("https://cdn.test/{path}"))
        }
    }
}
