//! One pass of the news pipeline.
//!
//! ```text
//! probe backend -> collect articles -> per article (bounded, unordered):
//!     skip if stored -> { rewrite text | select best image } -> insert
//! ```
//!
//! Articles are independent units of work: one failing never aborts its
//! siblings. The only fatal condition mid-run is a backend that stays
//! unreachable through the startup probe's retries.

use crate::acquisition::fetch::ImageFetcher;
use crate::acquisition::{AcquisitionWorkflow, Tally};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, StoreError};
use crate::models::{
    ArticleOutcome, ArticleRecord, OutcomeKind, RawArticle, RewrittenText, RunReport, RunSummary,
};
use crate::quality::{MetricSuite, StandardMetrics};
use crate::retry::Backoff;
use crate::rewrite::Rewriter;
use crate::sources::ArticleSource;
use crate::storage::{ArticleStore, ImageStore, InsertOutcome};
use crate::utils::time_of_day;
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

/// Per-run knobs taken from [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub download_concurrency: usize,
    pub llm_concurrency: usize,
    pub placeholder_image_url: String,
}

impl From<&PipelineConfig> for RunOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            download_concurrency: config.download_concurrency,
            llm_concurrency: config.llm_concurrency,
            placeholder_image_url: config.placeholder_image_url.clone(),
        }
    }
}

/// What one article contributed to the run.
#[derive(Debug)]
struct UnitResult {
    outcome: ArticleOutcome,
    images: Tally,
    rewritten: bool,
}

pub struct Pipeline<Src, F, B, R, M = StandardMetrics> {
    source: Src,
    workflow: AcquisitionWorkflow<F, Arc<B>, M>,
    store: Arc<B>,
    rewriter: R,
    llm_gate: Semaphore,
    options: RunOptions,
    store_backoff: Backoff,
}

impl<Src, F, B, R, M> Pipeline<Src, F, B, R, M>
where
    Src: ArticleSource,
    F: ImageFetcher,
    B: ImageStore + ArticleStore,
    R: Rewriter,
    M: MetricSuite + Send + Sync + 'static,
{
    pub fn new(
        source: Src,
        workflow: AcquisitionWorkflow<F, Arc<B>, M>,
        store: Arc<B>,
        rewriter: R,
        options: RunOptions,
    ) -> Self {
        Self {
            source,
            workflow,
            store,
            rewriter,
            llm_gate: Semaphore::new(options.llm_concurrency.max(1)),
            options,
            store_backoff: Backoff::new(3, Duration::from_secs(2)),
        }
    }

    pub fn with_store_backoff(mut self, backoff: Backoff) -> Self {
        self.store_backoff = backoff;
        self
    }

    /// Prove the backend answers before doing any work.
    #[instrument(level = "info", skip_all)]
    pub async fn check_backend(&self) -> Result<(), PipelineError> {
        self.store_backoff
            .retry("backend probe", StoreError::is_transient, || self.store.ping())
            .await
            .map_err(|e| {
                error!(error = %e, "Persistence backend unreachable; aborting run");
                PipelineError::BackendUnreachable(e)
            })?;
        info!("Persistence backend reachable");
        Ok(())
    }

    /// Run one full pass and return its report.
    #[instrument(level = "info", skip_all)]
    pub async fn run_once(&self) -> Result<RunReport, PipelineError> {
        let t0 = Instant::now();
        self.check_backend().await?;

        let batch = self.source.collect().await;
        let mut summary = RunSummary {
            articles_seen: batch.articles.len(),
            sources_failed: batch.failed_sources,
            ..RunSummary::default()
        };
        info!(
            articles = summary.articles_seen,
            concurrency = self.options.download_concurrency,
            "Processing articles"
        );

        let results: Vec<UnitResult> = stream::iter(batch.articles)
            .map(|article| self.process_article(article))
            .buffer_unordered(self.options.download_concurrency.max(1))
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            summary.record(&result.outcome);
            summary.images_accepted += result.images.accepted;
            summary.images_rejected += result.images.rejected;
            summary.images_errored += result.images.errored;
            if result.rewritten {
                summary.rewritten += 1;
            }
            outcomes.push(result.outcome);
        }

        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            seen = summary.articles_seen,
            published = summary.published,
            with_image = summary.with_image,
            with_placeholder = summary.with_placeholder,
            duplicates = summary.duplicates,
            failed = summary.failed,
            rewritten = summary.rewritten,
            sources_failed = summary.sources_failed,
            images_accepted = summary.images_accepted,
            images_rejected = summary.images_rejected,
            images_errored = summary.images_errored,
            "Run complete"
        );

        let now = Local::now();
        Ok(RunReport {
            local_date: now.date_naive().to_string(),
            edition: time_of_day(),
            local_time: now.time().format("%H:%M:%S").to_string(),
            summary,
            outcomes,
        })
    }

    #[instrument(level = "info", skip_all, fields(source_url = %article.source_url))]
    async fn process_article(&self, article: RawArticle) -> UnitResult {
        let outcome = |kind: OutcomeKind, detail: Option<String>| ArticleOutcome {
            source_url: article.source_url.clone(),
            title: article.title.clone(),
            kind,
            image_url: None,
            image_score: None,
            detail,
        };

        match self.store.exists(&article.source_url).await {
            Ok(true) => {
                debug!("Already stored; skipping");
                return UnitResult {
                    outcome: outcome(OutcomeKind::Duplicate, None),
                    images: Tally::default(),
                    rewritten: false,
                };
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Duplicate check failed; relying on insert"),
        }

        let ((text, rewritten), selection) = tokio::join!(
            self.rewrite_text(&article),
            self.workflow
                .select_best(&article.candidate_image_urls, &article.title)
        );

        let (image_url, image_source_url, image_score) = match &selection.image {
            Some(selected) => (
                selected.public_url.clone(),
                Some(selected.source_url.clone()),
                Some(selected.verdict.overall_score),
            ),
            None => (self.options.placeholder_image_url.clone(), None, None),
        };

        let record = ArticleRecord {
            title: text.title,
            subtitle: text.subtitle,
            excerpt: text.excerpt,
            content: text.content,
            category: article.category_hint.clone(),
            source_name: article.source_name.clone(),
            source_url: article.source_url.clone(),
            image_url,
            image_source_url,
            image_score,
            published_at: article.published_at,
            rewritten,
        };

        let inserted = self
            .store_backoff
            .retry(&article.source_url, StoreError::is_transient, || {
                self.store.insert(&record)
            })
            .await;

        let mut result = match inserted {
            Ok(InsertOutcome::Inserted) if record.has_placeholder() => {
                info!("Published with placeholder image");
                outcome(
                    OutcomeKind::PublishedWithPlaceholder,
                    Some("no acceptable image".to_string()),
                )
            }
            Ok(InsertOutcome::Inserted) => {
                info!(image_url = %record.image_url, "Published");
                outcome(OutcomeKind::Published, None)
            }
            Ok(InsertOutcome::Duplicate) => outcome(OutcomeKind::Duplicate, None),
            Err(e) => {
                error!(error = %e, "Could not store article");
                outcome(OutcomeKind::Failed, Some(e.to_string()))
            }
        };
        if result.kind != OutcomeKind::Duplicate {
            result.image_url = Some(record.image_url.clone());
            result.image_score = record.image_score;
        }

        UnitResult {
            outcome: result,
            images: selection.tally,
            rewritten,
        }
    }

    /// Rewritten text, or the original when rewriting is off or fails.
    async fn rewrite_text(&self, article: &RawArticle) -> (RewrittenText, bool) {
        if !self.rewriter.is_enabled() {
            return (RewrittenText::original(article), false);
        }
        let Ok(_permit) = self.llm_gate.acquire().await else {
            return (RewrittenText::original(article), false);
        };
        match self.rewriter.rewrite(article).await {
            Ok(text) => (text, true),
            Err(e) => {
                warn!(error = %e, "Rewrite failed; keeping original text");
                (RewrittenText::original(article), false)
            }
        }
    }
}
