//! Data models for scraped articles and their persisted representation.
//!
//! - [`RawArticle`]: an article as produced by a source, before any image work
//! - [`RewrittenText`]: the LLM rewrite of an article's text
//! - [`ArticleRecord`]: the row handed to the article store
//! - [`RunSummary`] / [`ArticleOutcome`]: end-of-run accounting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw news article as produced by a source collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    /// Plain-text excerpt or body.
    pub excerpt: String,
    /// Canonical article URL; the deduplication key.
    pub source_url: String,
    /// Human name of the outlet, e.g. "Clarín".
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    /// Candidate photos in preference order.
    pub candidate_image_urls: Vec<String>,
    pub category_hint: String,
}

/// Article text returned by the rewrite collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewrittenText {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub excerpt: String,
    pub content: String,
}

impl RewrittenText {
    /// The unmodified article text, used when rewriting is off or fails.
    pub fn original(article: &RawArticle) -> Self {
        Self {
            title: article.title.clone(),
            subtitle: String::new(),
            excerpt: article.excerpt.clone(),
            content: article.excerpt.clone(),
        }
    }
}

/// The record persisted for each published article.
///
/// `image_url` is never empty: it is either the accepted photo's public URL
/// or the configured placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub subtitle: String,
    pub excerpt: String,
    pub content: String,
    pub category: String,
    pub source_name: String,
    pub source_url: String,
    pub image_url: String,
    /// Where the accepted photo originally came from, if any.
    pub image_source_url: Option<String>,
    pub image_score: Option<f32>,
    pub published_at: DateTime<Utc>,
    pub rewritten: bool,
}

impl ArticleRecord {
    pub fn has_placeholder(&self) -> bool {
        self.image_source_url.is_none()
    }
}

/// What happened to one article during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Published with an accepted photo.
    Published,
    /// Published with the placeholder image.
    PublishedWithPlaceholder,
    /// Already in the store.
    Duplicate,
    /// Persisting the record failed.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleOutcome {
    pub source_url: String,
    pub title: String,
    pub kind: OutcomeKind,
    pub image_url: Option<String>,
    pub image_score: Option<f32>,
    pub detail: Option<String>,
}

/// Counters accumulated over one pass of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub articles_seen: usize,
    pub duplicates: usize,
    pub published: usize,
    pub with_image: usize,
    pub with_placeholder: usize,
    pub failed: usize,
    pub rewritten: usize,
    pub sources_failed: usize,
    pub images_accepted: usize,
    pub images_rejected: usize,
    pub images_errored: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ArticleOutcome) {
        match outcome.kind {
            OutcomeKind::Published => {
                self.published += 1;
                self.with_image += 1;
            }
            OutcomeKind::PublishedWithPlaceholder => {
                self.published += 1;
                self.with_placeholder += 1;
            }
            OutcomeKind::Duplicate => self.duplicates += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
    }
}

/// A full run report: when, what, and how it went.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// `YYYY-MM-DD`, local time.
    pub local_date: String,
    /// "morning", "afternoon" or "evening".
    pub edition: String,
    pub local_time: String,
    pub summary: RunSummary,
    pub outcomes: Vec<ArticleOutcome>,
}
