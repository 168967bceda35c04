//! Best-of-N selection over an article's candidate images.

use super::fetch::ImageFetcher;
use super::process::ProcessedImage;
use super::{AcquisitionWorkflow, Evaluation, Stage};
use crate::quality::{MetricSuite, QualityVerdict};
use crate::storage::ImageStore;
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Per-candidate outcome counts for one selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub accepted: usize,
    pub rejected: usize,
    pub errored: usize,
}

#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub source_url: String,
    /// Durable reference returned by the image store.
    pub public_url: String,
    pub verdict: QualityVerdict,
}

#[derive(Debug, Default)]
pub struct Selection {
    pub image: Option<SelectedImage>,
    pub tally: Tally,
}

struct Leader {
    url: String,
    image: ProcessedImage,
    verdict: QualityVerdict,
}

impl<F, S, M> AcquisitionWorkflow<F, S, M>
where
    F: ImageFetcher,
    S: ImageStore,
    M: MetricSuite + Send + Sync + 'static,
{
    /// Assess every candidate in order and store only the highest-scoring
    /// acceptable one. Ties keep the earlier candidate.
    ///
    /// With `good_enough_score` configured, the scan stops at the first
    /// acceptable candidate reaching it.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len(), hint = %source_hint))]
    pub async fn select_best(&self, candidates: &[String], source_hint: &str) -> Selection {
        let good_enough = self.scorer().config().good_enough_score;
        let mut tally = Tally::default();
        let mut leader: Option<Leader> = None;

        let unique: Vec<&str> = candidates
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .unique()
            .collect();
        let decisions = self.filter.batch_filter(unique.iter().copied());
        debug!(
            unique = decisions.len(),
            passing = decisions.iter().filter(|(_, d)| d.is_accepted()).count(),
            "Candidates past the URL filter"
        );

        for (url, decision) in &decisions {
            let url = url.as_str();
            let evaluation = if decision.is_accepted() {
                self.evaluate_unfiltered(url).await
            } else {
                Evaluation::filtered(url, decision)
            };
            if evaluation.is_error() {
                tally.errored += 1;
            }
            match evaluation {
                Evaluation::Accepted { url, image, verdict } => {
                    tally.accepted += 1;
                    let beats = leader
                        .as_ref()
                        .is_none_or(|l| verdict.overall_score > l.verdict.overall_score);
                    if beats {
                        leader = Some(Leader { url, image, verdict });
                    }
                }
                Evaluation::Rejected { stage, reason, .. } => {
                    if stage != Stage::Downloading {
                        tally.rejected += 1;
                    }
                    info!(url, %stage, reason = %reason, "Candidate rejected");
                }
            }

            if let (Some(threshold), Some(l)) = (good_enough, leader.as_ref()) {
                if l.verdict.overall_score >= threshold {
                    info!(score = l.verdict.overall_score, "Good-enough candidate found; stopping early");
                    break;
                }
            }
        }

        let Some(Leader { url, image, verdict }) = leader else {
            info!(?tally, "No acceptable image among candidates");
            return Selection { image: None, tally };
        };

        match self.persist(&image, source_hint).await {
            Ok(public_url) => {
                info!(url = %url, score = verdict.overall_score, tier = %verdict.tier, "Selected image");
                Selection {
                    image: Some(SelectedImage {
                        source_url: url,
                        public_url,
                        verdict,
                    }),
                    tally,
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Could not store selected image");
                tally.errored += 1;
                Selection { image: None, tally }
            }
        }
    }
}
