//! Image quality assessment.
//!
//! Three layers, cheapest first:
//!
//! 1. [`filter`]: string/number predicates on a candidate URL, no network.
//! 2. [`metrics`]: independent pixel analyzers producing a [`MetricBundle`].
//! 3. [`scorer`]: weighted score, tier, hard gates and itemized reasons.
//!
//! All thresholds come from [`crate::config::QualityConfig`].

pub mod filter;
pub mod metrics;
pub mod scorer;

pub use filter::{CandidateFilter, FilterDecision};
pub use metrics::{MetricBundle, MetricSuite, StandardMetrics};
pub use scorer::{QualityScorer, QualityVerdict, Tier};
