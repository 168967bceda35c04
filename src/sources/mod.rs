//! Article sources.
//!
//! A source produces [`RawArticle`]s; the pipeline does not care how they
//! were obtained. The built-in source reads the RSS feeds of Argentine
//! outlets listed in [`default_feeds`], or those of a YAML sources file:
//!
//! ```yaml
//! feeds:
//!   - name: Clarín
//!     url: https://www.clarin.com/rss/politica/
//!     category: politica
//! ```

pub mod rss;

use crate::error::SourceError;
use crate::models::RawArticle;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub use rss::RssSource;

/// One feed and the category its articles default to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    pub category: String,
}

impl FeedSource {
    fn new(name: &str, url: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            category: category.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    feeds: Vec<FeedSource>,
}

/// Everything a source produced in one pass.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub articles: Vec<RawArticle>,
    /// Feeds that could not be fetched or parsed.
    pub failed_sources: usize,
}

pub trait ArticleSource {
    async fn collect(&self) -> SourceBatch;
}

pub fn default_feeds() -> Vec<FeedSource> {
    const CLARIN: &str = "Clarín";
    const LA_NACION: &str = "La Nación";
    const CRONISTA: &str = "El Cronista";
    const AMBITO: &str = "Ámbito";
    const LN: &str = "https://www.lanacion.com.ar/arc/outboundfeeds/rss/category";

    vec![
        FeedSource::new(CRONISTA, "https://www.cronista.com/rss/economia/", "economia"),
        FeedSource::new(LA_NACION, &format!("{LN}/economia/"), "economia"),
        FeedSource::new(CLARIN, "https://www.clarin.com/rss/economia/", "economia"),
        FeedSource::new(AMBITO, "https://www.ambito.com/contenidos/economia.rss", "economia"),
        FeedSource::new(CRONISTA, "https://www.cronista.com/rss/politica/", "politica"),
        FeedSource::new(LA_NACION, &format!("{LN}/politica/"), "politica"),
        FeedSource::new(CLARIN, "https://www.clarin.com/rss/politica/", "politica"),
        FeedSource::new(LA_NACION, &format!("{LN}/el-mundo/"), "internacional"),
        FeedSource::new(CLARIN, "https://www.clarin.com/rss/mundo/", "internacional"),
        FeedSource::new(LA_NACION, &format!("{LN}/sociedad/"), "sociedad"),
        FeedSource::new(CLARIN, "https://www.clarin.com/rss/sociedad/", "sociedad"),
        FeedSource::new(CLARIN, "https://www.clarin.com/rss/policiales/", "judicial"),
        FeedSource::new(LA_NACION, &format!("{LN}/seguridad/"), "judicial"),
    ]
}

/// Feeds from `path` when given, the built-in list otherwise.
pub async fn load_feeds(path: Option<&Path>) -> Result<Vec<FeedSource>, SourceError> {
    let Some(path) = path else {
        return Ok(default_feeds());
    };
    let text = tokio::fs::read_to_string(path).await?;
    let file: SourcesFile = serde_yaml::from_str(&text)?;
    info!(path = %path.display(), feeds = file.feeds.len(), "Loaded sources file");
    Ok(file.feeds)
}
