//! RSS feed source.
//!
//! Candidate images for an item are gathered by kind, in this order:
//! `media:content`, `media:thumbnail`, image `enclosure`s, then `<img>`
//! tags inside the HTML description. Relative URLs resolve against the
//! item link; duplicates keep their first position.

use super::{ArticleSource, FeedSource, SourceBatch};
use crate::acquisition::rate_limit::RateLimiter;
use crate::error::{FetchError, SourceError};
use crate::models::RawArticle;
use crate::utils::{clip_chars, host_of};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesRef, BytesStart, Event};
use reqwest::Client;
use reqwest::header::ACCEPT;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use url::Url;

const FEED_ACCEPT: &str = "application/rss+xml, application/xml, text/xml, */*";
const EXCERPT_MAX_CHARS: usize = 300;
const FEED_CONCURRENCY: usize = 4;

static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src]").expect("static selector is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Encoded,
    PubDate,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"content:encoded" => Some(Field::Encoded),
            b"pubDate" | b"dc:date" => Some(Field::PubDate),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ItemDraft {
    title: String,
    link: String,
    description: String,
    encoded: String,
    pub_date: String,
    media_content: Vec<String>,
    media_thumbnail: Vec<String>,
    enclosures: Vec<String>,
}

impl ItemDraft {
    fn buffer(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::Encoded => &mut self.encoded,
            Field::PubDate => &mut self.pub_date,
        }
    }

    fn media(&mut self, element: &BytesStart) {
        let Some(url) = attribute(element, b"url") else {
            return;
        };
        let kind = attribute(element, b"type").unwrap_or_default();
        match element.name().as_ref() {
            b"media:content" if kind.is_empty() || kind.starts_with("image/") => {
                self.media_content.push(url)
            }
            b"media:thumbnail" => self.media_thumbnail.push(url),
            b"enclosure" if kind.starts_with("image/") => self.enclosures.push(url),
            _ => {}
        }
    }

    fn finish(self, feed: &FeedSource) -> Option<RawArticle> {
        let title = collapse_whitespace(&self.title);
        let link = self.link.trim().to_string();
        if title.is_empty() || link.is_empty() {
            return None;
        }

        let description = Html::parse_fragment(&self.description);
        let excerpt = clip_chars(
            &collapse_whitespace(&description.root_element().text().collect::<Vec<_>>().join(" ")),
            EXCERPT_MAX_CHARS,
        );

        let encoded = Html::parse_fragment(&self.encoded);
        let inline = description
            .select(&IMG_SELECTOR)
            .chain(encoded.select(&IMG_SELECTOR))
            .filter_map(|img| img.value().attr("src"))
            .map(str::to_string);

        let candidate_image_urls = self
            .media_content
            .into_iter()
            .chain(self.media_thumbnail)
            .chain(self.enclosures)
            .chain(inline)
            .filter_map(|src| resolve(&link, src.trim()))
            .unique()
            .collect();

        Some(RawArticle {
            title,
            excerpt,
            source_url: link,
            source_name: feed.name.clone(),
            published_at: parse_pub_date(&self.pub_date),
            candidate_image_urls,
            category_hint: feed.category.clone(),
        })
    }
}

/// Attribute value with the `&amp;` escapes feeds put in URLs undone.
fn attribute(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).replace("&amp;", "&"))
        .filter(|v| !v.trim().is_empty())
}

fn entity(reference: &BytesRef) -> String {
    if let Ok(Some(c)) = reference.resolve_char_ref() {
        return c.to_string();
    }
    let name = String::from_utf8_lossy(reference);
    match name.as_ref() {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        "nbsp" => " ".to_string(),
        other => format!("&{other};"),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve(base: &str, src: &str) -> Option<String> {
    if src.is_empty() {
        return None;
    }
    if src.starts_with("data:") {
        return Some(src.to_string());
    }
    match Url::parse(base) {
        Ok(base) => base.join(src).ok().map(String::from),
        Err(_) => Url::parse(src).ok().map(String::from),
    }
}

/// RFC 2822 first (the RSS norm), then RFC 3339, then the current time.
pub fn parse_pub_date(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse up to `limit` items of an RSS document.
pub fn parse_feed(xml: &str, feed: &FeedSource, limit: usize) -> Result<Vec<RawArticle>, SourceError> {
    let mut articles = Vec::new();
    if limit == 0 {
        return Ok(articles);
    }
    let mut reader = Reader::from_str(xml);
    let mut draft: Option<ItemDraft> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader.read_event().map_err(|e| SourceError::Xml {
            url: feed.url.clone(),
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                if e.name().as_ref() == b"item" {
                    draft = Some(ItemDraft::default());
                    field = None;
                } else if let Some(item) = draft.as_mut() {
                    item.media(&e);
                    field = Field::from_tag(e.name().as_ref());
                }
            }
            Event::Empty(e) => {
                if let Some(item) = draft.as_mut() {
                    item.media(&e);
                }
            }
            Event::Text(t) => {
                if let (Some(item), Some(f)) = (draft.as_mut(), field) {
                    item.buffer(f).push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::CData(t) => {
                if let (Some(item), Some(f)) = (draft.as_mut(), field) {
                    item.buffer(f).push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::GeneralRef(r) => {
                if let (Some(item), Some(f)) = (draft.as_mut(), field) {
                    item.buffer(f).push_str(&entity(&r));
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"item" {
                    field = None;
                    if let Some(article) = draft.take().and_then(|d| d.finish(feed)) {
                        articles.push(article);
                        if articles.len() >= limit {
                            break;
                        }
                    }
                } else if field.is_some_and(|f| Field::from_tag(e.name().as_ref()) == Some(f)) {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(articles)
}

/// Reads every configured feed through the shared per-domain limiter.
pub struct RssSource {
    client: Client,
    limiter: Arc<RateLimiter>,
    feeds: Vec<FeedSource>,
    max_per_feed: usize,
}

impl RssSource {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, feeds: Vec<FeedSource>, max_per_feed: usize) -> Self {
        Self {
            client,
            limiter,
            feeds,
            max_per_feed,
        }
    }

    #[instrument(level = "info", skip_all, fields(source = %feed.name, url = %feed.url))]
    pub async fn fetch_feed(&self, feed: &FeedSource) -> Result<Vec<RawArticle>, SourceError> {
        if let Some(host) = host_of(&feed.url) {
            self.limiter.acquire(&host).await;
        }

        let response = self
            .client
            .get(&feed.url)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&feed.url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: feed.url.clone(),
            }
            .into());
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&feed.url, e))?;

        let articles = parse_feed(&body, feed, self.max_per_feed)?;
        info!(count = articles.len(), "Parsed feed");
        Ok(articles)
    }
}

impl ArticleSource for RssSource {
    #[instrument(level = "info", skip_all, fields(feeds = self.feeds.len()))]
    async fn collect(&self) -> SourceBatch {
        let results: Vec<_> = stream::iter(&self.feeds)
            .map(|feed| async move { (feed, self.fetch_feed(feed).await) })
            .buffered(FEED_CONCURRENCY)
            .collect()
            .await;

        let mut listed = Vec::new();
        let mut failed_sources = 0;
        for (feed, result) in results {
            match result {
                Ok(articles) => listed.extend(articles),
                Err(e) => {
                    error!(source = %feed.name, url = %feed.url, error = %e, "Feed failed; skipping");
                    failed_sources += 1;
                }
            }
        }

        // The same story often appears under several category feeds.
        let total = listed.len();
        let batch = SourceBatch {
            articles: listed
                .into_iter()
                .unique_by(|a| a.source_url.clone())
                .collect(),
            failed_sources,
        };
        debug!(duplicates = total - batch.articles.len(), "Dropped cross-feed duplicates");

        info!(
            articles = batch.articles.len(),
            failed_sources = batch.failed_sources,
            "Collected articles"
        );
        batch
    }
}
