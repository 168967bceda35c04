//! Pre-download candidate filter.
//!
//! Rules run in a fixed order and the first match wins. Nothing here opens
//! an image or touches the network: false negatives are caught later by the
//! scorer, and a good photo rejected by a URL keyword is an accepted cost.

use crate::config::QualityConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use url::Url;

/// Vector, animated and icon formats.
const EXCLUDED_EXTENSIONS: &[&str] = &["svg", "gif", "ico"];

const LOGO_URL_KEYWORDS: &[&str] = &[
    "logo",
    "icon",
    "brand",
    "emblem",
    "sprite",
    "favicon",
    "avatar",
    "badge",
    "symbol",
    "stamp",
    "watermark",
    "banner-ad",
    "advertisement",
    "sponsor",
    "promo",
    "btn",
    "button",
    "arrow",
    "social",
    "share",
    "twitter",
    "facebook",
    "instagram",
    "linkedin",
    "youtube",
    "tiktok",
    "whatsapp",
    "telegram",
    "pinterest",
    "play-button",
    "loading",
    "spinner",
    "preloader",
    "placeholder",
    "default",
    "blank",
    "empty",
    "null",
    "1x1",
    "pixel",
    "spacer",
];

const STOCK_WATERMARK_KEYWORDS: &[&str] = &[
    "shutterstock",
    "gettyimages",
    "istock",
    "adobestock",
    "depositphotos",
    "dreamstime",
    "alamy",
    "123rf",
    "fotolia",
    "preview",
    "sample",
    "watermark",
    "thumbnail",
];

/// Inline data URIs shorter than this are tiny placeholders.
const MIN_DATA_URI_LEN: usize = 500;

static TRACKING_PIXEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+x\d+/").expect("static regex is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum FilterRejection {
    Extension(&'static str),
    LogoKeyword(&'static str),
    StockKeyword(&'static str),
    TooSmall { width: u32, height: u32 },
    AspectRatio(f32),
    TrackingPixel,
    TinyDataUri,
}

impl fmt::Display for FilterRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRejection::Extension(ext) => write!(f, "Excluded extension: .{ext}"),
            FilterRejection::LogoKeyword(k) => write!(f, "Logo keyword in URL: {k}"),
            FilterRejection::StockKeyword(k) => write!(f, "Stock watermark keyword: {k}"),
            FilterRejection::TooSmall { width, height } => {
                write!(f, "Too small: {width}x{height}")
            }
            FilterRejection::AspectRatio(ratio) => write!(f, "Bad aspect ratio: {ratio:.2}"),
            FilterRejection::TrackingPixel => write!(f, "Tracking pixel pattern"),
            FilterRejection::TinyDataUri => write!(f, "Base64 tiny image"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Accept,
    Reject(FilterRejection),
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }

    /// `"OK"` for accepted candidates, the rejection reason otherwise.
    pub fn reason(&self) -> String {
        match self {
            FilterDecision::Accept => "OK".to_string(),
            FilterDecision::Reject(r) => r.to_string(),
        }
    }
}

/// Pure URL/dimension predicate applied before any download.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    min_width: u32,
    min_height: u32,
    min_aspect_ratio: f32,
    max_aspect_ratio: f32,
}

impl CandidateFilter {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_width: config.min_width,
            min_height: config.min_height,
            min_aspect_ratio: config.min_aspect_ratio,
            max_aspect_ratio: config.max_aspect_ratio,
        }
    }

    /// Decide whether `url` is worth downloading.
    ///
    /// `known_size` is `(width, height)` when the source advertised it;
    /// zero in either position means unknown.
    pub fn should_process(&self, url: &str, known_size: Option<(u32, u32)>) -> FilterDecision {
        match self.first_rejection(url, known_size) {
            Some(rejection) => FilterDecision::Reject(rejection),
            None => FilterDecision::Accept,
        }
    }

    /// [`should_process`](Self::should_process) with whatever size the URL's
    /// own query string advertises.
    pub fn should_fetch(&self, url: &str) -> FilterDecision {
        self.should_process(url, dimensions_from_url(url))
    }

    /// Filter decision for every URL, in input order.
    pub fn batch_filter<'a, I>(&self, urls: I) -> Vec<(String, FilterDecision)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        urls.into_iter()
            .map(|url| (url.to_string(), self.should_fetch(url)))
            .collect()
    }

    fn first_rejection(&self, url: &str, known_size: Option<(u32, u32)>) -> Option<FilterRejection> {
        let lower = url.to_lowercase();

        if let Some(ext) = extension_of(&lower) {
            if let Some(excluded) = EXCLUDED_EXTENSIONS.iter().find(|e| **e == ext) {
                return Some(FilterRejection::Extension(*excluded));
            }
        }

        if let Some(k) = LOGO_URL_KEYWORDS.iter().find(|k| lower.contains(*k)) {
            return Some(FilterRejection::LogoKeyword(*k));
        }

        if let Some(k) = STOCK_WATERMARK_KEYWORDS.iter().find(|k| lower.contains(*k)) {
            return Some(FilterRejection::StockKeyword(*k));
        }

        if let Some((width, height)) = known_size {
            let narrow = width > 0 && width < self.min_width;
            let short = height > 0 && height < self.min_height;
            if narrow || short {
                return Some(FilterRejection::TooSmall { width, height });
            }
            if width > 0 && height > 0 {
                let ratio = width as f32 / height as f32;
                if ratio < self.min_aspect_ratio || ratio > self.max_aspect_ratio {
                    return Some(FilterRejection::AspectRatio(ratio));
                }
            }
        }

        if TRACKING_PIXEL.is_match(&lower) || lower.contains("1x1") {
            return Some(FilterRejection::TrackingPixel);
        }

        if lower.starts_with("data:image") && url.len() < MIN_DATA_URI_LEN {
            return Some(FilterRejection::TinyDataUri);
        }

        None
    }
}

/// `(width, height)` from CDN resize parameters (`w`/`width`, `h`/`height`)
/// in the query string; a missing side is 0.
pub fn dimensions_from_url(url: &str) -> Option<(u32, u32)> {
    let parsed = Url::parse(url).ok()?;
    let (mut width, mut height) = (0, 0);
    for (key, value) in parsed.query_pairs() {
        let Ok(n) = value.trim().parse::<u32>() else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "w" | "width" => width = n,
            "h" | "height" => height = n,
            _ => {}
        }
    }
    (width > 0 || height > 0).then_some((width, height))
}

/// Lowercase extension of the URL path's last segment, ignoring query and fragment.
fn extension_of(lower_url: &str) -> Option<String> {
    let path = match Url::parse(lower_url) {
        Ok(parsed) if parsed.scheme() != "data" => parsed.path().to_string(),
        Ok(_) => return None,
        Err(_) => lower_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> CandidateFilter {
        CandidateFilter::new(&QualityConfig::default())
    }

    fn rejection(url: &str) -> FilterRejection {
        match filter().should_process(url, None) {
            FilterDecision::Reject(r) => r,
            FilterDecision::Accept => panic!("expected {url} to be rejected"),
        }
    }

    #[test]
    fn test_accepts_ordinary_photo() {
        let d = filter().should_process("https://images.clarin.com/2025/10/17/foto_de_la_marcha.jpg", None);
        assert!(d.is_accepted());
        assert_eq!(d.reason(), "OK");
    }

    #[test]
    fn test_rejects_excluded_extensions() {
        assert_eq!(rejection("https://a.test/img/mapa.svg"), FilterRejection::Extension("svg"));
        assert_eq!(
            rejection("https://a.test/img/anim.GIF?v=3"),
            FilterRejection::Extension("gif")
        );
        assert_eq!(rejection("https://a.test/favicon.ico"), FilterRejection::Extension("ico"));
    }

    #[test]
    fn test_dimensions_from_query_string() {
        assert_eq!(
            dimensions_from_url("https://cdn.test/a.jpg?w=1200&h=800"),
            Some((1200, 800))
        );
        assert_eq!(
            dimensions_from_url("https://cdn.test/a.jpg?Width=300&quality=80"),
            Some((300, 0))
        );
        assert_eq!(dimensions_from_url("https://cdn.test/a.jpg?v=3"), None);
        assert_eq!(dimensions_from_url("https://cdn.test/a.jpg?w=auto"), None);
        assert_eq!(dimensions_from_url("not a url"), None);
    }

    #[test]
    fn test_should_fetch_uses_advertised_size() {
        let f = filter();
        assert_eq!(
            f.should_fetch("https://cdn.test/foto.jpg?w=300&h=200"),
            FilterDecision::Reject(FilterRejection::TooSmall { width: 300, height: 200 })
        );
        assert_eq!(
            f.should_fetch("https://cdn.test/foto.jpg?w=320"),
            FilterDecision::Reject(FilterRejection::TooSmall { width: 320, height: 0 })
        );
        assert!(matches!(
            f.should_fetch("https://cdn.test/tira.jpg?w=3000&h=400"),
            FilterDecision::Reject(FilterRejection::AspectRatio(_))
        ));
        assert!(f.should_fetch("https://cdn.test/foto.jpg?w=1200&h=800").is_accepted());
        assert!(f.should_fetch("https://cdn.test/foto.jpg").is_accepted());
    }

    #[test]
    fn test_extension_rule_wins_over_keywords() {
        assert_eq!(rejection("https://a.test/logo.svg"), FilterRejection::Extension("svg"));
    }

    #[test]
    fn test_rejects_logo_and_stock_keywords() {
        assert_eq!(
            rejection("https://a.test/assets/Site-Logo-White.png"),
            FilterRejection::LogoKeyword("logo")
        );
        assert_eq!(
            rejection("https://a.test/s/whatsapp.png"),
            FilterRejection::LogoKeyword("whatsapp")
        );
        assert_eq!(
            rejection("https://cdn.gettyimages.test/photo.jpg"),
            FilterRejection::StockKeyword("gettyimages")
        );
    }

    #[test]
    fn test_known_dimensions() {
        let f = filter();
        let url = "https://a.test/photo.jpg";
        assert!(f.should_process(url, Some((1200, 800))).is_accepted());
        assert_eq!(
            f.should_process(url, Some((300, 200))),
            FilterDecision::Reject(FilterRejection::TooSmall { width: 300, height: 200 })
        );
        assert!(matches!(
            f.should_process(url, Some((3000, 600))),
            FilterDecision::Reject(FilterRejection::AspectRatio(_))
        ));
        // Zero means unknown.
        assert!(f.should_process(url, Some((0, 0))).is_accepted());
    }

    #[test]
    fn test_rejects_tracking_pixels() {
        assert_eq!(rejection("https://a.test/resize/640x360/photo.jpg"), FilterRejection::TrackingPixel);
    }

    #[test]
    fn test_rejects_tiny_data_uri() {
        assert_eq!(
            rejection("data:image/png;base64,iVBORw0KGgo="),
            FilterRejection::TinyDataUri
        );
        let large = format!("data:image/jpeg;base64,{}", "A".repeat(600));
        assert!(filter().should_process(&large, None).is_accepted());
    }

    #[test]
    fn test_batch_filter_preserves_order() {
        let results = filter().batch_filter([
            "https://a.test/photo.jpg",
            "https://a.test/icon.png",
        ]);
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_accepted());
        assert_eq!(results[1].0, "https://a.test/icon.png");
        assert_eq!(results[1].1.reason(), "Logo keyword in URL: icon");
    }
}
