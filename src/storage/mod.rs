//! Persistence seams.
//!
//! - [`ImageStore`]: durable home for accepted, re-encoded photos.
//! - [`ArticleStore`]: article records, deduplicated by canonical source URL.
//!
//! [`Backend`] picks the Supabase or local-filesystem implementation at
//! startup and dispatches to it.

pub mod fs;
pub mod supabase;

use crate::error::StoreError;
use crate::models::ArticleRecord;
use crate::utils::slugify_title;
use std::sync::Arc;

pub use fs::FsStore;
pub use supabase::SupabaseStore;

/// Hex digits of the content hash kept in image paths.
const HASH_PREFIX_LEN: usize = 12;
const SLUG_MAX_LEN: usize = 60;

pub trait ImageStore {
    /// Store `bytes` at `path` (overwriting) and return its public URL.
    async fn put_image(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

pub trait ArticleStore {
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError>;
    async fn insert(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError>;
    /// Cheap round trip proving the backend is reachable and authorized.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Deterministic storage path for an image: `{prefix}/{slug}-{hash}.jpg`.
///
/// The same bytes under the same hint always land on the same path, so
/// re-running a pass overwrites rather than duplicates.
pub fn image_path(prefix: &str, slug_hint: &str, sha256_hex: &str) -> String {
    let hash = &sha256_hex[..sha256_hex.len().min(HASH_PREFIX_LEN)];
    let slug = slugify_title(&fold_to_ascii(slug_hint), SLUG_MAX_LEN);
    let prefix = prefix.trim_matches('/');
    match (prefix.is_empty(), slug.is_empty()) {
        (true, true) => format!("{hash}.jpg"),
        (true, false) => format!("{slug}-{hash}.jpg"),
        (false, true) => format!("{prefix}/{hash}.jpg"),
        (false, false) => format!("{prefix}/{slug}-{hash}.jpg"),
    }
}

/// Object keys stay ASCII: accents fold to their base letter, anything
/// else non-ASCII is dropped.
fn fold_to_ascii(s: &str) -> String {
    s.chars()
        .filter_map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => Some('a'),
            'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => Some('e'),
            'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => Some('i'),
            'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => Some('o'),
            'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => Some('u'),
            'ñ' | 'Ñ' => Some('n'),
            'ç' | 'Ç' => Some('c'),
            c if c.is_ascii() => Some(c),
            _ => None,
        })
        .collect()
}

/// The configured persistence backend.
#[derive(Debug)]
pub enum Backend {
    Supabase(SupabaseStore),
    Local(FsStore),
}

impl ImageStore for Backend {
    async fn put_image(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        match self {
            Backend::Supabase(s) => s.put_image(path, bytes, content_type).await,
            Backend::Local(s) => s.put_image(path, bytes, content_type).await,
        }
    }
}

impl ArticleStore for Backend {
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError> {
        match self {
            Backend::Supabase(s) => s.exists(source_url).await,
            Backend::Local(s) => s.exists(source_url).await,
        }
    }

    async fn insert(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError> {
        match self {
            Backend::Supabase(s) => s.insert(record).await,
            Backend::Local(s) => s.insert(record).await,
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Backend::Supabase(s) => s.ping().await,
            Backend::Local(s) => s.ping().await,
        }
    }
}

impl<T: ImageStore> ImageStore for &T {
    async fn put_image(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        (**self).put_image(path, bytes, content_type).await
    }
}

impl<T: ImageStore> ImageStore for Arc<T> {
    async fn put_image(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        (**self).put_image(path, bytes, content_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_path_is_deterministic() {
        let sha = "0123456789abcdef0123456789abcdef";
        let a = image_path("articles", "Dólar hoy: cuánto cotiza", sha);
        let b = image_path("articles", "Dólar hoy: cuánto cotiza", sha);
        assert_eq!(a, b);
        assert_eq!(a, "articles/dolar-hoy-cuanto-cotiza-0123456789ab.jpg");
    }

    #[test]
    fn test_image_path_edge_cases() {
        assert_eq!(image_path("", "", "abc"), "abc.jpg");
        assert_eq!(image_path("/articles/", "!!!", "abcdef"), "articles/abcdef.jpg");
        assert_eq!(image_path("", "Nota", "ff"), "nota-ff.jpg");
    }
}
