//! Local-directory backend for offline runs.
//!
//! Layout under the root:
//! - `images/{path}`: re-encoded photos
//! - `articles.jsonl`: one JSON article record per line

use super::{ArticleStore, ImageStore, InsertOutcome};
use crate::error::StoreError;
use crate::models::ArticleRecord;
use crate::utils::ensure_writable_dir;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{OpenOptions, create_dir_all, read_to_string, write};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const ARTICLES_FILE: &str = "articles.jsonl";
const IMAGES_DIR: &str = "images";

#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    /// Source URLs already on disk, loaded once when the store opens. The
    /// lock also serializes the check-then-append in `insert`.
    known_urls: Mutex<HashSet<String>>,
}

impl FsStore {
    pub async fn new(root: PathBuf) -> Result<Self, StoreError> {
        create_dir_all(root.join(IMAGES_DIR)).await?;
        let known_urls = read_records(&root.join(ARTICLES_FILE))
            .await?
            .into_iter()
            .map(|r| r.source_url)
            .collect::<HashSet<_>>();
        debug!(root = %root.display(), articles = known_urls.len(), "Opened local store");
        Ok(Self {
            root,
            known_urls: Mutex::new(known_urls),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn articles_path(&self) -> PathBuf {
        self.root.join(ARTICLES_FILE)
    }
}

async fn read_records(path: &Path) -> Result<Vec<ArticleRecord>, StoreError> {
    let text = match read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StoreError::from))
        .collect()
}

impl ImageStore for FsStore {
    async fn put_image(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        let target = self.root.join(IMAGES_DIR).join(path);
        if let Some(parent) = target.parent() {
            create_dir_all(parent).await?;
        }
        write(&target, bytes).await?;
        debug!(path = %target.display(), "Wrote image");
        Ok(format!("file://{}", target.display()))
    }
}

impl ArticleStore for FsStore {
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError> {
        Ok(self.known_urls.lock().await.contains(source_url))
    }

    async fn insert(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError> {
        let mut known = self.known_urls.lock().await;
        if known.contains(&record.source_url) {
            return Ok(InsertOutcome::Duplicate);
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.articles_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        known.insert(record.source_url.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let root = self.root.to_string_lossy();
        ensure_writable_dir(&root).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(source_url: &str) -> ArticleRecord {
        ArticleRecord {
            title: "Título".into(),
            subtitle: String::new(),
            excerpt: "Resumen".into(),
            content: "Cuerpo".into(),
            category: "economia".into(),
            source_name: "Ámbito".into(),
            source_url: source_url.into(),
            image_url: "file:///tmp/x.jpg".into(),
            image_source_url: Some("https://a.test/x.jpg".into()),
            image_score: Some(88.0),
            published_at: Utc::now(),
            rewritten: false,
        }
    }

    #[tokio::test]
    async fn test_image_roundtrip_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path().to_path_buf()).await.unwrap();
        let url = store
            .put_image("articles/nota-abc.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        let on_disk = tmp.path().join("images/articles/nota-abc.jpg");
        assert_eq!(std::fs::read(&on_disk).unwrap(), vec![1, 2, 3]);
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("images/articles/nota-abc.jpg"));
    }

    #[tokio::test]
    async fn test_insert_deduplicates_by_source_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path().to_path_buf()).await.unwrap();
        assert!(!store.exists("https://a.test/n1").await.unwrap());
        assert_eq!(
            store.insert(&record("https://a.test/n1")).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert(&record("https://a.test/n1")).await.unwrap(),
            InsertOutcome::Duplicate
        );
        store.insert(&record("https://a.test/n2")).await.unwrap();
        assert!(store.exists("https://a.test/n1").await.unwrap());

        let lines = std::fs::read_to_string(tmp.path().join(ARTICLES_FILE)).unwrap();
        assert_eq!(lines.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_reopened_store_knows_earlier_articles() {
        let tmp = tempfile::tempdir().unwrap();
        let first = FsStore::new(tmp.path().to_path_buf()).await.unwrap();
        first.insert(&record("https://a.test/n1")).await.unwrap();
        drop(first);

        let reopened = FsStore::new(tmp.path().to_path_buf()).await.unwrap();
        // Lookups are served from the index loaded at open.
        std::fs::remove_file(tmp.path().join(ARTICLES_FILE)).unwrap();
        assert!(reopened.exists("https://a.test/n1").await.unwrap());
        assert!(!reopened.exists("https://a.test/n2").await.unwrap());
        assert_eq!(
            reopened.insert(&record("https://a.test/n1")).await.unwrap(),
            InsertOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_ping_on_writable_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path().join("nested")).await.unwrap();
        store.ping().await.unwrap();
        assert_eq!(store.root(), tmp.path().join("nested"));
    }
}
