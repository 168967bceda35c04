//! Supabase backend over its REST endpoints.
//!
//! - images: `POST /storage/v1/object/{bucket}/{path}` with `x-upsert: true`,
//!   served from `/storage/v1/object/public/{bucket}/{path}`
//! - articles: PostgREST on `/rest/v1/{table}`; a unique `source_url`
//!   column turns duplicate inserts into HTTP 409

use super::{ArticleStore, ImageStore, InsertOutcome};
use crate::config::SupabaseConfig;
use crate::error::StoreError;
use crate::models::ArticleRecord;
use crate::utils::truncate_for_log;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
    table: String,
}

impl SupabaseStore {
    pub fn new(client: Client, config: &SupabaseConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
            table: config.table.clone(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn lookup_url(&self, source_url: &str) -> String {
        format!(
            "{}?source_url=eq.{}&select=id&limit=1",
            self.table_url(),
            urlencoding::encode(source_url)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
    }
}

/// Turn a non-success response into [`StoreError::Http`] with a short body.
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        body: truncate_for_log(&body, 300),
    })
}

impl ImageStore for SupabaseStore {
    #[instrument(level = "info", skip_all, fields(path = %path, bytes = bytes.len()))]
    async fn put_image(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let response = self
            .authorized(self.client.post(self.upload_url(path)))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        check(response).await?;
        Ok(self.public_url(path))
    }
}

impl ArticleStore for SupabaseStore {
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError> {
        let response = self
            .authorized(self.client.get(self.lookup_url(source_url)))
            .send()
            .await?;
        let body = check(response).await?.text().await?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&body)?;
        Ok(!rows.is_empty())
    }

    #[instrument(level = "info", skip_all, fields(source_url = %record.source_url))]
    async fn insert(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError> {
        let payload = serde_json::to_vec(record)?;
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .body(payload)
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            debug!("Article already stored");
            return Ok(InsertOutcome::Duplicate);
        }
        check(response).await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}?select=id&limit=1", self.table_url());
        let response = self.authorized(self.client.get(url)).send().await?;
        check(response).await?;
        Ok(())
    }
}
