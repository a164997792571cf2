//! HTTP client for the hosted backend.
//!
//! Rows live in the `warranties` table behind the PostgREST endpoint and
//! images in a public Storage bucket. Every request carries the project's
//! anon key; signed-in requests also carry the user's access token.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Result, WarrantyError};
use crate::models::{NewWarranty, OwnerId, Warranty};
use crate::repository::WarrantyRepository;
use crate::storage::ObjectStorage;

const TABLE: &str = "warranties";

/// Client for the REST and Storage APIs
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: Url,
    anon_key: String,
    access_token: Option<String>,
    bucket: String,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.remote.url)
            .map_err(|e| WarrantyError::Config(format!("invalid remote url: {e}")))?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| WarrantyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            anon_key: config.remote.anon_key.clone(),
            access_token: None,
            bucket: config.storage.bucket.clone(),
        })
    }

    /// Act as the signed-in user
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| WarrantyError::Config("remote url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `/rest/v1/warranties`
    pub fn table_url(&self) -> Result<Url> {
        self.endpoint(&["rest", "v1", TABLE])
    }

    /// `/storage/v1/object/{bucket}/{path}`
    pub fn object_url(&self, path: &str) -> Result<Url> {
        let mut segments = vec!["storage", "v1", "object", self.bucket.as_str()];
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        self.endpoint(&segments)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request.header("apikey", &self.anon_key).bearer_auth(token)
    }

    async fn rows<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Remote store request failed");
            return Err(WarrantyError::Store(format!("{status}: {body}")));
        }
        Ok(response.json().await?)
    }

    fn single(rows: Vec<Warranty>) -> Result<Warranty> {
        rows.into_iter()
            .next()
            .ok_or_else(|| WarrantyError::Store("row no longer exists".into()))
    }
}

#[async_trait]
impl WarrantyRepository for SupabaseClient {
    #[instrument(skip(self))]
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Warranty>> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{owner_id}"))
            .append_pair("order", "due_date.asc");
        let response = self.authorize(self.client.get(url)).send().await?;
        let rows: Vec<Warranty> = Self::rows(response).await?;
        debug!(count = rows.len(), "Fetched warranties");
        Ok(rows)
    }

    #[instrument(skip(self, fields))]
    async fn insert(&self, fields: NewWarranty) -> Result<Warranty> {
        let request = self
            .client
            .post(self.table_url()?)
            .header("Prefer", "return=representation")
            .json(&fields);
        let response = self.authorize(request).send().await?;
        Self::single(Self::rows(response).await?)
    }

    #[instrument(skip(self))]
    async fn update_notification_id(&self, id: Uuid, notification_id: String) -> Result<Warranty> {
        let mut url = self.table_url()?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        let request = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "notification_id": notification_id }));
        let response = self.authorize(request).send().await?;
        Self::single(Self::rows(response).await?)
    }
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let request = self
            .client
            .post(self.object_url(path)?)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| WarrantyError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, path, "Image upload rejected");
            return Err(WarrantyError::Upload(format!("{status}: {body}")));
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        let mut segments = vec!["storage", "v1", "object", "public", self.bucket.as_str()];
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        self.endpoint(&segments)
            .map_or_else(|_| format!("{}/{path}", self.bucket), String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> SupabaseClient {
        let mut config = AppConfig::default();
        config.remote.url = url.to_string();
        config.remote.anon_key = "anon".to_string();
        SupabaseClient::new(&config).expect("client")
    }

    #[test]
    fn test_table_url() {
        let url = client("https://abc.supabase.co").table_url().expect("url");
        assert_eq!(url.as_str(), "https://abc.supabase.co/rest/v1/warranties");
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let url = client("https://abc.supabase.co/").table_url().expect("url");
        assert_eq!(url.as_str(), "https://abc.supabase.co/rest/v1/warranties");
    }

    #[test]
    fn test_object_and_public_urls() {
        let client = client("https://abc.supabase.co");
        let path = "0b7a4a38-9a2e-4bb0-8b76-3a5f3d2c1e00/photo.jpg";

        assert_eq!(
            client.object_url(path).expect("url").as_str(),
            "https://abc.supabase.co/storage/v1/object/warranty-images/0b7a4a38-9a2e-4bb0-8b76-3a5f3d2c1e00/photo.jpg"
        );
        assert_eq!(
            client.public_url(path),
            "https://abc.supabase.co/storage/v1/object/public/warranty-images/0b7a4a38-9a2e-4bb0-8b76-3a5f3d2c1e00/photo.jpg"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let mut config = AppConfig::default();
        config.remote.url = "not a url".to_string();
        assert!(matches!(
            SupabaseClient::new(&config),
            Err(WarrantyError::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", client("https://abc.supabase.co").with_access_token("secret"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
