use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use strata_core::StorageBackend;
use url::Url;

use crate::error::{StorageError, StorageResult};
use crate::pathname::{content_type_from_filename, validate_pathname};
use crate::traits::Storage;
use crate::types::{
    advisory_expiry, Access, ByteStream, CopyOptions, GetUrlOptions, HeadResult, ListOptions,
    ListResult, ObjectSummary, ProviderCapabilities, UploadContent, UploadOptions, UploadResult,
};

pub const DEFAULT_BLOB_API_URL: &str = "https://blob.vercel-storage.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutBlobResponse {
    url: String,
    pathname: String,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadBlobResponse {
    url: String,
    pathname: String,
    content_type: Option<String>,
    size: u64,
    uploaded_at: DateTime<Utc>,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    #[serde(default)]
    access: Access,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBlobItem {
    url: String,
    pathname: String,
    size: u64,
    uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBlobResponse {
    blobs: Vec<ListBlobItem>,
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

/// Blob storage over the Vercel Blob HTTP API.
///
/// The API has no server-side copy and no expiring links: `copy` downloads and
/// re-uploads, and `get_url` returns the permanent object URL with the expiry
/// attached as a hint only. Custom metadata is not supported and is dropped.
#[derive(Clone)]
pub struct BlobStorage {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for BlobStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStorage")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BlobStorage {
    /// A missing token does not fail construction; every call fails instead.
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> StorageResult<Self> {
        let token = token.filter(|t| !t.trim().is_empty());
        if token.is_none() {
            tracing::warn!("BLOB_READ_WRITE_TOKEN is not set; blob storage calls will fail");
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(BlobStorage {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn token(&self) -> StorageResult<&str> {
        self.token.as_deref().ok_or_else(|| {
            StorageError::ConfigError("BLOB_READ_WRITE_TOKEN is not configured".to_string())
        })
    }

    fn object_endpoint(&self, pathname: &str) -> String {
        let encoded: Vec<String> = pathname
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.api_url, encoded.join("/"))
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<Response> {
        let token = self.token()?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StorageError::BackendError(format!("Failed to send request: {}", e)))
    }

    async fn fetch_object(&self, pathname: &str) -> StorageResult<Response> {
        let head = self
            .head(pathname)
            .await?
            .ok_or_else(|| StorageError::NotFound(pathname.to_string()))?;

        let response = self
            .client
            .get(&head.url)
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(pathname.to_string())),
            _ => Err(StorageError::DownloadFailed(describe_failure(response).await)),
        }
    }
}

async fn describe_failure(response: Response) -> String {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    format!("status {}: {}", status, error_text)
}

/// `max-age` seconds from a Cache-Control value.
fn max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|secs| secs.trim().parse().ok())
    })
}

#[async_trait]
impl Storage for BlobStorage {
    async fn upload(
        &self,
        pathname: &str,
        content: UploadContent,
        options: UploadOptions,
    ) -> StorageResult<UploadResult> {
        validate_pathname(pathname)?;
        self.token()?;
        let start = std::time::Instant::now();
        let content_type = options.resolved_content_type(pathname);

        if !options.metadata.is_empty() {
            tracing::debug!(
                pathname = %pathname,
                keys = options.metadata.len(),
                "Blob backend does not store custom metadata; dropping"
            );
        }

        let bytes = content.into_bytes().await?;
        let size = bytes.len() as u64;

        let mut request = self
            .client
            .put(self.object_endpoint(pathname))
            .header("x-content-type", content_type.as_str())
            .header(
                "x-add-random-suffix",
                if options.add_random_suffix { "1" } else { "0" },
            )
            .header("x-allow-overwrite", "1")
            .header(
                "x-access",
                match options.access {
                    Access::Public => "public",
                    Access::Private => "private",
                },
            )
            .body(bytes);
        if let Some(secs) = options.cache_control.as_deref().and_then(max_age) {
            request = request.header("x-cache-control-max-age", secs.to_string());
        }
        if let Some(ref disposition) = options.content_disposition {
            request = request.header("x-content-disposition", disposition.as_str());
        }

        let response = self.send(request).await?;
        if !response.status().is_success() {
            let reason = describe_failure(response).await;
            tracing::error!(
                pathname = %pathname,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                reason = %reason,
                "Blob upload failed"
            );
            return Err(StorageError::UploadFailed(reason));
        }

        let body: PutBlobResponse = response
            .json()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to parse response: {}", e)))?;

        tracing::info!(
            pathname = %body.pathname,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob upload successful"
        );

        Ok(UploadResult {
            url: body.url,
            pathname: body.pathname,
            content_type: body.content_type.unwrap_or(content_type),
            size,
        })
    }

    async fn download(&self, pathname: &str) -> StorageResult<Vec<u8>> {
        let start = std::time::Instant::now();
        let response = self.fetch_object(pathname).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::info!(
            pathname = %pathname,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob download successful"
        );

        Ok(bytes.to_vec())
    }

    async fn download_stream(&self, pathname: &str) -> StorageResult<ByteStream> {
        let response = self.fetch_object(pathname).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StorageError::DownloadFailed(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn get_url(&self, pathname: &str, options: GetUrlOptions) -> StorageResult<String> {
        let head = self
            .head(pathname)
            .await?
            .ok_or_else(|| StorageError::NotFound(pathname.to_string()))?;

        let mut url = Url::parse(&head.url)
            .map_err(|e| StorageError::BackendError(format!("Invalid object URL: {}", e)))?;
        let expires_at = advisory_expiry(options.expires_in);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("expires", &expires_at.to_string());
            if options.download {
                query.append_pair("download", "1");
            }
            if let Some(ref filename) = options.filename {
                query.append_pair("filename", filename);
            }
            if let Some(ref content_type) = options.content_type {
                query.append_pair("content-type", content_type);
            }
        }

        Ok(url.to_string())
    }

    async fn delete(&self, pathname: &str) -> StorageResult<()> {
        validate_pathname(pathname)?;
        let start = std::time::Instant::now();

        let request = self
            .client
            .post(format!("{}/delete", self.api_url))
            .json(&serde_json::json!({ "urls": [pathname] }));
        let response = self.send(request).await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                tracing::debug!(pathname = %pathname, "Blob delete: object already absent");
            }
            _ => {
                let reason = describe_failure(response).await;
                tracing::error!(
                    pathname = %pathname,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    reason = %reason,
                    "Blob delete failed"
                );
                return Err(StorageError::DeleteFailed(reason));
            }
        }

        tracing::info!(
            pathname = %pathname,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob delete successful"
        );

        Ok(())
    }

    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: CopyOptions,
    ) -> StorageResult<UploadResult> {
        validate_pathname(to)?;
        let source = self
            .head(from)
            .await?
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;

        tracing::debug!(
            from = %from,
            to = %to,
            size_bytes = source.size,
            "Blob copy: no server-side copy, downloading and re-uploading"
        );

        let bytes = self.download(from).await?;
        let upload_options = UploadOptions {
            content_type: Some(options.content_type.unwrap_or(source.content_type)),
            cache_control: source.cache_control,
            content_disposition: source.content_disposition,
            access: source.access,
            ..Default::default()
        };

        self.upload(to, bytes.into(), upload_options).await
    }

    async fn head(&self, pathname: &str) -> StorageResult<Option<HeadResult>> {
        validate_pathname(pathname)?;
        let request = self
            .client
            .get(format!("{}/", self.api_url))
            .query(&[("url", pathname)]);
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(StorageError::BackendError(describe_failure(response).await));
            }
            _ => {}
        }

        let body: HeadBlobResponse = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("Failed to parse response: {}", e)))?;

        Ok(Some(HeadResult {
            content_type: body
                .content_type
                .unwrap_or_else(|| content_type_from_filename(&body.pathname).to_string()),
            url: body.url,
            pathname: body.pathname,
            size: body.size,
            uploaded_at: body.uploaded_at,
            cache_control: body.cache_control,
            content_disposition: body.content_disposition,
            metadata: Default::default(),
            access: body.access,
        }))
    }

    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(prefix) = options.prefix {
            query.push(("prefix", prefix));
        }
        if let Some(limit) = options.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = options.cursor {
            query.push(("cursor", cursor));
        }

        let request = self.client.get(format!("{}/", self.api_url)).query(&query);
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(StorageError::BackendError(describe_failure(response).await));
        }

        let body: ListBlobResponse = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("Failed to parse response: {}", e)))?;

        Ok(ListResult {
            objects: body
                .blobs
                .into_iter()
                .map(|blob| ObjectSummary {
                    url: blob.url,
                    pathname: blob.pathname,
                    size: blob.size,
                    uploaded_at: blob.uploaded_at,
                })
                .collect(),
            cursor: body.cursor.filter(|_| body.has_more),
            has_more: body.has_more,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Blob
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            native_copy: false,
            native_expiring_urls: false,
        }
    }
}
