use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use http::Method;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, GetOptions, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use strata_core::StorageBackend;

use crate::error::{StorageError, StorageResult};
use crate::pathname::{content_type_from_filename, validate_pathname};
use crate::traits::Storage;
use crate::types::{
    advisory_expiry, with_random_suffix, Access, ByteStream, CopyOptions, GetUrlOptions,
    HeadResult, ListOptions, ListResult, ObjectSummary, ProviderCapabilities, UploadContent,
    UploadOptions, UploadResult,
};

const DEFAULT_LIST_LIMIT: usize = 1000;

/// User-metadata key holding the requested [`Access`] level.
const ACCESS_METADATA_KEY: &str = "strata-access";

/// SigV4 refuses presigned URLs that live longer than seven days.
const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 3600);

/// S3 storage implementation
///
/// Uses native server-side copy and SigV4 presigned URLs, so both `copy` and
/// `get_url` expiry are honoured exactly. Objects carry no ACL: reads go through
/// presigned URLs or the bucket policy, and the requested access level is only
/// recorded as object metadata.
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        // Credentials come from the environment once, here.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::ConfigError(e.to_string()))?,
        );

        Ok(S3Storage {
            store: store.clone(),
            signer: Some(store),
            bucket,
            region,
            endpoint_url,
        })
    }

    /// Wrap any `object_store` implementation. Without a signer, `get_url` falls
    /// back to permanent URLs with an advisory expiry.
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: String, region: String) -> Self {
        S3Storage {
            store,
            signer: None,
            bucket,
            region,
            endpoint_url: None,
        }
    }

    /// Generate public URL for an S3 object
    ///
    /// For AWS S3: https://{bucket}.s3.{region}.amazonaws.com/{key}
    /// For S3-compatible providers: path-style {endpoint}/{bucket}/{key}
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }

    fn location(pathname: &str) -> StorageResult<Path> {
        validate_pathname(pathname)?;
        Ok(Path::from(pathname.to_string()))
    }

    fn build_attributes(content_type: &str, options: UploadOptions) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        if let Some(cache_control) = options.cache_control {
            attributes.insert(Attribute::CacheControl, cache_control.into());
        }
        if let Some(disposition) = options.content_disposition {
            attributes.insert(Attribute::ContentDisposition, disposition.into());
        }
        for (key, value) in options.metadata {
            attributes.insert(Attribute::Metadata(key.into()), value.into());
        }
        let access = match options.access {
            Access::Public => "public",
            Access::Private => "private",
        };
        attributes.insert(
            Attribute::Metadata(ACCESS_METADATA_KEY.into()),
            access.to_string().into(),
        );
        attributes
    }

    /// Copy by reading and rewriting, for when the target's attributes differ
    /// from the source's.
    async fn rewrite_copy(&self, from: &Path, to: &Path, content_type: String) -> ObjectResult<()> {
        let source = self.store.get(from).await?;
        let mut attributes = source.attributes.clone();
        attributes.insert(Attribute::ContentType, content_type.into());
        let bytes = source.bytes().await?;

        let put_options = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(to, PutPayload::from(bytes), put_options)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        pathname: &str,
        content: UploadContent,
        options: UploadOptions,
    ) -> StorageResult<UploadResult> {
        validate_pathname(pathname)?;
        let key = if options.add_random_suffix {
            with_random_suffix(pathname)
        } else {
            pathname.to_string()
        };
        let location = Self::location(&key)?;
        let content_type = options.resolved_content_type(&key);
        let start = std::time::Instant::now();

        if options.access == Access::Public {
            tracing::debug!(
                key = %key,
                "S3 backend sets no object ACL; public reads depend on the bucket policy"
            );
        }

        // object_store takes a single payload; streams are buffered first.
        let bytes = content.into_bytes().await?;
        let size = bytes.len() as u64;

        let put_options = PutOptions {
            attributes: Self::build_attributes(&content_type, options),
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(bytes), put_options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(UploadResult {
            url: self.generate_url(&key),
            pathname: key,
            content_type,
            size,
        })
    }

    async fn download(&self, pathname: &str) -> StorageResult<Vec<u8>> {
        let start = std::time::Instant::now();
        let location = Self::location(pathname)?;

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(pathname.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %pathname,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %pathname,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes.to_vec())
    }

    async fn download_stream(&self, pathname: &str) -> StorageResult<ByteStream> {
        let start = std::time::Instant::now();
        let location = Self::location(pathname)?;

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(pathname.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let bucket = self.bucket.clone();
        let key = pathname.to_string();

        let stream = result.into_stream().map(move |res| match res {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                Err(StorageError::DownloadFailed(e.to_string()))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn get_url(&self, pathname: &str, options: GetUrlOptions) -> StorageResult<String> {
        if self.head(pathname).await?.is_none() {
            return Err(StorageError::NotFound(pathname.to_string()));
        }
        let location = Self::location(pathname)?;

        let Some(signer) = self.signer.as_ref() else {
            let expires_at = advisory_expiry(options.expires_in);
            return Ok(format!("{}?expires={}", self.generate_url(pathname), expires_at));
        };

        let expires_in = if options.expires_in > MAX_PRESIGN_EXPIRY {
            tracing::debug!(
                key = %pathname,
                requested_secs = options.expires_in.as_secs(),
                "S3 presigned URL expiry capped at seven days"
            );
            MAX_PRESIGN_EXPIRY
        } else {
            options.expires_in
        };

        if options.download || options.filename.is_some() || options.content_type.is_some() {
            // Response overrides would have to be part of the signed query.
            tracing::debug!(
                key = %pathname,
                "S3 presigned URL ignores download/filename/content-type hints"
            );
        }

        let url_result: ObjectResult<_> = signer
            .signed_url(Method::GET, &location, expires_in)
            .await;

        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(url)
    }

    async fn delete(&self, pathname: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::location(pathname)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %pathname,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %pathname,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: CopyOptions,
    ) -> StorageResult<UploadResult> {
        let start = std::time::Instant::now();
        let from_location = Self::location(from)?;
        let to_location = Self::location(to)?;

        let copy_result: ObjectResult<()> = match options.content_type {
            Some(content_type) => {
                self.rewrite_copy(&from_location, &to_location, content_type)
                    .await
            }
            // S3 refuses a copy onto itself that changes nothing.
            None if from_location == to_location => self
                .store
                .head(&from_location)
                .await
                .map(|_| ()),
            None => self.store.copy(&from_location, &to_location).await,
        };

        copy_result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(from.to_string()),
            other => StorageError::BackendError(other.to_string()),
        })?;

        let head = self
            .head(to)
            .await?
            .ok_or_else(|| StorageError::BackendError(format!("copy target {} missing", to)))?;

        tracing::info!(
            from_key = %from,
            to_key = %to,
            size_bytes = head.size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        Ok(UploadResult {
            url: head.url,
            pathname: head.pathname,
            content_type: head.content_type,
            size: head.size,
        })
    }

    async fn head(&self, pathname: &str) -> StorageResult<Option<HeadResult>> {
        let location = Self::location(pathname)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        let result = match self.store.get_opts(&location, options).await {
            Ok(result) => result,
            Err(ObjectStoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };

        let mut content_type = None;
        let mut cache_control = None;
        let mut content_disposition = None;
        let mut metadata = HashMap::new();
        let mut access = Access::default();
        for (attribute, value) in result.attributes.iter() {
            let value: &str = value.as_ref();
            match attribute {
                Attribute::ContentType => content_type = Some(value.to_string()),
                Attribute::CacheControl => cache_control = Some(value.to_string()),
                Attribute::ContentDisposition => content_disposition = Some(value.to_string()),
                Attribute::Metadata(key) if *key == ACCESS_METADATA_KEY => {
                    if value == "private" {
                        access = Access::Private;
                    }
                }
                Attribute::Metadata(key) => {
                    metadata.insert(key.to_string(), value.to_string());
                }
                _ => {}
            }
        }

        Ok(Some(HeadResult {
            url: self.generate_url(pathname),
            pathname: pathname.to_string(),
            content_type: content_type
                .unwrap_or_else(|| content_type_from_filename(pathname).to_string()),
            size: result.meta.size,
            uploaded_at: result.meta.last_modified,
            cache_control,
            content_disposition,
            metadata,
            access,
        }))
    }

    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let prefix = options.prefix.unwrap_or_default();

        // object_store prefixes match whole segments; list the enclosing
        // directory and filter on the raw string prefix.
        let prefix_dir = prefix
            .rsplit_once('/')
            .map(|(dir, _)| Path::from(dir.to_string()));

        let stream = match options.cursor.as_deref() {
            Some(cursor) => self
                .store
                .list_with_offset(prefix_dir.as_ref(), &Path::from(cursor.to_string())),
            None => self.store.list(prefix_dir.as_ref()),
        };

        let mut page: Vec<_> = stream
            .try_filter(|meta| future::ready(meta.location.to_string().starts_with(&prefix)))
            .take(limit + 1)
            .try_collect()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let has_more = page.len() > limit;
        page.truncate(limit);

        let objects: Vec<ObjectSummary> = page
            .into_iter()
            .map(|meta| {
                let pathname = meta.location.to_string();
                ObjectSummary {
                    url: self.generate_url(&pathname),
                    pathname,
                    size: meta.size,
                    uploaded_at: meta.last_modified,
                }
            })
            .collect();

        Ok(ListResult {
            cursor: if has_more {
                objects.last().map(|o| o.pathname.clone())
            } else {
                None
            },
            objects,
            has_more,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            native_copy: true,
            native_expiring_urls: self.signer.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn storage() -> S3Storage {
        S3Storage::with_store(
            Arc::new(InMemory::new()),
            "acme-files".to_string(),
            "us-east-1".to_string(),
        )
    }

    #[tokio::test]
    async fn test_upload_head_download() {
        let storage = storage();
        let result = storage
            .upload(
                "attachments/org1/policy.pdf",
                b"%PDF".as_slice().into(),
                UploadOptions::default().with_metadata("version", "3"),
            )
            .await
            .unwrap();

        assert_eq!(
            result.url,
            "https://acme-files.s3.us-east-1.amazonaws.com/attachments/org1/policy.pdf"
        );
        assert_eq!(result.content_type, "application/pdf");

        let head = storage.head("attachments/org1/policy.pdf").await.unwrap().unwrap();
        assert_eq!(head.size, 4);
        assert_eq!(head.content_type, "application/pdf");
        assert_eq!(head.metadata.get("version").map(String::as_str), Some("3"));

        assert_eq!(
            storage.download("attachments/org1/policy.pdf").await.unwrap(),
            b"%PDF".to_vec()
        );
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let storage = storage();
        assert!(storage.head("attachments/org1/none").await.unwrap().is_none());
        assert!(!storage.exists("attachments/org1/none").await);
        assert!(storage.download("attachments/org1/none").await.unwrap_err().is_not_found());
        assert!(storage
            .get_url("attachments/org1/none", GetUrlOptions::default())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(storage
            .copy("attachments/org1/none", "attachments/org1/other", CopyOptions::default())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_twice_succeeds() {
        let storage = storage();
        storage
            .upload("attachments/org1/a.txt", b"a".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();
        storage.delete("attachments/org1/a.txt").await.unwrap();
        storage.delete("attachments/org1/a.txt").await.unwrap();
        assert!(!storage.exists("attachments/org1/a.txt").await);
    }

    #[tokio::test]
    async fn test_native_copy() {
        let storage = storage();
        storage
            .upload(
                "attachments/org1/v1.pdf",
                b"version one".as_slice().into(),
                UploadOptions::default(),
            )
            .await
            .unwrap();

        let copied = storage
            .copy(
                "attachments/org1/v1.pdf",
                "attachments/org1/v2.pdf",
                CopyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(copied.pathname, "attachments/org1/v2.pdf");
        assert_eq!(copied.size, 11);
        assert_eq!(
            storage.download("attachments/org1/v2.pdf").await.unwrap(),
            b"version one".to_vec()
        );
    }

    #[tokio::test]
    async fn test_copy_onto_itself_keeps_content() {
        let storage = storage();
        let path = "attachments/org1/a.pdf";
        storage
            .upload(path, b"precious bytes".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();

        let copied = storage.copy(path, path, CopyOptions::default()).await.unwrap();
        assert_eq!(copied.size, 14);
        assert_eq!(storage.download(path).await.unwrap(), b"precious bytes".to_vec());
    }

    #[tokio::test]
    async fn test_copy_content_type_override_keeps_other_attributes() {
        let storage = storage();
        storage
            .upload(
                "attachments/org1/export.bin",
                b"a,b".as_slice().into(),
                UploadOptions::default()
                    .with_cache_control("max-age=60")
                    .with_metadata("version", "3")
                    .with_access(Access::Private),
            )
            .await
            .unwrap();

        let copied = storage
            .copy(
                "attachments/org1/export.bin",
                "attachments/org1/export.csv",
                CopyOptions::default().with_content_type("text/csv"),
            )
            .await
            .unwrap();
        assert_eq!(copied.content_type, "text/csv");

        let head = storage.head("attachments/org1/export.csv").await.unwrap().unwrap();
        assert_eq!(head.content_type, "text/csv");
        assert_eq!(head.cache_control.as_deref(), Some("max-age=60"));
        assert_eq!(head.metadata.get("version").map(String::as_str), Some("3"));
        assert_eq!(head.access, Access::Private);
        assert_eq!(
            storage.download("attachments/org1/export.csv").await.unwrap(),
            b"a,b".to_vec()
        );
    }

    #[tokio::test]
    async fn test_access_round_trips_outside_user_metadata() {
        let storage = storage();
        storage
            .upload(
                "attachments/org1/private.txt",
                b"x".as_slice().into(),
                UploadOptions::default().with_access(Access::Private),
            )
            .await
            .unwrap();
        storage
            .upload("attachments/org1/public.txt", b"x".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();

        let private = storage.head("attachments/org1/private.txt").await.unwrap().unwrap();
        assert_eq!(private.access, Access::Private);
        assert!(private.metadata.is_empty());
        let public = storage.head("attachments/org1/public.txt").await.unwrap().unwrap();
        assert_eq!(public.access, Access::Public);
    }

    #[tokio::test]
    async fn test_unsigned_url_expiry_saturates() {
        let storage = storage();
        storage
            .upload("attachments/org1/a.txt", b"a".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();

        let url = storage
            .get_url(
                "attachments/org1/a.txt",
                GetUrlOptions {
                    expires_in: Duration::MAX,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            url,
            format!(
                "https://acme-files.s3.us-east-1.amazonaws.com/attachments/org1/a.txt?expires={}",
                i64::MAX
            )
        );
    }

    #[tokio::test]
    async fn test_list_with_partial_prefix_and_cursor() {
        let storage = storage();
        for path in [
            "attachments/org1/a.txt",
            "attachments/org1/b.txt",
            "attachments/org10/c.txt",
            "attachments/org2/d.txt",
        ] {
            storage
                .upload(path, b"x".as_slice().into(), UploadOptions::default())
                .await
                .unwrap();
        }

        let first = storage
            .list(ListOptions {
                prefix: Some("attachments/org1".to_string()),
                limit: Some(2),
                cursor: None,
            })
            .await
            .unwrap();
        assert!(first.has_more);
        assert_eq!(first.objects.len(), 2);

        let second = storage
            .list(ListOptions {
                prefix: Some("attachments/org1".to_string()),
                limit: Some(2),
                cursor: first.cursor.clone(),
            })
            .await
            .unwrap();
        assert!(!second.has_more);
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].pathname, "attachments/org10/c.txt");
    }

    #[tokio::test]
    async fn test_rejects_traversal_before_backend() {
        let storage = storage();
        let err = storage
            .upload("attachments/../x", b"x".as_slice().into(), UploadOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(storage.delete("a/../../b").await.unwrap_err().is_validation());
    }

    #[test]
    fn test_capabilities_without_signer() {
        let caps = storage().capabilities();
        assert!(caps.native_copy);
        assert!(!caps.native_expiring_urls);
    }
}
