#[cfg(feature = "storage-blob")]
use crate::BlobStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use std::sync::Arc;
use strata_core::StorageConfig;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage_backend() {
        #[cfg(feature = "storage-blob")]
        StorageBackend::Blob => {
            let token = config.blob_token().map(String::from);
            Arc::new(BlobStorage::new(config.blob_api_url(), token)?)
        }

        #[cfg(not(feature = "storage-blob"))]
        StorageBackend::Blob => {
            return Err(StorageError::ConfigError(
                "Blob storage backend not available (storage-blob feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.s3_endpoint().map(String::from);

            Arc::new(S3Storage::new(bucket, region, endpoint).await?)
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => {
            return Err(StorageError::ConfigError(
                "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config
                .local_storage_base_url()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
                })?;

            Arc::new(LocalStorage::new(base_path, base_url).await?)
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => {
            return Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }
    };

    tracing::info!(backend = %storage.backend_type(), "Storage backend initialized");
    log_approximations(storage.as_ref());

    Ok(storage)
}

/// Warn once for every contract promise the backend can only approximate.
pub fn log_approximations(storage: &dyn Storage) {
    let backend = storage.backend_type();
    let capabilities = storage.capabilities();

    if !capabilities.native_expiring_urls {
        tracing::warn!(
            backend = %backend,
            approximation = "url_expiry",
            "Storage backend cannot revoke access URLs; get_url expiry is advisory only"
        );
    }
    if !capabilities.native_copy {
        tracing::warn!(
            backend = %backend,
            approximation = "copy",
            "Storage backend has no server-side copy; copy downloads and re-uploads in memory"
        );
    }
}
