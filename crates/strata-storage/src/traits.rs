//! Storage abstraction trait
//!
//! This module defines the provider contract that every backend implements.

use async_trait::async_trait;
use strata_core::StorageBackend;

use crate::error::StorageResult;
use crate::types::{
    ByteStream, CopyOptions, GetUrlOptions, HeadResult, ListOptions, ListResult,
    ProviderCapabilities, UploadContent, UploadOptions, UploadResult,
};

/// Storage abstraction trait
///
/// Callers depend on this trait only, so the concrete object store (Blob, S3,
/// local filesystem) can be swapped at configuration time without touching
/// call sites.
///
/// **Pathnames** are relative, bucket-prefixed keys such as
/// `attachments/{org_id}/{file}`. Providers validate them before any backend
/// call; validation failures never reach the network.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `content` under `pathname`.
    ///
    /// With `add_random_suffix` the stored pathname differs from the requested
    /// one; use the returned `pathname` as the durable reference.
    async fn upload(
        &self,
        pathname: &str,
        content: UploadContent,
        options: UploadOptions,
    ) -> StorageResult<UploadResult>;

    /// Download the full object. `NotFound` if absent.
    async fn download(&self, pathname: &str) -> StorageResult<Vec<u8>>;

    /// Download as a lazy, single-pass stream. `NotFound` if absent.
    async fn download_stream(&self, pathname: &str) -> StorageResult<ByteStream>;

    /// Mint a time-boxed access URL. `NotFound` if absent.
    ///
    /// Expiry is enforced by the backend, never by this crate. Backends without
    /// expiring links (see [`ProviderCapabilities::native_expiring_urls`]) return a
    /// permanent URL carrying the expiry only as an advisory hint.
    async fn get_url(&self, pathname: &str, options: GetUrlOptions) -> StorageResult<String>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(&self, pathname: &str) -> StorageResult<()>;

    /// Best-effort bulk delete.
    ///
    /// A failure for one pathname is logged and does not stop the remaining
    /// deletions. Returns the pathnames that could not be deleted.
    async fn delete_many(&self, pathnames: &[String]) -> Vec<String> {
        let mut failed = Vec::new();
        for pathname in pathnames {
            if let Err(e) = self.delete(pathname).await {
                tracing::warn!(
                    error = %e,
                    pathname = %pathname,
                    "Bulk delete: failed to delete object, continuing"
                );
                failed.push(pathname.clone());
            }
        }
        if !failed.is_empty() {
            tracing::warn!(
                requested = pathnames.len(),
                failed = failed.len(),
                "Bulk delete completed with failures"
            );
        }
        failed
    }

    /// Copy `from` to `to`. `NotFound` if the source is absent.
    ///
    /// The copy carries the source content type unless `options` overrides it.
    /// Backends without a native copy primitive download the whole source into
    /// memory and upload it again. Copying an object onto itself leaves it intact.
    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: CopyOptions,
    ) -> StorageResult<UploadResult>;

    /// Whether an object exists. Never fails: any error reads as `false`.
    async fn exists(&self, pathname: &str) -> bool {
        match self.head(pathname).await {
            Ok(head) => head.is_some(),
            Err(e) => {
                tracing::debug!(error = %e, pathname = %pathname, "exists: head failed");
                false
            }
        }
    }

    /// Metadata snapshot, or `None` when the object does not exist.
    async fn head(&self, pathname: &str) -> StorageResult<Option<HeadResult>>;

    /// One page of object summaries.
    async fn list(&self, options: ListOptions) -> StorageResult<ListResult>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    fn capabilities(&self) -> ProviderCapabilities;
}
