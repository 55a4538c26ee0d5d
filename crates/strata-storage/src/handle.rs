//! Process-wide storage handle.
//!
//! The concrete provider is built on first use, once per process, and every
//! `Storage` call on the handle is forwarded to it unchanged.

use std::future::Future;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use strata_core::{StorageBackend, StorageConfig};
use tokio::sync::OnceCell;

use crate::error::{StorageError, StorageResult};
use crate::factory::create_storage;
use crate::traits::Storage;
use crate::types::{
    ByteStream, CopyOptions, GetUrlOptions, HeadResult, ListOptions, ListResult,
    ProviderCapabilities, UploadContent, UploadOptions, UploadResult,
};

type StorageFactory =
    Box<dyn Fn() -> BoxFuture<'static, StorageResult<Arc<dyn Storage>>> + Send + Sync>;

static STORAGE: LazyLock<StorageHandle> = LazyLock::new(StorageHandle::from_env);

/// The shared handle configured from the process environment.
pub fn storage() -> &'static StorageHandle {
    &STORAGE
}

/// Lazily constructed provider. Concurrent first calls wait on the same
/// construction; a failed construction leaves the handle empty so the next
/// call tries again.
pub struct StorageHandle {
    cell: OnceCell<Arc<dyn Storage>>,
    factory: StorageFactory,
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl StorageHandle {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StorageResult<Arc<dyn Storage>>> + Send + 'static,
    {
        StorageHandle {
            cell: OnceCell::new(),
            factory: Box::new(move || Box::pin(factory())),
        }
    }

    /// Read `StorageConfig` from the environment on first use.
    pub fn from_env() -> Self {
        Self::new(|| async {
            let config = StorageConfig::from_env()
                .map_err(|e| StorageError::ConfigError(e.to_string()))?;
            create_storage(&config).await
        })
    }

    /// Wrap an already constructed provider.
    pub fn with_storage(storage: Arc<dyn Storage>) -> Self {
        let handle = Self::new(|| async {
            Err(StorageError::ConfigError(
                "storage handle was built from an existing provider".to_string(),
            ))
        });
        let _ = handle.cell.set(storage);
        handle
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// The underlying provider, constructing it if this is the first call.
    pub async fn get(&self) -> StorageResult<&Arc<dyn Storage>> {
        self.cell
            .get_or_try_init(|| async {
                (self.factory)().await.map_err(|e| {
                    tracing::error!(error = %e, "Storage provider construction failed");
                    match e {
                        StorageError::ConfigError(_) => e,
                        other => StorageError::ConfigError(other.to_string()),
                    }
                })
            })
            .await
    }
}

// Sync accessors cannot construct the provider; before first use they report
// the default backend and no native capabilities.
#[async_trait]
impl Storage for StorageHandle {
    async fn upload(
        &self,
        pathname: &str,
        content: UploadContent,
        options: UploadOptions,
    ) -> StorageResult<UploadResult> {
        self.get().await?.upload(pathname, content, options).await
    }

    async fn download(&self, pathname: &str) -> StorageResult<Vec<u8>> {
        self.get().await?.download(pathname).await
    }

    async fn download_stream(&self, pathname: &str) -> StorageResult<ByteStream> {
        self.get().await?.download_stream(pathname).await
    }

    async fn get_url(&self, pathname: &str, options: GetUrlOptions) -> StorageResult<String> {
        self.get().await?.get_url(pathname, options).await
    }

    async fn delete(&self, pathname: &str) -> StorageResult<()> {
        self.get().await?.delete(pathname).await
    }

    async fn delete_many(&self, pathnames: &[String]) -> Vec<String> {
        match self.get().await {
            Ok(storage) => storage.delete_many(pathnames).await,
            Err(e) => {
                tracing::warn!(error = %e, requested = pathnames.len(), "Bulk delete skipped");
                pathnames.to_vec()
            }
        }
    }

    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: CopyOptions,
    ) -> StorageResult<UploadResult> {
        self.get().await?.copy(from, to, options).await
    }

    async fn exists(&self, pathname: &str) -> bool {
        match self.get().await {
            Ok(storage) => storage.exists(pathname).await,
            Err(_) => false,
        }
    }

    async fn head(&self, pathname: &str) -> StorageResult<Option<HeadResult>> {
        self.get().await?.head(pathname).await
    }

    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        self.get().await?.list(options).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.cell
            .get()
            .map(|storage| storage.backend_type())
            .unwrap_or_default()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.cell
            .get()
            .map(|storage| storage.capabilities())
            .unwrap_or(ProviderCapabilities {
                native_copy: false,
                native_expiring_urls: false,
            })
    }
}
