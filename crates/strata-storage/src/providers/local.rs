use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use strata_core::StorageBackend;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{StorageError, StorageResult, ValidationError};
use crate::pathname::{content_type_from_filename, validate_pathname};
use crate::traits::Storage;
use crate::types::{
    advisory_expiry, with_random_suffix, Access, ByteStream, CopyOptions, GetUrlOptions,
    HeadResult, ListOptions, ListResult, ObjectSummary, ProviderCapabilities, UploadContent,
    UploadOptions, UploadResult,
};

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";
const STAGING_DIR: &str = "staging";
const DEFAULT_LIST_LIMIT: usize = 1000;

/// Metadata kept next to each object, since a plain file has nowhere to hold it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    access: Access,
    uploaded_at: DateTime<Utc>,
}

/// Local filesystem storage implementation
///
/// Objects live under `<root>/objects/<pathname>`, metadata sidecars under
/// `<root>/meta/<pathname>.json`. Access URLs are `{base_url}/{pathname}` with an
/// advisory `expires` parameter; whatever serves `base_url` must enforce it, along
/// with the `access` level recorded in the sidecar.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    objects_root: PathBuf,
    meta_root: PathBuf,
    staging_root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/strata")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();
        let objects_root = base_path.join(OBJECTS_DIR);
        let meta_root = base_path.join(META_DIR);
        let staging_root = base_path.join(STAGING_DIR);

        for dir in [&objects_root, &meta_root, &staging_root] {
            fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(LocalStorage {
            objects_root,
            meta_root,
            staging_root,
            base_url,
        })
    }

    /// Convert a pathname to a filesystem path under the objects root.
    ///
    /// Rejects traversal and absolute paths, and (for existing files) anything
    /// that resolves outside the root through a symlink.
    fn key_to_path(&self, pathname: &str) -> StorageResult<PathBuf> {
        validate_pathname(pathname)?;
        if pathname.starts_with('/') || pathname.starts_with('\\') {
            return Err(ValidationError::InvalidPathname(
                "pathname must be relative".to_string(),
            )
            .into());
        }

        let path = self.objects_root.join(pathname);

        if let Ok(canonical) = path.canonicalize() {
            let base_canonical = self.objects_root.canonicalize().map_err(|e| {
                StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
            })?;
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(ValidationError::InvalidPathname(
                    "pathname resolves outside storage directory".to_string(),
                )
                .into());
            }
        }

        Ok(path)
    }

    fn meta_path(&self, pathname: &str) -> PathBuf {
        self.meta_root.join(format!("{}.json", pathname))
    }

    fn generate_url(&self, pathname: &str) -> String {
        let encoded: Vec<String> = pathname
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.base_url.trim_end_matches('/'), encoded.join("/"))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn read_sidecar(&self, pathname: &str) -> Option<Sidecar> {
        let raw = fs::read(self.meta_path(pathname)).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                tracing::warn!(error = %e, pathname = %pathname, "Ignoring corrupt metadata sidecar");
                None
            }
        }
    }

    async fn write_sidecar(&self, pathname: &str, sidecar: &Sidecar) -> StorageResult<()> {
        let path = self.meta_path(pathname);
        self.ensure_parent_dir(&path).await?;
        let raw = serde_json::to_vec(sidecar)
            .map_err(|e| StorageError::BackendError(format!("Failed to encode metadata: {}", e)))?;
        fs::write(&path, raw).await?;
        Ok(())
    }

    async fn remove_if_present(path: &Path) -> std::io::Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ensure_exists(&self, pathname: &str, path: &Path) -> StorageResult<()> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Ok(())
        } else {
            Err(StorageError::NotFound(pathname.to_string()))
        }
    }

    /// All stored pathnames, sorted.
    async fn walk_pathnames(&self) -> StorageResult<Vec<String>> {
        let mut pathnames = Vec::new();
        let mut pending = vec![self.objects_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.objects_root) {
                    let pathname = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    pathnames.push(pathname);
                }
            }
        }

        pathnames.sort();
        Ok(pathnames)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        pathname: &str,
        content: UploadContent,
        options: UploadOptions,
    ) -> StorageResult<UploadResult> {
        validate_pathname(pathname)?;
        let pathname = if options.add_random_suffix {
            with_random_suffix(pathname)
        } else {
            pathname.to_string()
        };
        let path = self.key_to_path(&pathname)?;
        let content_type = options.resolved_content_type(&pathname);

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let size = match content {
            UploadContent::Bytes(bytes) => {
                file.write_all(&bytes).await.map_err(|e| {
                    StorageError::UploadFailed(format!(
                        "Failed to write file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                bytes.len() as u64
            }
            UploadContent::Reader(mut reader) => {
                tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
                    StorageError::UploadFailed(format!(
                        "Failed to write stream to file {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        };

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        self.write_sidecar(
            &pathname,
            &Sidecar {
                content_type: content_type.clone(),
                cache_control: options.cache_control,
                content_disposition: options.content_disposition,
                metadata: options.metadata,
                access: options.access,
                uploaded_at: Utc::now(),
            },
        )
        .await?;

        tracing::info!(
            path = %path.display(),
            pathname = %pathname,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(UploadResult {
            url: self.generate_url(&pathname),
            pathname,
            content_type,
            size,
        })
    }

    async fn download(&self, pathname: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(pathname)?;
        let start = std::time::Instant::now();

        self.ensure_exists(pathname, &path).await?;

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            pathname = %pathname,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(data)
    }

    async fn download_stream(&self, pathname: &str) -> StorageResult<ByteStream> {
        let path = self.key_to_path(pathname)?;
        let start = std::time::Instant::now();

        self.ensure_exists(pathname, &path).await?;

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let key = pathname.to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(
                    pathname = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream download error"
                );
                StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn get_url(&self, pathname: &str, options: GetUrlOptions) -> StorageResult<String> {
        let path = self.key_to_path(pathname)?;
        self.ensure_exists(pathname, &path).await?;

        // Advisory expiry: the link itself is permanent.
        let expires_at = advisory_expiry(options.expires_in);
        let mut url = format!("{}?expires={}", self.generate_url(pathname), expires_at);
        if options.download {
            url.push_str("&download=1");
        }
        if let Some(filename) = options.filename.as_deref() {
            url.push_str(&format!("&filename={}", urlencoding::encode(filename)));
        }
        if let Some(content_type) = options.content_type.as_deref() {
            url.push_str(&format!("&content-type={}", urlencoding::encode(content_type)));
        }
        Ok(url)
    }

    async fn delete(&self, pathname: &str) -> StorageResult<()> {
        let path = self.key_to_path(pathname)?;
        let start = std::time::Instant::now();

        let removed = Self::remove_if_present(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;
        if let Err(e) = Self::remove_if_present(&self.meta_path(pathname)).await {
            tracing::warn!(error = %e, pathname = %pathname, "Failed to delete metadata sidecar");
        }

        if removed {
            tracing::info!(
                path = %path.display(),
                pathname = %pathname,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Local storage delete successful"
            );
        } else {
            tracing::debug!(pathname = %pathname, "Local storage delete: object already absent");
        }

        Ok(())
    }

    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: CopyOptions,
    ) -> StorageResult<UploadResult> {
        let from_path = self.key_to_path(from)?;
        let to_path = self.key_to_path(to)?;

        self.ensure_exists(from, &from_path).await?;
        self.ensure_parent_dir(&to_path).await?;

        // `to` may be `from`; it must not be truncated before the source is read.
        let staging = self
            .staging_root
            .join(uuid::Uuid::new_v4().simple().to_string());
        let size = match fs::copy(&from_path, &staging).await {
            Ok(size) => size,
            Err(e) => {
                let _ = Self::remove_if_present(&staging).await;
                return Err(StorageError::BackendError(format!(
                    "Failed to copy {} to {}: {}",
                    from_path.display(),
                    to_path.display(),
                    e
                )));
            }
        };
        if let Err(e) = fs::rename(&staging, &to_path).await {
            let _ = Self::remove_if_present(&staging).await;
            return Err(StorageError::BackendError(format!(
                "Failed to move copy into {}: {}",
                to_path.display(),
                e
            )));
        }

        let mut sidecar = match self.read_sidecar(from).await {
            Some(source) => Sidecar {
                uploaded_at: Utc::now(),
                ..source
            },
            None => Sidecar {
                content_type: content_type_from_filename(from).to_string(),
                cache_control: None,
                content_disposition: None,
                metadata: HashMap::new(),
                access: Access::default(),
                uploaded_at: Utc::now(),
            },
        };
        if let Some(content_type) = options.content_type {
            sidecar.content_type = content_type;
        }
        self.write_sidecar(to, &sidecar).await?;

        tracing::info!(
            from = %from,
            to = %to,
            size_bytes = size,
            "Local storage copy successful"
        );

        Ok(UploadResult {
            url: self.generate_url(to),
            pathname: to.to_string(),
            content_type: sidecar.content_type,
            size,
        })
    }

    async fn head(&self, pathname: &str) -> StorageResult<Option<HeadResult>> {
        let path = self.key_to_path(pathname)?;

        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };

        let sidecar = self.read_sidecar(pathname).await;
        let modified = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());

        Ok(Some(match sidecar {
            Some(s) => HeadResult {
                url: self.generate_url(pathname),
                pathname: pathname.to_string(),
                content_type: s.content_type,
                size: meta.len(),
                uploaded_at: s.uploaded_at,
                cache_control: s.cache_control,
                content_disposition: s.content_disposition,
                metadata: s.metadata,
                access: s.access,
            },
            None => HeadResult {
                url: self.generate_url(pathname),
                pathname: pathname.to_string(),
                content_type: content_type_from_filename(pathname).to_string(),
                size: meta.len(),
                uploaded_at: modified,
                cache_control: None,
                content_disposition: None,
                metadata: HashMap::new(),
                access: Access::default(),
            },
        }))
    }

    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let prefix = options.prefix.unwrap_or_default();

        let mut matching = self
            .walk_pathnames()
            .await?
            .into_iter()
            .filter(|p| p.starts_with(&prefix))
            .filter(|p| options.cursor.as_ref().is_none_or(|cursor| p > cursor));

        let page: Vec<String> = matching.by_ref().take(limit).collect();
        let has_more = matching.next().is_some();

        let mut objects = Vec::with_capacity(page.len());
        for pathname in &page {
            if let Some(head) = self.head(pathname).await? {
                objects.push(ObjectSummary {
                    url: head.url,
                    pathname: head.pathname,
                    size: head.size,
                    uploaded_at: head.uploaded_at,
                });
            }
        }

        Ok(ListResult {
            cursor: if has_more { page.last().cloned() } else { None },
            objects,
            has_more,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            native_copy: true,
            native_expiring_urls: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathname::TrustedHosts;
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost:3000/files".to_string())
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_local_storage_upload_download() {
        let (_dir, storage) = storage().await;
        let data = b"%PDF-1.7 test".to_vec();

        let result = storage
            .upload(
                "attachments/org1/test.pdf",
                data.clone().into(),
                UploadOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.pathname, "attachments/org1/test.pdf");
        assert_eq!(result.content_type, "application/pdf");
        assert_eq!(result.size, data.len() as u64);
        assert_eq!(
            result.url,
            "http://localhost:3000/files/attachments/org1/test.pdf"
        );

        let downloaded = storage.download(&result.pathname).await.unwrap();
        assert_eq!(data, downloaded);
    }

    #[tokio::test]
    async fn test_overwrite_then_delete() {
        let (_dir, storage) = storage().await;
        let pathname = "questionnaires/org1/answers.json";

        storage
            .upload(pathname, b"{\"v\":1}".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();
        let url = storage
            .get_url(pathname, GetUrlOptions::expires_in_secs(900))
            .await
            .unwrap();
        assert!(url.starts_with(
            "http://localhost:3000/files/questionnaires/org1/answers.json?expires="
        ));

        // Resolve the URL the way the file server mounted at `base_url` would.
        let served = TrustedHosts::empty()
            .with_suffix("localhost")
            .extract_pathname(&url)
            .unwrap();
        let served = served.strip_prefix("files/").unwrap();
        assert_eq!(storage.download(served).await.unwrap(), b"{\"v\":1}".to_vec());
        assert_eq!(
            storage.head(served).await.unwrap().unwrap().content_type,
            "application/json"
        );

        storage
            .upload(pathname, b"{\"v\":2}".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(storage.download(pathname).await.unwrap(), b"{\"v\":2}".to_vec());
        assert_eq!(
            storage.head(pathname).await.unwrap().unwrap().content_type,
            "application/json"
        );

        storage.delete(pathname).await.unwrap();
        assert!(!storage.exists(pathname).await);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, storage) = storage().await;

        let result = storage.download("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::Validation(_))));

        let result = storage.delete("attachments/../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::Validation(_))));

        let result = storage.head("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::Validation(_))));

        assert!(!storage.exists("../etc/passwd").await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, storage) = storage().await;

        assert!(storage.delete("attachments/org1/missing.txt").await.is_ok());
        assert!(storage.delete("attachments/org1/missing.txt").await.is_ok());

        storage
            .upload("attachments/org1/a.txt", b"a".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();
        assert!(storage.delete("attachments/org1/a.txt").await.is_ok());
        assert!(storage.delete("attachments/org1/a.txt").await.is_ok());
        assert!(!storage.exists("attachments/org1/a.txt").await);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (_dir, storage) = storage().await;
        let path = "attachments/org1/nope.pdf";

        assert!(storage.download(path).await.unwrap_err().is_not_found());
        assert!(storage.download_stream(path).await.err().unwrap().is_not_found());
        assert!(storage
            .get_url(path, GetUrlOptions::default())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(storage
            .copy(path, "attachments/org1/dest.pdf", CopyOptions::default())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(storage.head(path).await.unwrap().is_none());
        assert!(!storage.exists(path).await);
    }

    #[tokio::test]
    async fn test_head_returns_uploaded_metadata() {
        let (_dir, storage) = storage().await;
        let options = UploadOptions::default()
            .with_content_type("text/csv")
            .with_cache_control("max-age=60")
            .with_metadata("uploaded-by", "user_1");

        storage
            .upload("questionnaires/org1/q.dat", b"a,b\n1,2".as_slice().into(), options)
            .await
            .unwrap();

        let head = storage.head("questionnaires/org1/q.dat").await.unwrap().unwrap();
        assert_eq!(head.content_type, "text/csv");
        assert_eq!(head.size, 7);
        assert_eq!(head.cache_control.as_deref(), Some("max-age=60"));
        assert_eq!(head.metadata.get("uploaded-by").map(String::as_str), Some("user_1"));
    }

    #[tokio::test]
    async fn test_copy_preserves_bytes_and_content_type() {
        let (_dir, storage) = storage().await;
        let data = b"original content".to_vec();

        storage
            .upload(
                "attachments/org1/original.bin",
                data.clone().into(),
                UploadOptions::default().with_content_type("text/plain"),
            )
            .await
            .unwrap();

        let copied = storage
            .copy(
                "attachments/org1/original.bin",
                "attachments/org1/copy.bin",
                CopyOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(copied.pathname, "attachments/org1/copy.bin");
        assert_eq!(copied.content_type, "text/plain");
        assert_eq!(copied.size, data.len() as u64);
        assert_eq!(storage.download("attachments/org1/copy.bin").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_copy_onto_itself_keeps_content() {
        let (dir, storage) = storage().await;
        let path = "attachments/org1/a.pdf";
        storage
            .upload(path, b"precious bytes".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();

        let copied = storage.copy(path, path, CopyOptions::default()).await.unwrap();

        assert_eq!(copied.size, 14);
        assert_eq!(copied.content_type, "application/pdf");
        assert_eq!(storage.download(path).await.unwrap(), b"precious bytes".to_vec());
        let staged = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn test_copy_content_type_override() {
        let (_dir, storage) = storage().await;
        storage
            .upload(
                "attachments/org1/data.bin",
                b"a,b".as_slice().into(),
                UploadOptions::default().with_cache_control("max-age=60"),
            )
            .await
            .unwrap();

        let copied = storage
            .copy(
                "attachments/org1/data.bin",
                "attachments/org1/data.csv",
                CopyOptions::default().with_content_type("text/csv"),
            )
            .await
            .unwrap();
        assert_eq!(copied.content_type, "text/csv");

        let head = storage.head("attachments/org1/data.csv").await.unwrap().unwrap();
        assert_eq!(head.content_type, "text/csv");
        assert_eq!(head.cache_control.as_deref(), Some("max-age=60"));
        let source = storage.head("attachments/org1/data.bin").await.unwrap().unwrap();
        assert_eq!(source.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_access_is_recorded_and_copied() {
        let (_dir, storage) = storage().await;
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

        let head = storage.head("attachments/org1/private.txt").await.unwrap().unwrap();
        assert_eq!(head.access, Access::Private);
        let head = storage.head("attachments/org1/public.txt").await.unwrap().unwrap();
        assert_eq!(head.access, Access::Public);

        storage
            .copy(
                "attachments/org1/private.txt",
                "attachments/org1/private-copy.txt",
                CopyOptions::default(),
            )
            .await
            .unwrap();
        let head = storage
            .head("attachments/org1/private-copy.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.access, Access::Private);
    }

    #[tokio::test]
    async fn test_stream_upload_and_download() {
        let (_dir, storage) = storage().await;
        let data = b"stream test data".to_vec();
        let content = UploadContent::reader(std::io::Cursor::new(data.clone()));

        let result = storage
            .upload("knowledge-base/org1/doc.txt", content, UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(result.size, data.len() as u64);

        let mut stream = storage.download_stream(&result.pathname).await.unwrap();
        let mut downloaded = Vec::new();
        while let Some(chunk) = stream.next().await {
            downloaded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(data, downloaded);
    }

    #[tokio::test]
    async fn test_random_suffix_changes_stored_pathname() {
        let (_dir, storage) = storage().await;
        let result = storage
            .upload(
                "org-assets/acme/logo.png",
                b"png".as_slice().into(),
                UploadOptions::default().with_random_suffix(),
            )
            .await
            .unwrap();

        assert_ne!(result.pathname, "org-assets/acme/logo.png");
        assert!(result.pathname.starts_with("org-assets/acme/logo-"));
        assert!(storage.exists(&result.pathname).await);
    }

    #[tokio::test]
    async fn test_get_url_carries_advisory_hints() {
        let (_dir, storage) = storage().await;
        storage
            .upload("attachments/org1/a b.pdf", b"x".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();

        let url = storage
            .get_url(
                "attachments/org1/a b.pdf",
                GetUrlOptions::expires_in_secs(900).as_download("Report.pdf"),
            )
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:3000/files/attachments/org1/a%20b.pdf?expires="));
        assert!(url.contains("&download=1"));
        assert!(url.contains("&filename=Report.pdf"));

        let far = storage
            .get_url(
                "attachments/org1/a b.pdf",
                GetUrlOptions {
                    expires_in: Duration::MAX,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(far.ends_with(&format!("?expires={}", i64::MAX)));
    }

    #[tokio::test]
    async fn test_list_paginates_with_cursor() {
        let (_dir, storage) = storage().await;
        for name in ["a.txt", "b.txt", "c.txt"] {
            storage
                .upload(
                    &format!("attachments/org1/{}", name),
                    b"x".as_slice().into(),
                    UploadOptions::default(),
                )
                .await
                .unwrap();
        }
        storage
            .upload("attachments/org2/z.txt", b"x".as_slice().into(), UploadOptions::default())
            .await
            .unwrap();

        let first = storage
            .list(ListOptions {
                prefix: Some("attachments/org1/".to_string()),
                limit: Some(2),
                cursor: None,
            })
            .await
            .unwrap();
        assert!(first.has_more);
        assert_eq!(
            first.objects.iter().map(|o| o.pathname.as_str()).collect::<Vec<_>>(),
            vec!["attachments/org1/a.txt", "attachments/org1/b.txt"]
        );

        let second = storage
            .list(ListOptions {
                prefix: Some("attachments/org1/".to_string()),
                limit: Some(2),
                cursor: first.cursor,
            })
            .await
            .unwrap();
        assert!(!second.has_more);
        assert!(second.cursor.is_none());
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].pathname, "attachments/org1/c.txt");
    }

    #[tokio::test]
    async fn test_bulk_delete_removes_all() {
        let (_dir, storage) = storage().await;
        let paths: Vec<String> = (1..=3)
            .map(|i| format!("attachments/org1/{}.txt", i))
            .collect();
        for path in &paths {
            storage
                .upload(path, b"x".as_slice().into(), UploadOptions::default())
                .await
                .unwrap();
        }

        let failed = storage.delete_many(&paths).await;
        assert!(failed.is_empty());
        for path in &paths {
            assert!(!storage.exists(path).await);
        }
    }
}
