//! Configuration module
//!
//! Storage configuration is read once from the process environment when the
//! provider is first constructed. Credentials are never re-read afterwards, so
//! rotating them requires a process restart.

use std::env;

use crate::storage_types::StorageBackend;

const DEFAULT_BLOB_API_URL: &str = "https://blob.vercel-storage.com";
const MAX_ATTACHMENT_SIZE_MB: u64 = 100;

/// Storage configuration
#[derive(Clone, Default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    // Blob backend
    pub blob_token: Option<String>,
    pub blob_api_url: String,
    // S3 backend
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO etc.)
    pub aws_region: Option<String>,
    // Local filesystem backend
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// Extra host suffixes accepted by `extract_pathname_from_url`
    pub trusted_hosts: Vec<String>,
    pub max_attachment_size_bytes: u64,
}

// Hand-written so the blob token never ends up in logs.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("blob_token", &self.blob_token.as_ref().map(|_| "<redacted>"))
            .field("blob_api_url", &self.blob_api_url)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("aws_region", &self.aws_region)
            .field("local_storage_path", &self.local_storage_path)
            .field("local_storage_base_url", &self.local_storage_base_url)
            .field("trusted_hosts", &self.trusted_hosts)
            .field("max_attachment_size_bytes", &self.max_attachment_size_bytes)
            .finish()
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. `from_env` delegates here;
    /// tests pass a map instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match non_empty("STORAGE_PROVIDER") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::default(),
        };

        let trusted_hosts = non_empty("STORAGE_TRUSTED_HOSTS")
            .map(|value| {
                value
                    .split(',')
                    .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let max_attachment_size_mb = non_empty("MAX_ATTACHMENT_SIZE_MB")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("MAX_ATTACHMENT_SIZE_MB must be a valid number"))
            })
            .transpose()?
            .unwrap_or(MAX_ATTACHMENT_SIZE_MB);

        let config = StorageConfig {
            backend,
            blob_token: non_empty("BLOB_READ_WRITE_TOKEN"),
            blob_api_url: non_empty("BLOB_API_URL")
                .unwrap_or_else(|| DEFAULT_BLOB_API_URL.to_string()),
            s3_bucket: non_empty("S3_BUCKET"),
            s3_region: non_empty("S3_REGION"),
            s3_endpoint: non_empty("S3_ENDPOINT"),
            aws_region: non_empty("AWS_REGION"),
            local_storage_path: non_empty("LOCAL_STORAGE_PATH"),
            local_storage_base_url: non_empty("LOCAL_STORAGE_BASE_URL"),
            trusted_hosts,
            max_attachment_size_bytes: max_attachment_size_mb * 1024 * 1024,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the selected backend has the settings it cannot run without.
    ///
    /// A missing blob token is not an error here; the provider warns at
    /// construction and every call fails with a configuration error.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.backend {
            StorageBackend::Blob => {
                if !self.blob_api_url.starts_with("http://")
                    && !self.blob_api_url.starts_with("https://")
                {
                    return Err(anyhow::anyhow!(
                        "BLOB_API_URL must start with http:// or https://"
                    ));
                }
            }
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!("S3_BUCKET must be set for the s3 backend"));
                }
                if self.s3_region().is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set for the s3 backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set for the local backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set for the local backend"
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.backend
    }

    pub fn blob_token(&self) -> Option<&str> {
        self.blob_token.as_deref()
    }

    pub fn blob_api_url(&self) -> &str {
        &self.blob_api_url
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.s3_bucket.as_deref()
    }

    /// S3 region, falling back to the generic AWS region.
    pub fn s3_region(&self) -> Option<&str> {
        self.s3_region.as_deref().or(self.aws_region.as_deref())
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.local_storage_base_url.as_deref()
    }

    pub fn trusted_hosts(&self) -> &[String] {
        &self.trusted_hosts
    }

    pub fn max_attachment_size_bytes(&self) -> u64 {
        self.max_attachment_size_bytes
    }
}
