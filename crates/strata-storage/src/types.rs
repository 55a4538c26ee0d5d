//! Option and result shapes shared by every provider.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{StorageError, StorageResult};
use crate::pathname::content_type_from_filename;

/// Single-pass stream of object content. Not restartable: a partially consumed
/// stream must be dropped and a new one requested.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Default lifetime of an access URL when the caller does not pick one.
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Content handed to `upload`.
pub enum UploadContent {
    Bytes(Bytes),
    Reader(Pin<Box<dyn AsyncRead + Send + Unpin>>),
}

impl UploadContent {
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        UploadContent::Reader(Box::pin(reader))
    }

    /// Buffer the whole content in memory.
    pub async fn into_bytes(self) -> StorageResult<Bytes> {
        match self {
            UploadContent::Bytes(bytes) => Ok(bytes),
            UploadContent::Reader(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await.map_err(|e| {
                    StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
                })?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

impl Debug for UploadContent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadContent::Bytes(bytes) => write!(f, "UploadContent::Bytes({} bytes)", bytes.len()),
            UploadContent::Reader(_) => f.write_str("UploadContent::Reader"),
        }
    }
}

impl From<Bytes> for UploadContent {
    fn from(bytes: Bytes) -> Self {
        UploadContent::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadContent {
    fn from(bytes: Vec<u8>) -> Self {
        UploadContent::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for UploadContent {
    fn from(bytes: &'static [u8]) -> Self {
        UploadContent::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for UploadContent {
    fn from(text: String) -> Self {
        UploadContent::Bytes(Bytes::from(text))
    }
}

/// Who may read an object through its plain URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Defaults to the type inferred from the pathname's extension.
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    /// Custom key/value tags. Backends without metadata support drop them.
    pub metadata: HashMap<String, String>,
    pub access: Access,
    /// Insert a random token before the extension so uploads never collide.
    pub add_random_suffix: bool,
}

impl UploadOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_random_suffix(mut self) -> Self {
        self.add_random_suffix = true;
        self
    }

    pub(crate) fn resolved_content_type(&self, pathname: &str) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| content_type_from_filename(pathname).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub url: String,
    pub pathname: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadResult {
    pub url: String,
    pub pathname: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub access: Access,
}

/// Options for `copy`. Unset fields keep the source object's value.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub content_type: Option<String>,
}

impl CopyOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct GetUrlOptions {
    pub expires_in: Duration,
    /// Ask the client to download rather than display inline.
    pub download: bool,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl Default for GetUrlOptions {
    fn default() -> Self {
        GetUrlOptions {
            expires_in: DEFAULT_URL_EXPIRY,
            download: false,
            filename: None,
            content_type: None,
        }
    }
}

impl GetUrlOptions {
    pub fn expires_in_secs(secs: u64) -> Self {
        GetUrlOptions {
            expires_in: Duration::from_secs(secs),
            ..Default::default()
        }
    }

    pub fn as_download(mut self, filename: impl Into<String>) -> Self {
        self.download = true;
        self.filename = Some(filename.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    /// Opaque cursor returned by a previous page.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub url: String,
    pub pathname: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub objects: Vec<ObjectSummary>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

/// Contract promises a backend can only approximate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// `copy` is a server-side primitive rather than download + re-upload.
    pub native_copy: bool,
    /// `get_url` links really stop working after `expires_in`.
    pub native_expiring_urls: bool,
}

/// Unix timestamp `expires_in` from now, saturating instead of overflowing.
pub(crate) fn advisory_expiry(expires_in: Duration) -> i64 {
    let secs = i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX);
    Utc::now().timestamp().saturating_add(secs)
}

/// Insert `-<token>` before the extension of the final path segment.
pub(crate) fn with_random_suffix(pathname: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    let token = &token[..12];
    let (dir, name) = match pathname.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, pathname),
    };
    let name = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, token, ext),
        _ => format!("{}-{}", name, token),
    };
    match dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name,
    }
}
