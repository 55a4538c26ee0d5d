//! Strata Storage Library
//!
//! Multi-tenant object storage behind one provider contract. It includes the
//! `Storage` trait, providers for Blob, S3 and the local filesystem, and a
//! process-wide handle that builds the configured provider on first use.
//!
//! # Pathname format
//!
//! Pathnames are relative, bucket-prefixed and tenant-scoped:
//!
//! - `attachments/{org_id}/{entity_id}/{file}`
//! - `knowledge-base/{org_id}/{file}`
//!
//! Pathnames must not contain `..` segments or a null byte. Externally supplied
//! URLs are reduced back to pathnames with [`extract_pathname_from_url`], which
//! only accepts trusted storage hosts.

pub mod buckets;
pub mod error;
pub mod factory;
pub mod handle;
pub mod pathname;
pub mod providers;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use buckets::{build_pathname, Bucket};
pub use error::{StorageError, StorageResult, ValidationError};
pub use factory::create_storage;
pub use handle::{storage, StorageHandle};
pub use pathname::{
    base64_to_bytes, build_org_path, bytes_to_base64, content_type_from_filename,
    extract_pathname_from_url, parse_org_path, validate_pathname, OrgPath, TrustedHosts,
};
#[cfg(feature = "storage-blob")]
pub use providers::BlobStorage;
#[cfg(feature = "storage-local")]
pub use providers::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use providers::S3Storage;
pub use strata_core::StorageBackend;
pub use traits::Storage;
pub use types::{
    Access, ByteStream, CopyOptions, GetUrlOptions, HeadResult, ListOptions, ListResult, ObjectSummary,
    ProviderCapabilities, UploadContent, UploadOptions, UploadResult, DEFAULT_URL_EXPIRY,
};
