//! Concrete providers, one per backend, each behind its cargo feature.

#[cfg(feature = "storage-blob")]
pub mod blob;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;

#[cfg(feature = "storage-blob")]
pub use blob::{BlobStorage, DEFAULT_BLOB_API_URL};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
