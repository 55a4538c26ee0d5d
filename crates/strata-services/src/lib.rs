//! Strata Services Layer
//!
//! Business services built on the storage core. Services own the sequencing
//! between object storage and persistence (write the object before the record,
//! drop the record before the object) and treat storage cleanup as best-effort.

pub mod attachments;

pub use attachments::{
    AttachmentContent, AttachmentRecord, AttachmentRepository, AttachmentService, StoredObject,
};
pub use strata_storage::{create_storage, storage, Storage, StorageBackend, StorageError};
