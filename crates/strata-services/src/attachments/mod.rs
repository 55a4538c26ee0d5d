//! Entity attachments stored under the `attachments/` bucket.

mod model;
mod repository;
mod service;

pub use model::{sanitize_filename, AttachmentContent, AttachmentRecord, StoredObject};
pub use repository::AttachmentRepository;
pub use service::AttachmentService;
