use async_trait::async_trait;
use strata_core::AppError;
use uuid::Uuid;

use super::model::{AttachmentRecord, StoredObject};

/// Persistence for attachment records. Every lookup is scoped to the owning
/// organization; a record belonging to another org reads as absent.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn insert(&self, record: AttachmentRecord) -> Result<AttachmentRecord, AppError>;

    async fn get(&self, org_id: &str, id: Uuid) -> Result<Option<AttachmentRecord>, AppError>;

    /// Point the record at a new stored object. `NotFound` if the record is gone.
    async fn update_object(
        &self,
        org_id: &str,
        id: Uuid,
        object: StoredObject,
    ) -> Result<AttachmentRecord, AppError>;

    /// Returns whether a record was removed.
    async fn delete(&self, org_id: &str, id: Uuid) -> Result<bool, AppError>;
}
