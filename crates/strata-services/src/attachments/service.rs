use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use strata_core::{AppError, StorageConfig};
use strata_storage::{
    base64_to_bytes, build_org_path, Bucket, CopyOptions, GetUrlOptions, Storage, TrustedHosts,
    UploadOptions,
};
use uuid::Uuid;

use super::model::{sanitize_filename, AttachmentContent, AttachmentRecord, StoredObject};
use super::repository::AttachmentRepository;

/// Attachments for any tenant entity (policies, vendors, tasks).
///
/// Ordering rules: the object is written before its record exists and the
/// record is removed before its object, so a record never points at nothing.
/// Storage cleanup after a committed change is best-effort; a failure leaks an
/// object and is logged, it never fails the call.
#[derive(Clone)]
pub struct AttachmentService {
    storage: Arc<dyn Storage>,
    repository: Arc<dyn AttachmentRepository>,
    max_size_bytes: u64,
    trusted_hosts: TrustedHosts,
}

impl AttachmentService {
    pub fn new(
        storage: Arc<dyn Storage>,
        repository: Arc<dyn AttachmentRepository>,
        max_size_bytes: u64,
    ) -> Self {
        Self {
            storage,
            repository,
            max_size_bytes,
            trusted_hosts: TrustedHosts::default(),
        }
    }

    /// Size limit and extra trusted hosts taken from configuration.
    pub fn from_config(
        storage: Arc<dyn Storage>,
        repository: Arc<dyn AttachmentRepository>,
        config: &StorageConfig,
    ) -> Self {
        let mut service = Self::new(storage, repository, config.max_attachment_size_bytes());
        service.trusted_hosts =
            TrustedHosts::default().with_suffixes(config.trusted_hosts().iter().cloned());
        service
    }

    pub async fn upload(
        &self,
        org_id: &str,
        entity_id: &str,
        filename: &str,
        content: impl Into<Bytes>,
    ) -> Result<AttachmentRecord, AppError> {
        let object = self.store(org_id, entity_id, filename, content.into()).await?;
        let now = Utc::now();
        let record = AttachmentRecord {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            entity_id: entity_id.to_string(),
            object,
            created_at: now,
            updated_at: now,
        };
        let pathname = record.object.pathname.clone();

        match self.repository.insert(record).await {
            Ok(record) => {
                tracing::info!(
                    attachment_id = %record.id,
                    org_id = %org_id,
                    pathname = %record.object.pathname,
                    size_bytes = record.object.size_bytes,
                    "Attachment uploaded"
                );
                Ok(record)
            }
            Err(e) => {
                self.discard(&pathname, "record insert failed").await;
                Err(e)
            }
        }
    }

    /// Accepts plain base64 or a `data:` URL.
    pub async fn upload_base64(
        &self,
        org_id: &str,
        entity_id: &str,
        filename: &str,
        encoded: &str,
    ) -> Result<AttachmentRecord, AppError> {
        let bytes =
            base64_to_bytes(encoded).map_err(|e| AppError::InvalidInput(e.to_string()))?;
        self.upload(org_id, entity_id, filename, bytes).await
    }

    /// Time-boxed download URL. On backends without expiring links the expiry is
    /// advisory and the link stays valid until the object is deleted.
    pub async fn signed_url(
        &self,
        org_id: &str,
        id: Uuid,
        expires_in: Duration,
    ) -> Result<String, AppError> {
        let record = self.find(org_id, id).await?;
        let options = GetUrlOptions {
            expires_in,
            ..Default::default()
        }
        .as_download(record.object.filename.clone());

        Ok(self.storage.get_url(record.pathname(), options).await?)
    }

    pub async fn download(&self, org_id: &str, id: Uuid) -> Result<AttachmentContent, AppError> {
        let record = self.find(org_id, id).await?;
        let bytes = self.storage.download(record.pathname()).await?;

        Ok(AttachmentContent {
            bytes,
            content_type: record.object.content_type,
            filename: record.object.filename,
        })
    }

    /// Swap the stored file behind an existing record.
    pub async fn replace(
        &self,
        org_id: &str,
        id: Uuid,
        filename: &str,
        content: impl Into<Bytes>,
    ) -> Result<AttachmentRecord, AppError> {
        let existing = self.find(org_id, id).await?;
        let object = self
            .store(org_id, &existing.entity_id, filename, content.into())
            .await?;
        let new_pathname = object.pathname.clone();

        let updated = match self.repository.update_object(org_id, id, object).await {
            Ok(updated) => updated,
            Err(e) => {
                self.discard(&new_pathname, "record update failed").await;
                return Err(e);
            }
        };

        if existing.pathname() != new_pathname {
            self.discard(existing.pathname(), "replaced").await;
        }

        tracing::info!(
            attachment_id = %id,
            org_id = %org_id,
            old_pathname = %existing.pathname(),
            new_pathname = %new_pathname,
            "Attachment replaced"
        );

        Ok(updated)
    }

    pub async fn delete(&self, org_id: &str, id: Uuid) -> Result<(), AppError> {
        let record = self.find(org_id, id).await?;

        if !self.repository.delete(org_id, id).await? {
            return Err(AppError::NotFound("Attachment not found".to_string()));
        }
        self.discard(record.pathname(), "attachment deleted").await;

        tracing::info!(
            attachment_id = %id,
            org_id = %org_id,
            pathname = %record.pathname(),
            "Attachment deleted"
        );

        Ok(())
    }

    /// Copy an attachment onto another entity of the same org, e.g. when a
    /// policy is cloned into a new version.
    pub async fn duplicate(
        &self,
        org_id: &str,
        id: Uuid,
        target_entity_id: &str,
    ) -> Result<AttachmentRecord, AppError> {
        let source = self.find(org_id, id).await?;
        let pathname = attachment_pathname(org_id, target_entity_id, &source.object.filename)?;

        let copied = self
            .storage
            .copy(source.pathname(), &pathname, CopyOptions::default())
            .await?;
        let now = Utc::now();
        let record = AttachmentRecord {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            entity_id: target_entity_id.to_string(),
            object: StoredObject {
                filename: source.object.filename.clone(),
                pathname: copied.pathname,
                url: copied.url,
                content_type: copied.content_type,
                size_bytes: copied.size,
            },
            created_at: now,
            updated_at: now,
        };
        let copied_pathname = record.object.pathname.clone();

        match self.repository.insert(record).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.discard(&copied_pathname, "record insert failed").await;
                Err(e)
            }
        }
    }

    /// Turn a stored URL (or a bare pathname) back into a trusted attachment
    /// pathname. Foreign hosts and anything outside the attachments bucket are
    /// rejected.
    pub fn resolve_pathname(&self, reference: &str) -> Result<String, AppError> {
        let pathname = self
            .trusted_hosts
            .extract_pathname(reference)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        match Bucket::require(&pathname) {
            Ok(Bucket::Attachments) => Ok(pathname),
            Ok(other) => Err(AppError::InvalidInput(format!(
                "pathname belongs to the {} bucket",
                other
            ))),
            Err(e) => Err(AppError::InvalidInput(e.to_string())),
        }
    }

    async fn find(&self, org_id: &str, id: Uuid) -> Result<AttachmentRecord, AppError> {
        self.repository
            .get(org_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attachment not found".to_string()))
    }

    async fn store(
        &self,
        org_id: &str,
        entity_id: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<StoredObject, AppError> {
        let size = content.len() as u64;
        if size > self.max_size_bytes {
            return Err(AppError::PayloadTooLarge {
                size,
                limit: self.max_size_bytes,
            });
        }

        let pathname = attachment_pathname(org_id, entity_id, filename)?;
        let result = self
            .storage
            .upload(&pathname, content.into(), UploadOptions::default())
            .await?;

        Ok(StoredObject {
            filename: filename.to_string(),
            pathname: result.pathname,
            url: result.url,
            content_type: result.content_type,
            size_bytes: result.size,
        })
    }

    async fn discard(&self, pathname: &str, reason: &str) {
        if let Err(e) = self.storage.delete(pathname).await {
            tracing::warn!(
                error = %e,
                pathname = %pathname,
                reason = %reason,
                "Failed to delete attachment object, leaving it orphaned"
            );
        }
    }
}

/// `attachments/{org}/{entity}/{uuid}-{filename}`
fn attachment_pathname(org_id: &str, entity_id: &str, filename: &str) -> Result<String, AppError> {
    for (name, value) in [("org_id", org_id), ("entity_id", entity_id)] {
        if value.trim().is_empty() || value.contains(['/', '\\']) || value.contains("..") {
            return Err(AppError::InvalidInput(format!("invalid {}", name)));
        }
    }
    let object_name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename));
    Ok(Bucket::Attachments.pathname(&build_org_path(org_id, &[entity_id, &object_name])))
}
