use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_FILENAME_LEN: usize = 200;

/// Persisted attachment row. Storage only ever sees `pathname`; `url` is a
/// convenience copy of the provider URL at upload time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: Uuid,
    pub org_id: String,
    pub entity_id: String,
    #[serde(flatten)]
    pub object: StoredObject,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttachmentRecord {
    pub fn pathname(&self) -> &str {
        &self.object.pathname
    }
}

/// The stored-object half of a record, swapped as a unit on replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub filename: String,
    pub pathname: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct AttachmentContent {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

/// Reduce a user-supplied filename to `[A-Za-z0-9._-]`, safe as a pathname segment.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "file".to_string();
    }

    // Keep the extension when truncating.
    if cleaned.len() > MAX_FILENAME_LEN {
        return match cleaned.rsplit_once('.') {
            Some((stem, ext)) if ext.len() < 16 => {
                let keep = MAX_FILENAME_LEN - ext.len() - 1;
                format!("{}.{}", &stem[..keep.min(stem.len())], ext)
            }
            _ => cleaned[..MAX_FILENAME_LEN].to_string(),
        };
    }

    cleaned.to_string()
}
