//! Bucket namespace registry.
//!
//! Every stored pathname starts with exactly one bucket prefix:
//!
//! - `attachments/`
//! - `questionnaires/`
//! - `knowledge-base/`
//! - `org-assets/`
//! - `fleet-agents/`
//!
//! The set is closed. Buckets are logical namespaces inside a single backend store,
//! they are never created or removed at runtime.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    Attachments,
    Questionnaires,
    KnowledgeBase,
    OrgAssets,
    FleetAgents,
}

/// Historical configuration names (one bucket per name in the previous S3 layout)
/// mapped onto the logical buckets. Only used for name resolution.
const LEGACY_ALIASES: &[(&str, Bucket)] = &[
    ("APP_AWS_BUCKET_NAME", Bucket::Attachments),
    ("APP_AWS_QUESTIONNAIRE_UPLOAD_BUCKET", Bucket::Questionnaires),
    ("APP_AWS_KNOWLEDGE_BASE_BUCKET", Bucket::KnowledgeBase),
    ("APP_AWS_ORG_ASSETS_BUCKET", Bucket::OrgAssets),
    ("FLEET_AGENT_BUCKET_NAME", Bucket::FleetAgents),
];

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Attachments,
        Bucket::Questionnaires,
        Bucket::KnowledgeBase,
        Bucket::OrgAssets,
        Bucket::FleetAgents,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Bucket::Attachments => "attachments",
            Bucket::Questionnaires => "questionnaires",
            Bucket::KnowledgeBase => "knowledge-base",
            Bucket::OrgAssets => "org-assets",
            Bucket::FleetAgents => "fleet-agents",
        }
    }

    /// Path prefix: the bucket name plus a trailing separator.
    pub fn prefix(self) -> &'static str {
        match self {
            Bucket::Attachments => "attachments/",
            Bucket::Questionnaires => "questionnaires/",
            Bucket::KnowledgeBase => "knowledge-base/",
            Bucket::OrgAssets => "org-assets/",
            Bucket::FleetAgents => "fleet-agents/",
        }
    }

    /// Resolve a historical configuration name (case-insensitive).
    pub fn from_legacy_name(name: &str) -> Option<Bucket> {
        let name = name.trim();
        LEGACY_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, bucket)| *bucket)
    }

    /// Resolve either a canonical bucket name or a legacy alias.
    pub fn resolve(name: &str) -> Option<Bucket> {
        name.parse().ok().or_else(|| Bucket::from_legacy_name(name))
    }

    /// The bucket whose prefix `pathname` starts with, if any.
    pub fn of_pathname(pathname: &str) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|bucket| pathname.starts_with(bucket.prefix()))
    }

    /// Like [`Bucket::of_pathname`], but an error when no prefix matches or when
    /// nothing follows the prefix.
    pub fn require(pathname: &str) -> Result<Bucket, ValidationError> {
        match Bucket::of_pathname(pathname) {
            Some(bucket) if pathname.len() > bucket.prefix().len() => Ok(bucket),
            _ => Err(ValidationError::UnknownBucket(pathname.to_string())),
        }
    }

    /// Build a bucket-qualified pathname.
    ///
    /// Leading separators are stripped from `key` so exactly one `/` sits between
    /// the prefix and the key. The key's internal structure is not validated here.
    pub fn pathname(self, key: &str) -> String {
        format!("{}{}", self.prefix(), key.trim_start_matches('/'))
    }
}

/// Free-function form of [`Bucket::pathname`].
pub fn build_pathname(bucket: Bucket, key: &str) -> String {
    bucket.pathname(key)
}

impl FromStr for Bucket {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_end_matches('/').to_lowercase();
        Bucket::ALL
            .into_iter()
            .find(|bucket| bucket.name() == name)
            .ok_or_else(|| ValidationError::UnknownBucket(s.to_string()))
    }
}

impl Display for Bucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}
