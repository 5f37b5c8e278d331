use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A document stored through the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Small set of editable scalar fields (status, category, transcript…),
    /// treated uniformly with `content` for dirty tracking.
    pub metadata: BTreeMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Document {
    /// The editable-field bundle versioned by snapshots.
    pub fn fields(&self) -> DocumentFields {
        DocumentFields {
            title: self.title.clone(),
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// The editable fields of a document: what a draft session tracks and what a
/// snapshot freezes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentFields {
    pub title: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl DocumentFields {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Stable fingerprint of the versioned fields, for change detection.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        for (key, value) in &self.metadata {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Origin of a snapshot in the version log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// A candidate first version written at document creation.
    Initial,
    /// An explicit user save.
    Manual,
    /// A periodic background save.
    Auto,
    /// The backup of the pre-restore state taken by a restore.
    Restore,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Initial => "initial",
            ChangeType::Manual => "manual",
            ChangeType::Auto => "auto",
            ChangeType::Restore => "restore",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "initial" => ChangeType::Initial,
            "manual" => ChangeType::Manual,
            "restore" => ChangeType::Restore,
            _ => ChangeType::Auto,
        }
    }
}

/// An immutable point-in-time copy of a document's editable fields.
///
/// Snapshots are append-only: they are never mutated or deleted by normal
/// operation. The one sanctioned exception is `mark_primary`, which flips
/// `is_primary` on a single `initial` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub document_id: String,
    /// Monotonically increasing per document; defines the total order, ties
    /// broken by `created_at`. The highest sequence is the most recent.
    pub sequence: i64,
    pub title: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub change_type: ChangeType,
    pub description: Option<String>,
    /// Fingerprint of the versioned fields at append time.
    pub content_hash: String,
    /// Meaningful only for `initial` snapshots: the user-chosen authoritative
    /// candidate among several first drafts.
    pub is_primary: bool,
    pub created_at: i64,
}

impl Snapshot {
    pub fn fields(&self) -> DocumentFields {
        DocumentFields {
            title: self.title.clone(),
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Input for creating a new document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentInput {
    pub title: String,
    pub content: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl CreateDocumentInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: None,
            metadata: None,
        }
    }
}

/// Partial update for an existing document. `None` fields are left alone;
/// `metadata` entries are merged into the stored map (keys are never removed
/// through this path), which lets the debounced autosave persist exactly one
/// field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDocumentInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl UpdateDocumentInput {
    /// Full update carrying every editable field.
    pub fn from_fields(fields: &DocumentFields) -> Self {
        Self {
            title: Some(fields.title.clone()),
            content: Some(fields.content.clone()),
            metadata: Some(fields.metadata.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.metadata.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_changes_with_fields() {
        let a = DocumentFields::new("A", "hello");
        let mut b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());

        b.content = "hello world".to_string();
        assert_ne!(a.content_hash(), b.content_hash());

        let mut c = a.clone();
        c.metadata.insert("status".to_string(), "draft".to_string());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn test_change_type_round_trip() {
        for ct in [
            ChangeType::Initial,
            ChangeType::Manual,
            ChangeType::Auto,
            ChangeType::Restore,
        ] {
            assert_eq!(ChangeType::from_str(ct.as_str()), ct);
        }
    }
}
