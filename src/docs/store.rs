use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::types::{
    ChangeType, CreateDocumentInput, Document, DocumentFields, Snapshot, UpdateDocumentInput,
};

/// Errors raised by a persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The persistence collaborator: generic document CRUD plus the append-only
/// snapshot log. The editor core only ever talks to this trait.
///
/// `list_snapshots` returns snapshots in sequence order, highest first; the
/// store assigns `sequence = max(existing) + 1` when appending.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, document_id: &str) -> Result<Option<Document>, StoreError>;

    async fn create(&self, input: &CreateDocumentInput) -> Result<Document, StoreError>;

    async fn update(
        &self,
        document_id: &str,
        input: &UpdateDocumentInput,
    ) -> Result<Document, StoreError>;

    async fn delete(&self, document_id: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<Document>, StoreError>;

    async fn create_snapshot(
        &self,
        document_id: &str,
        fields: &DocumentFields,
        change_type: ChangeType,
        description: Option<&str>,
    ) -> Result<Snapshot, StoreError>;

    async fn list_snapshots(&self, document_id: &str) -> Result<Vec<Snapshot>, StoreError>;

    async fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Mark one `initial` snapshot as the chosen primary version. The only
    /// sanctioned mutation of the snapshot log.
    async fn mark_primary(&self, document_id: &str, snapshot_id: &str) -> Result<(), StoreError>;
}

/// In-memory store used by tests and throwaway embeds.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, Document>,
    snapshots: Vec<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.documents.get(document_id).cloned())
    }

    async fn create(&self, input: &CreateDocumentInput) -> Result<Document, StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = now_millis();
        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            title: input.title.clone(),
            content: input.content.clone().unwrap_or_default(),
            metadata: input.metadata.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        state.documents.insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn update(
        &self,
        document_id: &str,
        input: &UpdateDocumentInput,
    ) -> Result<Document, StoreError> {
        let mut state = self.state.lock().unwrap();
        let document = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::DocumentNotFound(document_id.to_string()))?;

        if let Some(title) = &input.title {
            document.title = title.clone();
        }
        if let Some(content) = &input.content {
            document.content = content.clone();
        }
        if let Some(metadata) = &input.metadata {
            for (key, value) in metadata {
                document.metadata.insert(key.clone(), value.clone());
            }
        }
        document.updated_at = now_millis();
        Ok(document.clone())
    }

    async fn delete(&self, document_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let removed = state.documents.remove(document_id).is_some();
        state.snapshots.retain(|s| s.document_id != document_id);
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut documents: Vec<Document> = state.documents.values().cloned().collect();
        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(documents)
    }

    async fn create_snapshot(
        &self,
        document_id: &str,
        fields: &DocumentFields,
        change_type: ChangeType,
        description: Option<&str>,
    ) -> Result<Snapshot, StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.documents.contains_key(document_id) {
            return Err(StoreError::DocumentNotFound(document_id.to_string()));
        }

        let sequence = state
            .snapshots
            .iter()
            .filter(|s| s.document_id == document_id)
            .map(|s| s.sequence)
            .max()
            .unwrap_or(0)
            + 1;

        let snapshot = Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            sequence,
            title: fields.title.clone(),
            content: fields.content.clone(),
            metadata: fields.metadata.clone(),
            change_type,
            description: description.map(String::from),
            content_hash: fields.content_hash(),
            is_primary: false,
            created_at: now_millis(),
        };
        state.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn list_snapshots(&self, document_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut snapshots: Vec<Snapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| {
            b.sequence
                .cmp(&a.sequence)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(snapshots)
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.snapshots.iter().find(|s| s.id == snapshot_id).cloned())
    }

    async fn mark_primary(&self, document_id: &str, snapshot_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let snapshot = state
            .snapshots
            .iter_mut()
            .find(|s| s.id == snapshot_id && s.document_id == document_id)
            .ok_or_else(|| StoreError::SnapshotNotFound(snapshot_id.to_string()))?;

        if snapshot.change_type != ChangeType::Initial {
            return Err(StoreError::Backend(format!(
                "snapshot {} is not an initial version",
                snapshot_id
            )));
        }
        snapshot.is_primary = true;
        Ok(())
    }
}
