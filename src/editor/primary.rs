use std::sync::Arc;
use tracing::debug;

use crate::config::EditorConfig;
use crate::docs::{Document, DocumentStore, Snapshot, UpdateDocumentInput};
use crate::error::EditorError;
use crate::llm::TextGenerator;

use super::controller::EditorSession;
use super::session::SessionOptions;

/// Result of opening a document for editing.
///
/// A document created with several competing `initial` snapshots is not
/// editable until one of them is chosen as primary.
pub enum DocumentOpening {
    Editable(EditorSession),
    AwaitingPrimary(PrimarySelection),
}

impl DocumentOpening {
    /// Unwrap the editable session, failing when a primary version still has
    /// to be chosen.
    pub fn into_session(self) -> Result<EditorSession, EditorError> {
        match self {
            DocumentOpening::Editable(session) => Ok(session),
            DocumentOpening::AwaitingPrimary(_) => Err(EditorError::AwaitingPrimary),
        }
    }
}

/// The `awaiting_primary_selection` state: candidate first versions of a new
/// document, exactly one of which must be chosen before editing starts.
pub struct PrimarySelection {
    document: Document,
    candidates: Vec<Snapshot>,
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    config: EditorConfig,
    options: SessionOptions,
}

impl PrimarySelection {
    pub(crate) fn new(
        document: Document,
        candidates: Vec<Snapshot>,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        config: EditorConfig,
        options: SessionOptions,
    ) -> Self {
        Self {
            document,
            candidates,
            store,
            generator,
            config,
            options,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The competing initial snapshots, in sequence order (highest first).
    pub fn candidates(&self) -> &[Snapshot] {
        &self.candidates
    }

    /// Choose the authoritative first version: mark it primary (siblings stay
    /// untouched and immutable), persist its fields as the document state,
    /// and open an editing session rebased to it.
    pub async fn choose_primary(self, snapshot_id: &str) -> Result<EditorSession, EditorError> {
        let chosen = self
            .candidates
            .iter()
            .find(|s| s.id == snapshot_id)
            .ok_or_else(|| EditorError::SnapshotNotFound(snapshot_id.to_string()))?;

        self.store
            .mark_primary(&self.document.id, snapshot_id)
            .await?;

        let fields = chosen.fields();
        self.store
            .update(
                &self.document.id,
                &UpdateDocumentInput::from_fields(&fields),
            )
            .await?;

        debug!(
            document_id = %self.document.id,
            snapshot = %snapshot_id,
            "primary version chosen"
        );

        Ok(EditorSession::open_with_fields(
            self.document.id,
            fields,
            self.store,
            self.generator,
            self.config,
            self.options,
        ))
    }
}
