use crate::docs::StoreError;
use crate::llm::GenerationError;

/// Errors surfaced by the editor core.
///
/// Clone-able on purpose: a save that is already in flight hands the same
/// result to every caller that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EditorError {
    /// The persistence collaborator could not be reached or rejected the
    /// operation. The draft session keeps its dirty state so the user can
    /// retry by saving again.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The generation collaborator errored, timed out, or returned empty
    /// content.
    #[error("generation failure: {0}")]
    Generation(String),

    /// The accept target no longer matches the live content verbatim. The
    /// caller must re-select; the suggestion is never applied at the wrong
    /// offset.
    #[error("stale selection: {0}")]
    StaleSpan(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// The session was closed; edits and saves against it are refused.
    #[error("draft session is closed")]
    SessionClosed,

    #[error("no pending suggestion to resolve")]
    NoPendingSuggestion,

    /// The document has competing initial versions and none has been chosen
    /// as primary yet.
    #[error("document is awaiting primary version selection")]
    AwaitingPrimary,
}

impl From<StoreError> for EditorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DocumentNotFound(id) => EditorError::NotFound(id),
            StoreError::SnapshotNotFound(id) => EditorError::SnapshotNotFound(id),
            StoreError::Backend(msg) => EditorError::Persistence(msg),
        }
    }
}

impl From<GenerationError> for EditorError {
    fn from(e: GenerationError) -> Self {
        EditorError::Generation(e.to_string())
    }
}
