use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::docs::{
    ChangeType, Document, DocumentFields, DocumentStore, Snapshot, UpdateDocumentInput,
};
use crate::error::EditorError;
use crate::llm::TextGenerator;

use super::autosave::{self, TimerHandles};
use super::session::{DraftSession, Field, SessionOptions};
use super::suggestion::PendingSuggestion;

type SharedSave = Shared<BoxFuture<'static, Result<Snapshot, EditorError>>>;

/// Outcome of a save attempt that refuses to queue behind an in-flight save.
#[derive(Debug)]
pub enum SaveAttempt {
    /// The save ran to completion (successfully or not).
    Completed(Result<Snapshot, EditorError>),
    /// A save was already in flight; nothing was started. Not an error.
    Suppressed,
}

/// An open editing session for one document: the draft state, the autosave
/// timers, the save/restore controller, and the suggestion staging slot.
///
/// Cheap to clone; all clones share the same session. Opening a session
/// spawns its timers and therefore requires a tokio runtime.
#[derive(Clone)]
pub struct EditorSession {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) document_id: String,
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) generator: Arc<dyn TextGenerator>,
    pub(crate) config: EditorConfig,
    pub(crate) draft: Mutex<DraftSession>,
    /// Fields routed through the debounced single-field autosave.
    pub(crate) debounced: Vec<Field>,
    pub(crate) edits_tx: mpsc::UnboundedSender<Field>,
    /// The one full save currently in flight, shared so concurrent callers
    /// join it instead of starting a second.
    pub(crate) in_flight: Mutex<Option<SharedSave>>,
    /// Serializes store mutations (save vs. restore) for this session.
    pub(crate) write_lock: AsyncMutex<()>,
    pub(crate) pending: Mutex<Option<PendingSuggestion>>,
    pub(crate) closed: AtomicBool,
    pub(crate) timers: Mutex<Option<TimerHandles>>,
}

impl EditorSession {
    pub(crate) fn open(
        document: &Document,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        config: EditorConfig,
        options: SessionOptions,
    ) -> Self {
        Self::open_with_fields(
            document.id.clone(),
            document.fields(),
            store,
            generator,
            config,
            options,
        )
    }

    pub(crate) fn open_with_fields(
        document_id: String,
        fields: DocumentFields,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        config: EditorConfig,
        options: SessionOptions,
    ) -> Self {
        let (edits_tx, edits_rx) = mpsc::unbounded_channel();
        let draft = DraftSession::open(fields, &options.tracked_meta);

        let inner = Arc::new(SessionInner {
            document_id,
            store,
            generator,
            config,
            draft: Mutex::new(draft),
            debounced: options.debounced,
            edits_tx,
            in_flight: Mutex::new(None),
            write_lock: AsyncMutex::new(()),
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
            timers: Mutex::new(None),
        });

        let handles = autosave::start(inner.clone(), edits_rx);
        *inner.timers.lock().unwrap() = Some(handles);

        debug!(document_id = %inner.document_id, "draft session opened");
        EditorSession { inner }
    }

    pub fn document_id(&self) -> &str {
        &self.inner.document_id
    }

    /// Set a live field. Debounce-registered fields also schedule a
    /// single-field autosave.
    pub fn edit(&self, field: Field, value: impl Into<String>) -> Result<(), EditorError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EditorError::SessionClosed);
        }

        self.inner.draft.lock().unwrap().edit(&field, value.into());

        if self.inner.debounced.contains(&field) {
            let _ = self.inner.edits_tx.send(field);
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.draft.lock().unwrap().is_dirty()
    }

    pub fn dirty_fields(&self) -> Vec<Field> {
        self.inner.draft.lock().unwrap().dirty_fields()
    }

    /// The live fields as currently edited.
    pub fn fields(&self) -> DocumentFields {
        self.inner.draft.lock().unwrap().live().clone()
    }

    /// True while a full save is in flight.
    pub fn is_saving(&self) -> bool {
        self.inner.in_flight.lock().unwrap().is_some()
    }

    /// Persist the live fields and append a snapshot.
    ///
    /// If a save is already in flight the call joins it and returns the same
    /// result; a second save is never started. On failure the draft keeps
    /// its dirty state, so retrying is just calling `save` again.
    pub async fn save(
        &self,
        change_type: ChangeType,
        description: Option<String>,
    ) -> Result<Snapshot, EditorError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EditorError::SessionClosed);
        }

        let shared = {
            let mut slot = self.inner.in_flight.lock().unwrap();
            if let Some(existing) = slot.as_ref() {
                debug!(document_id = %self.inner.document_id, "joining in-flight save");
                existing.clone()
            } else {
                let shared = spawn_save(self.inner.clone(), change_type, description);
                *slot = Some(shared.clone());
                shared
            }
        };
        shared.await
    }

    /// Like `save`, but a no-op when a save is already in flight. Used by
    /// the periodic autosave, which must never queue behind a running save.
    pub async fn try_save(&self, change_type: ChangeType) -> SaveAttempt {
        if self.inner.closed.load(Ordering::SeqCst) {
            return SaveAttempt::Suppressed;
        }

        let shared = {
            let mut slot = self.inner.in_flight.lock().unwrap();
            if slot.is_some() {
                return SaveAttempt::Suppressed;
            }
            let shared = spawn_save(self.inner.clone(), change_type, None);
            *slot = Some(shared.clone());
            shared
        };
        SaveAttempt::Completed(shared.await)
    }

    /// Restore a prior snapshot.
    ///
    /// The current live fields are backed up as a `restore`-typed snapshot
    /// *before* anything is overwritten, so a bad restore is itself
    /// recoverable. Returns the backup snapshot. The session comes out
    /// clean: a restore is an already-committed state change.
    pub async fn restore(&self, snapshot_id: &str) -> Result<Snapshot, EditorError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EditorError::SessionClosed);
        }

        let target = self
            .inner
            .store
            .get_snapshot(snapshot_id)
            .await?
            .filter(|s| s.document_id == self.inner.document_id)
            .ok_or_else(|| EditorError::SnapshotNotFound(snapshot_id.to_string()))?;

        let _write = self.inner.write_lock.lock().await;

        let current = self.inner.draft.lock().unwrap().live().clone();
        let backup = self
            .inner
            .store
            .create_snapshot(
                &self.inner.document_id,
                &current,
                ChangeType::Restore,
                Some("pre-restore backup"),
            )
            .await?;

        let fields = target.fields();
        self.inner
            .store
            .update(
                &self.inner.document_id,
                &UpdateDocumentInput::from_fields(&fields),
            )
            .await?;

        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner.draft.lock().unwrap().rebase(fields);
        }

        debug!(
            document_id = %self.inner.document_id,
            restored = %target.id,
            backup = %backup.id,
            "snapshot restored"
        );
        Ok(backup)
    }

    /// The document's snapshot log, highest sequence first.
    pub async fn history(&self) -> Result<Vec<Snapshot>, EditorError> {
        Ok(self
            .inner
            .store
            .list_snapshots(&self.inner.document_id)
            .await?)
    }

    /// Close the session: cancel both autosave timers and drop any pending
    /// suggestion. Idempotent. An in-flight save completing afterwards skips
    /// its rebase instead of touching a disposed session.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handles) = self.inner.timers.lock().unwrap().take() {
            handles.abort();
        }
        self.inner.pending.lock().unwrap().take();
        debug!(document_id = %self.inner.document_id, "draft session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Spawn the actual save work onto the runtime so it completes even if every
/// awaiter is dropped, and wrap the join handle in a shareable future.
fn spawn_save(
    inner: Arc<SessionInner>,
    change_type: ChangeType,
    description: Option<String>,
) -> SharedSave {
    let task = tokio::spawn(run_save(inner, change_type, description));
    async move {
        match task.await {
            Ok(result) => result,
            Err(e) => Err(EditorError::Persistence(format!("save task failed: {}", e))),
        }
    }
    .boxed()
    .shared()
}

async fn run_save(
    inner: Arc<SessionInner>,
    change_type: ChangeType,
    description: Option<String>,
) -> Result<Snapshot, EditorError> {
    let result = persist_live(&inner, change_type, description).await;
    // Release the in-flight slot before handing out the result.
    *inner.in_flight.lock().unwrap() = None;

    match &result {
        Ok(snapshot) => debug!(
            document_id = %inner.document_id,
            sequence = snapshot.sequence,
            change_type = change_type.as_str(),
            "draft saved"
        ),
        Err(e) => warn!(
            document_id = %inner.document_id,
            change_type = change_type.as_str(),
            error = %e,
            "save failed"
        ),
    }
    result
}

async fn persist_live(
    inner: &Arc<SessionInner>,
    change_type: ChangeType,
    description: Option<String>,
) -> Result<Snapshot, EditorError> {
    let _write = inner.write_lock.lock().await;

    let fields = inner.draft.lock().unwrap().live().clone();

    inner
        .store
        .update(&inner.document_id, &UpdateDocumentInput::from_fields(&fields))
        .await?;

    let snapshot = inner
        .store
        .create_snapshot(&inner.document_id, &fields, change_type, description.as_deref())
        .await?;

    // The session may have been closed while the save was in flight; a
    // disposed session is not rebased (no-op, not an error).
    if !inner.closed.load(Ordering::SeqCst) {
        inner.draft.lock().unwrap().mark_persisted(fields);
    }

    Ok(snapshot)
}
