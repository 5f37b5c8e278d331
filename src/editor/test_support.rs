use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::EditorConfig;
use crate::docs::{
    ChangeType, CreateDocumentInput, Document, DocumentFields, DocumentStore, MemoryStore,
    Snapshot, StoreError, UpdateDocumentInput,
};
use crate::llm::{GenerationError, GenerationRequest, TextGenerator};

use super::controller::EditorSession;
use super::session::SessionOptions;

/// Store wrapper for session tests: delegates to a `MemoryStore`, yields at
/// every call so in-flight windows are observable, counts calls, and injects
/// failures or stalls on demand.
pub(crate) struct RecordingStore {
    inner: MemoryStore,
    update_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
    fail_updates: AtomicBool,
    stall_updates: AtomicBool,
}

impl RecordingStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            update_calls: AtomicUsize::new(0),
            snapshot_calls: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
            stall_updates: AtomicBool::new(false),
        })
    }

    pub(crate) fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_updates(&self, on: bool) {
        self.fail_updates.store(on, Ordering::SeqCst);
    }

    /// While on, update calls park until released, keeping a save in flight.
    pub(crate) fn stall_updates(&self, on: bool) {
        self.stall_updates.store(on, Ordering::SeqCst);
    }

    async fn checkpoint(&self) {
        tokio::task::yield_now().await;
        while self.stall_updates.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(document_id).await
    }

    async fn create(&self, input: &CreateDocumentInput) -> Result<Document, StoreError> {
        self.inner.create(input).await
    }

    async fn update(
        &self,
        document_id: &str,
        input: &UpdateDocumentInput,
    ) -> Result<Document, StoreError> {
        self.checkpoint().await;
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected update failure".to_string()));
        }
        self.inner.update(document_id, input).await
    }

    async fn delete(&self, document_id: &str) -> Result<bool, StoreError> {
        self.inner.delete(document_id).await
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        self.inner.list().await
    }

    async fn create_snapshot(
        &self,
        document_id: &str,
        fields: &DocumentFields,
        change_type: ChangeType,
        description: Option<&str>,
    ) -> Result<Snapshot, StoreError> {
        tokio::task::yield_now().await;
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .create_snapshot(document_id, fields, change_type, description)
            .await
    }

    async fn list_snapshots(&self, document_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        self.inner.list_snapshots(document_id).await
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StoreError> {
        self.inner.get_snapshot(snapshot_id).await
    }

    async fn mark_primary(&self, document_id: &str, snapshot_id: &str) -> Result<(), StoreError> {
        self.inner.mark_primary(document_id, snapshot_id).await
    }
}

/// Canned generation collaborator.
pub(crate) struct StubGenerator {
    reply: Mutex<Result<String, GenerationError>>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StubGenerator {
    pub(crate) fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(text.to_string())),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Err(GenerationError::Http(
                "stub generator offline".to_string(),
            ))),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(String::new())),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub(crate) fn set_reply(&self, text: &str) {
        *self.reply.lock().unwrap() = Ok(text.to_string());
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(request.prompt.clone());
        self.reply.lock().unwrap().clone()
    }
}

/// Open a session over a fresh document backed by a `RecordingStore`.
pub(crate) async fn open_session(
    title: &str,
    content: &str,
    options: SessionOptions,
) -> (EditorSession, Arc<RecordingStore>) {
    open_session_with(title, content, options, StubGenerator::replying("generated text")).await
}

pub(crate) async fn open_session_with(
    title: &str,
    content: &str,
    options: SessionOptions,
    generator: Arc<StubGenerator>,
) -> (EditorSession, Arc<RecordingStore>) {
    let store = RecordingStore::new();
    let document = store
        .create(&CreateDocumentInput {
            title: title.to_string(),
            content: Some(content.to_string()),
            metadata: None,
        })
        .await
        .expect("create test document");

    let session = EditorSession::open(
        &document,
        store.clone(),
        generator,
        EditorConfig::default(),
        options,
    );
    // Let the freshly spawned timer tasks register their timers before the
    // test starts advancing the clock.
    settle().await;
    (session, store)
}

/// Let spawned session tasks run.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
