pub mod config;
pub mod database;
pub mod docs;
pub mod editor;
pub mod error;
pub mod llm;
pub mod studio;

pub use config::EditorConfig;
pub use database::{Database, DbError};
pub use docs::{
    ChangeType, CreateDocumentInput, Document, DocumentFields, DocumentStore, MemoryStore,
    Snapshot, StoreError, UpdateDocumentInput,
};
pub use editor::{
    AcceptMode, DocumentOpening, DraftSession, EditorSession, Field, GuardState, LeaveOutcome,
    LeavePrompt, LeaveResolution, PendingSuggestion, PrimarySelection, SaveAttempt,
    SessionOptions, SourceSpan, SuggestionState,
};
pub use error::EditorError;
pub use llm::{
    parse_reply, AssistantReply, ClaudeClient, GenerationError, GenerationRequest, LlmSettings,
    Message, TextGenerator,
};
pub use studio::Studio;
