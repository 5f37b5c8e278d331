mod storage;
mod store;
mod types;

pub use store::{DocumentStore, MemoryStore, StoreError};
pub use types::{
    ChangeType, CreateDocumentInput, Document, DocumentFields, Snapshot, UpdateDocumentInput,
};
