use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::EditorConfig;
use crate::docs::{
    ChangeType, CreateDocumentInput, Document, DocumentFields, DocumentStore, Snapshot,
    UpdateDocumentInput,
};
use crate::editor::{DocumentOpening, EditorSession, PrimarySelection, SessionOptions};
use crate::error::EditorError;
use crate::llm::{parse_reply, AssistantReply, GenerationRequest, TextGenerator};

/// One candidate first draft in a generated reply.
#[derive(Debug, Deserialize)]
struct DraftCandidate {
    content: String,
}

/// Entry point for the hosting UI: wires a persistence collaborator and a
/// generation collaborator and hands out editing sessions.
pub struct Studio {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    config: EditorConfig,
}

impl Studio {
    pub fn new(store: Arc<dyn DocumentStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            config: EditorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EditorConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a document with a single authoritative first version.
    ///
    /// Every document carries at least one snapshot from the moment it is
    /// created.
    pub async fn create_document(
        &self,
        input: CreateDocumentInput,
    ) -> Result<Document, EditorError> {
        let document = self.store.create(&input).await?;
        self.store
            .create_snapshot(
                &document.id,
                &document.fields(),
                ChangeType::Initial,
                Some("created"),
            )
            .await?;
        debug!(document_id = %document.id, "document created");
        Ok(document)
    }

    /// Create a document with several competing first drafts. With two or
    /// more candidates the document opens in the awaiting-primary state
    /// until one is chosen; a lone candidate is authoritative immediately.
    pub async fn create_document_with_candidates(
        &self,
        title: &str,
        drafts: Vec<String>,
    ) -> Result<(Document, Vec<Snapshot>), EditorError> {
        let drafts = if drafts.is_empty() {
            vec![String::new()]
        } else {
            drafts
        };

        let mut document = self.store.create(&CreateDocumentInput::new(title)).await?;

        let mut snapshots = Vec::new();
        for (index, draft) in drafts.iter().enumerate() {
            let fields = DocumentFields::new(title, draft.clone());
            let snapshot = self
                .store
                .create_snapshot(
                    &document.id,
                    &fields,
                    ChangeType::Initial,
                    Some(&format!("candidate draft {}", index + 1)),
                )
                .await?;
            snapshots.push(snapshot);
        }

        if drafts.len() == 1 {
            document = self
                .store
                .update(
                    &document.id,
                    &UpdateDocumentInput {
                        content: Some(drafts[0].clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        debug!(
            document_id = %document.id,
            candidates = snapshots.len(),
            "document created with candidate drafts"
        );
        Ok((document, snapshots))
    }

    /// Ask the generation collaborator for `count` candidate first drafts.
    ///
    /// The reply is decoded strictly as a JSON candidate array; anything that
    /// does not validate is kept as a single raw-text draft rather than
    /// dropped.
    pub async fn generate_draft_candidates(
        &self,
        title: &str,
        brief: &str,
        count: usize,
    ) -> Result<Vec<String>, EditorError> {
        let prompt = format!(
            r#"You are drafting content for a document titled "{}".

Brief:
{}

Write {} alternative first drafts. Respond ONLY with a JSON array of objects like:
[{{"content": "first draft text"}}, {{"content": "second draft text"}}]"#,
            title, brief, count
        );

        let response = self
            .generator
            .generate(&GenerationRequest::new(prompt))
            .await?;

        let drafts = match parse_reply::<Vec<DraftCandidate>>(&response) {
            AssistantReply::Structured(candidates) => {
                let drafts: Vec<String> = candidates
                    .into_iter()
                    .map(|c| c.content)
                    .filter(|c| !c.trim().is_empty())
                    .collect();
                if drafts.is_empty() {
                    vec![response.trim().to_string()]
                } else {
                    drafts
                }
            }
            AssistantReply::Raw(raw) => vec![raw],
        };
        Ok(drafts)
    }

    /// Open a document for editing.
    ///
    /// Returns `AwaitingPrimary` when the document still has two or more
    /// competing `initial` snapshots and none chosen; `Editable` otherwise.
    pub async fn open(
        &self,
        document_id: &str,
        options: SessionOptions,
    ) -> Result<DocumentOpening, EditorError> {
        let document = self
            .store
            .get(document_id)
            .await?
            .ok_or_else(|| EditorError::NotFound(document_id.to_string()))?;

        let snapshots = self.store.list_snapshots(document_id).await?;
        let initials: Vec<Snapshot> = snapshots
            .into_iter()
            .filter(|s| s.change_type == ChangeType::Initial)
            .collect();

        if initials.len() >= 2 && !initials.iter().any(|s| s.is_primary) {
            return Ok(DocumentOpening::AwaitingPrimary(PrimarySelection::new(
                document,
                initials,
                self.store.clone(),
                self.generator.clone(),
                self.config.clone(),
                options,
            )));
        }

        Ok(DocumentOpening::Editable(EditorSession::open(
            &document,
            self.store.clone(),
            self.generator.clone(),
            self.config.clone(),
            options,
        )))
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>, EditorError> {
        Ok(self.store.get(document_id).await?)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, EditorError> {
        Ok(self.store.list().await?)
    }

    /// A document's version history, highest sequence first.
    pub async fn history(&self, document_id: &str) -> Result<Vec<Snapshot>, EditorError> {
        Ok(self.store.list_snapshots(document_id).await?)
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<bool, EditorError> {
        Ok(self.store.delete(document_id).await?)
    }
}
