use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EditorError;
use crate::llm::GenerationRequest;

use super::controller::EditorSession;
use super::session::Field;

/// Characters of surrounding document included in the generation prompt.
const CONTEXT_WINDOW: usize = 400;

/// The exact substring of the live content a suggestion targets. An empty
/// `text` marks a pure insertion point at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Byte offset into the live content.
    pub offset: usize,
    pub text: String,
}

impl SourceSpan {
    pub fn new(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }

    fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionState {
    Proposed,
    Accepted,
    Discarded,
}

/// How accepted text is folded into the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptMode {
    /// Substitute the span with the generated text at its exact offset.
    Replace,
    /// Keep the span and insert the generated text after its end.
    InsertBelow,
}

/// A staged, not-yet-applied AI-generated candidate tied to a selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSuggestion {
    pub id: String,
    pub span: SourceSpan,
    pub generated_text: String,
    pub state: SuggestionState,
    pub created_at: i64,
}

impl EditorSession {
    /// Ask the generation collaborator for a rewrite of `span`, staging the
    /// result for explicit acceptance. The live content is not touched.
    ///
    /// Any unresolved suggestion is implicitly discarded by a new request.
    /// Generation failures (including empty replies) leave no pending
    /// suggestion behind.
    pub async fn propose(
        &self,
        span: SourceSpan,
        instructions: &str,
    ) -> Result<PendingSuggestion, EditorError> {
        if self.is_closed() {
            return Err(EditorError::SessionClosed);
        }

        let (title, content) = {
            let draft = self.inner.draft.lock().unwrap();
            (draft.live().title.clone(), draft.live().content.clone())
        };
        verify_span(&content, &span)?;

        self.discard_suggestion();

        let prompt = build_prompt(&title, &content, &span, instructions);
        let request = GenerationRequest::new(prompt);

        let generated = self.inner.generator.generate(&request).await?;
        if generated.trim().is_empty() {
            return Err(EditorError::Generation(
                "model returned empty content".to_string(),
            ));
        }
        if self.is_closed() {
            return Err(EditorError::SessionClosed);
        }

        let suggestion = PendingSuggestion {
            id: uuid::Uuid::new_v4().to_string(),
            span,
            generated_text: generated,
            state: SuggestionState::Proposed,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        *self.inner.pending.lock().unwrap() = Some(suggestion.clone());

        debug!(document_id = %self.document_id(), suggestion = %suggestion.id, "suggestion staged");
        Ok(suggestion)
    }

    /// Fold the pending suggestion into the draft through the normal edit
    /// path and clear the staging slot, returning the accepted record.
    /// Refused with `StaleSpan` when the live content no longer matches the
    /// span verbatim; the suggestion then stays staged so the caller can
    /// re-select and re-propose.
    pub fn accept(&self, mode: AcceptMode) -> Result<PendingSuggestion, EditorError> {
        if self.is_closed() {
            return Err(EditorError::SessionClosed);
        }

        let suggestion = self
            .inner
            .pending
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.state == SuggestionState::Proposed)
            .ok_or(EditorError::NoPendingSuggestion)?;

        let content = self.inner.draft.lock().unwrap().live().content.clone();
        verify_span(&content, &suggestion.span)?;

        let span = &suggestion.span;
        let new_content = match mode {
            AcceptMode::Replace => format!(
                "{}{}{}",
                &content[..span.offset],
                suggestion.generated_text,
                &content[span.end()..]
            ),
            AcceptMode::InsertBelow => format!(
                "{}\n{}{}",
                &content[..span.end()],
                suggestion.generated_text,
                &content[span.end()..]
            ),
        };

        // Generation never bypasses dirty tracking.
        self.edit(Field::Content, new_content)?;

        let mut accepted = suggestion;
        accepted.state = SuggestionState::Accepted;
        self.inner.pending.lock().unwrap().take();
        Ok(accepted)
    }

    /// Drop the pending suggestion with no effect on the draft, returning the
    /// discarded record if there was one.
    pub fn discard_suggestion(&self) -> Option<PendingSuggestion> {
        let mut discarded = self.inner.pending.lock().unwrap().take()?;
        discarded.state = SuggestionState::Discarded;
        debug!(document_id = %self.document_id(), suggestion = %discarded.id, "suggestion discarded");
        Some(discarded)
    }

    pub fn pending_suggestion(&self) -> Option<PendingSuggestion> {
        self.inner.pending.lock().unwrap().clone()
    }
}

/// Check that `span` still matches the content verbatim at its offset.
fn verify_span(content: &str, span: &SourceSpan) -> Result<(), EditorError> {
    let end = span.end();
    let valid = end <= content.len()
        && content.is_char_boundary(span.offset)
        && content.is_char_boundary(end)
        && &content[span.offset..end] == span.text;

    if valid {
        Ok(())
    } else {
        Err(EditorError::StaleSpan(format!(
            "selection at offset {} no longer matches the document",
            span.offset
        )))
    }
}

/// Build the generation prompt: the user's instructions, the selected span,
/// and a window of surrounding document for context.
fn build_prompt(title: &str, content: &str, span: &SourceSpan, instructions: &str) -> String {
    let mut start = span.offset.saturating_sub(CONTEXT_WINDOW);
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (span.end() + CONTEXT_WINDOW).min(content.len());
    while end < content.len() && !content.is_char_boundary(end) {
        end += 1;
    }

    format!(
        r#"You are helping edit the document "{}".

Surrounding context:
{}

Selected text:
{}

{}

Respond ONLY with the replacement text for the selection. No preamble, no quotes."#,
        title,
        &content[start..end],
        span.text,
        instructions
    )
}
