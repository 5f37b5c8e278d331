use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::docs::DocumentFields;

/// Addresses one editable field of a draft.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Title,
    Content,
    /// A metadata entry by key (status, category, transcript…).
    Meta(String),
}

impl Field {
    pub fn meta(key: impl Into<String>) -> Self {
        Field::Meta(key.into())
    }
}

/// Per-session field policy: which metadata keys are dirty-tracked and which
/// fields take the debounced single-field autosave path.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub tracked_meta: Vec<String>,
    pub debounced: Vec<Field>,
}

impl SessionOptions {
    /// Track a metadata key for dirty detection.
    pub fn track_meta(mut self, key: impl Into<String>) -> Self {
        self.tracked_meta.push(key.into());
        self
    }

    /// Route a field through the debounced autosave instead of waiting for
    /// the periodic full save.
    pub fn debounce(mut self, field: Field) -> Self {
        self.debounced.push(field);
        self
    }
}

/// The live, in-memory editing state for one open document: the fields being
/// edited plus the last-persisted baseline used for dirty detection.
///
/// Ephemeral by design — never persisted itself.
#[derive(Debug, Clone)]
pub struct DraftSession {
    baseline: DocumentFields,
    live: DocumentFields,
    tracked: BTreeSet<Field>,
}

impl DraftSession {
    /// Open a session over freshly loaded fields. `Title` and `Content` are
    /// always tracked; metadata keys only when explicitly registered.
    pub fn open(fields: DocumentFields, tracked_meta: &[String]) -> Self {
        let mut tracked = BTreeSet::new();
        tracked.insert(Field::Title);
        tracked.insert(Field::Content);
        for key in tracked_meta {
            tracked.insert(Field::Meta(key.clone()));
        }

        Self {
            baseline: fields.clone(),
            live: fields,
            tracked,
        }
    }

    /// Register an additional metadata key for dirty tracking.
    pub fn track_meta(&mut self, key: impl Into<String>) {
        self.tracked.insert(Field::Meta(key.into()));
    }

    /// Set a live field. Never touches the baseline.
    pub fn edit(&mut self, field: &Field, value: impl Into<String>) {
        set_field(&mut self.live, field, value.into());
    }

    /// True iff any tracked field differs between live and baseline.
    pub fn is_dirty(&self) -> bool {
        self.tracked
            .iter()
            .any(|field| field_value(&self.live, field) != field_value(&self.baseline, field))
    }

    /// The tracked fields that currently differ from the baseline.
    pub fn dirty_fields(&self) -> Vec<Field> {
        self.tracked
            .iter()
            .filter(|field| field_value(&self.live, field) != field_value(&self.baseline, field))
            .cloned()
            .collect()
    }

    /// Reset both live and baseline to `fields`. Used by restore and by
    /// primary-version selection, where the persisted state replaces the
    /// draft wholesale.
    pub fn rebase(&mut self, fields: DocumentFields) {
        self.baseline = fields.clone();
        self.live = fields;
    }

    /// Record that `fields` were successfully persisted. Only the baseline
    /// moves, so edits made while the save was in flight stay dirty.
    pub fn mark_persisted(&mut self, fields: DocumentFields) {
        self.baseline = fields;
    }

    pub fn live(&self) -> &DocumentFields {
        &self.live
    }

    pub fn baseline(&self) -> &DocumentFields {
        &self.baseline
    }

    pub fn value(&self, field: &Field) -> Option<&str> {
        field_value(&self.live, field)
    }
}

pub(crate) fn field_value<'a>(fields: &'a DocumentFields, field: &Field) -> Option<&'a str> {
    match field {
        Field::Title => Some(fields.title.as_str()),
        Field::Content => Some(fields.content.as_str()),
        Field::Meta(key) => fields.metadata.get(key).map(String::as_str),
    }
}

pub(crate) fn set_field(fields: &mut DocumentFields, field: &Field, value: String) {
    match field {
        Field::Title => fields.title = value,
        Field::Content => fields.content = value,
        Field::Meta(key) => {
            fields.metadata.insert(key.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session() -> DraftSession {
        DraftSession::open(DocumentFields::new("A", "hello"), &[])
    }

    #[test]
    fn test_freshly_opened_session_is_clean() {
        let session = open_session();
        assert!(!session.is_dirty());
        assert!(session.dirty_fields().is_empty());
    }

    #[test]
    fn test_edit_marks_dirty_and_revert_clears_it() {
        let mut session = open_session();

        session.edit(&Field::Content, "hello world");
        assert!(session.is_dirty());
        assert_eq!(session.dirty_fields(), vec![Field::Content]);

        // Editing back to the baseline value makes the session clean again.
        session.edit(&Field::Content, "hello");
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_untracked_metadata_never_counts_toward_dirtiness() {
        let mut session = open_session();

        session.edit(&Field::meta("scratch"), "not tracked");
        assert!(!session.is_dirty());
        assert_eq!(session.value(&Field::meta("scratch")), Some("not tracked"));

        session.track_meta("scratch");
        assert!(session.is_dirty());
    }

    #[test]
    fn test_tracked_metadata_registered_at_open() {
        let mut session =
            DraftSession::open(DocumentFields::new("A", "hello"), &["transcript".to_string()]);

        session.edit(&Field::meta("transcript"), "raw notes");
        assert_eq!(session.dirty_fields(), vec![Field::meta("transcript")]);
    }

    #[test]
    fn test_mark_persisted_keeps_later_edits_dirty() {
        let mut session = open_session();
        session.edit(&Field::Content, "hello world");
        let saved = session.live().clone();

        // An edit lands while the save is still in flight.
        session.edit(&Field::Content, "hello world again");
        session.mark_persisted(saved);

        assert!(session.is_dirty());
        assert_eq!(session.live().content, "hello world again");
        assert_eq!(session.baseline().content, "hello world");
    }

    #[test]
    fn test_rebase_resets_live_and_baseline() {
        let mut session = open_session();
        session.edit(&Field::Title, "B");
        session.edit(&Field::Content, "edited");

        session.rebase(DocumentFields::new("A", "restored"));
        assert!(!session.is_dirty());
        assert_eq!(session.live().content, "restored");
        assert_eq!(session.baseline().title, "A");
    }
}
