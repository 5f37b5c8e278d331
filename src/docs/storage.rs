use async_trait::async_trait;
use rusqlite::Row;
use std::collections::BTreeMap;

use super::store::{DocumentStore, StoreError};
use super::types::{
    ChangeType, CreateDocumentInput, Document, DocumentFields, Snapshot, UpdateDocumentInput,
};
use crate::database::{Database, DbError};

impl Database {
    /// Create the documents and snapshot-log tables.
    pub fn create_docs_tables(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_updated_at
             ON documents(updated_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_snapshots (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                sequence INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                change_type TEXT NOT NULL,
                description TEXT,
                content_hash TEXT NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_document
             ON document_snapshots(document_id, sequence DESC)",
            [],
        )?;

        Ok(())
    }

    /// Create a new document.
    pub fn create_document(&self, input: &CreateDocumentInput) -> Result<Document, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let now = chrono::Utc::now().timestamp_millis();
        let id = uuid::Uuid::new_v4().to_string();
        let content = input.content.clone().unwrap_or_default();
        let metadata = input.metadata.clone().unwrap_or_default();
        let metadata_json = serde_json::to_string(&metadata)?;

        conn.execute(
            "INSERT INTO documents (id, title, content, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, input.title, content, metadata_json, now, now],
        )?;

        Ok(Document {
            id,
            title: input.title.clone(),
            content,
            metadata,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a document by ID.
    pub fn get_document(&self, id: &str) -> Result<Option<Document>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, title, content, metadata, created_at, updated_at
             FROM documents WHERE id = ?1",
        )?;
        let mut rows = stmt.query([id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(map_document(row)?))
        } else {
            Ok(None)
        }
    }

    /// Apply a partial update. Metadata entries are merged into the stored
    /// map; other fields replace wholesale when present.
    pub fn update_document(
        &self,
        id: &str,
        input: &UpdateDocumentInput,
    ) -> Result<Option<Document>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let now = chrono::Utc::now().timestamp_millis();

        if input.is_empty() {
            drop(conn);
            return self.get_document(id);
        }

        // Merge metadata against the stored map before building the update
        let merged_metadata = if let Some(patch) = &input.metadata {
            let existing: Option<String> = conn
                .query_row("SELECT metadata FROM documents WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .ok();

            let mut map: BTreeMap<String, String> = match existing {
                Some(json) => serde_json::from_str(&json).unwrap_or_default(),
                None => return Ok(None),
            };
            for (key, value) in patch {
                map.insert(key.clone(), value.clone());
            }
            Some(serde_json::to_string(&map)?)
        } else {
            None
        };

        // Build dynamic update query
        let mut updates = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(title) = &input.title {
            updates.push(format!("title = ?{}", param_idx));
            params.push(Box::new(title.clone()));
            param_idx += 1;
        }

        if let Some(content) = &input.content {
            updates.push(format!("content = ?{}", param_idx));
            params.push(Box::new(content.clone()));
            param_idx += 1;
        }

        if let Some(metadata_json) = merged_metadata {
            updates.push(format!("metadata = ?{}", param_idx));
            params.push(Box::new(metadata_json));
            param_idx += 1;
        }

        updates.push(format!("updated_at = ?{}", param_idx));
        params.push(Box::new(now));
        param_idx += 1;

        let sql = format!(
            "UPDATE documents SET {} WHERE id = ?{}",
            updates.join(", "),
            param_idx
        );
        params.push(Box::new(id.to_string()));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let affected = conn.execute(&sql, params_refs.as_slice())?;

        if affected == 0 {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT id, title, content, metadata, created_at, updated_at
             FROM documents WHERE id = ?1",
        )?;
        let mut rows = stmt.query([id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(map_document(row)?))
        } else {
            Ok(None)
        }
    }

    /// List all documents, most recently updated first.
    pub fn list_documents(&self) -> Result<Vec<Document>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, title, content, metadata, created_at, updated_at
             FROM documents
             ORDER BY updated_at DESC",
        )?;
        let mut rows = stmt.query([])?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(map_document(row)?);
        }
        Ok(documents)
    }

    /// Delete a document and its snapshot log.
    pub fn delete_document(&self, id: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        // Cascade handles snapshots when foreign keys are on; delete
        // explicitly as well so in-memory databases behave the same.
        conn.execute(
            "DELETE FROM document_snapshots WHERE document_id = ?1",
            [id],
        )?;
        let affected = conn.execute("DELETE FROM documents WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Append a snapshot, assigning the next sequence for the document.
    pub fn append_snapshot(
        &self,
        document_id: &str,
        fields: &DocumentFields,
        change_type: ChangeType,
        description: Option<&str>,
    ) -> Result<Snapshot, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let now = chrono::Utc::now().timestamp_millis();
        let id = uuid::Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(&fields.metadata)?;
        let content_hash = fields.content_hash();

        // The connection lock serializes appends, so max+1 is race-free.
        let sequence: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM document_snapshots WHERE document_id = ?1",
            [document_id],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO document_snapshots (
                id, document_id, sequence, title, content, metadata,
                change_type, description, content_hash, is_primary, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
            rusqlite::params![
                id,
                document_id,
                sequence,
                fields.title,
                fields.content,
                metadata_json,
                change_type.as_str(),
                description,
                content_hash,
                now,
            ],
        )?;

        Ok(Snapshot {
            id,
            document_id: document_id.to_string(),
            sequence,
            title: fields.title.clone(),
            content: fields.content.clone(),
            metadata: fields.metadata.clone(),
            change_type,
            description: description.map(String::from),
            content_hash,
            is_primary: false,
            created_at: now,
        })
    }

    /// List a document's snapshots, highest sequence first.
    pub fn list_document_snapshots(&self, document_id: &str) -> Result<Vec<Snapshot>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, document_id, sequence, title, content, metadata,
                    change_type, description, content_hash, is_primary, created_at
             FROM document_snapshots
             WHERE document_id = ?1
             ORDER BY sequence DESC, created_at DESC",
        )?;
        let mut rows = stmt.query([document_id])?;

        let mut snapshots = Vec::new();
        while let Some(row) = rows.next()? {
            snapshots.push(map_snapshot(row)?);
        }
        Ok(snapshots)
    }

    /// Get a snapshot by ID.
    pub fn get_document_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, document_id, sequence, title, content, metadata,
                    change_type, description, content_hash, is_primary, created_at
             FROM document_snapshots WHERE id = ?1",
        )?;
        let mut rows = stmt.query([snapshot_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(map_snapshot(row)?))
        } else {
            Ok(None)
        }
    }

    /// Flip `is_primary` on one initial snapshot.
    pub fn mark_snapshot_primary(
        &self,
        document_id: &str,
        snapshot_id: &str,
    ) -> Result<bool, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let affected = conn.execute(
            "UPDATE document_snapshots SET is_primary = 1
             WHERE id = ?1 AND document_id = ?2 AND change_type = 'initial'",
            rusqlite::params![snapshot_id, document_id],
        )?;
        Ok(affected > 0)
    }
}

fn map_document(row: &Row<'_>) -> Result<Document, DbError> {
    let metadata_json: String = row.get(3)?;
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_snapshot(row: &Row<'_>) -> Result<Snapshot, DbError> {
    let metadata_json: String = row.get(5)?;
    let change_type: String = row.get(6)?;
    let is_primary: i64 = row.get(9)?;
    Ok(Snapshot {
        id: row.get(0)?,
        document_id: row.get(1)?,
        sequence: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        change_type: ChangeType::from_str(&change_type),
        description: row.get(7)?,
        content_hash: row.get(8)?,
        is_primary: is_primary != 0,
        created_at: row.get(10)?,
    })
}

#[async_trait]
impl DocumentStore for Database {
    async fn get(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        self.get_document(document_id)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn create(&self, input: &CreateDocumentInput) -> Result<Document, StoreError> {
        self.create_document(input)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn update(
        &self,
        document_id: &str,
        input: &UpdateDocumentInput,
    ) -> Result<Document, StoreError> {
        self.update_document(document_id, input)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .ok_or_else(|| StoreError::DocumentNotFound(document_id.to_string()))
    }

    async fn delete(&self, document_id: &str) -> Result<bool, StoreError> {
        self.delete_document(document_id)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        self.list_documents()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn create_snapshot(
        &self,
        document_id: &str,
        fields: &DocumentFields,
        change_type: ChangeType,
        description: Option<&str>,
    ) -> Result<Snapshot, StoreError> {
        self.append_snapshot(document_id, fields, change_type, description)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_snapshots(&self, document_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        self.list_document_snapshots(document_id)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StoreError> {
        self.get_document_snapshot(snapshot_id)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn mark_primary(&self, document_id: &str, snapshot_id: &str) -> Result<(), StoreError> {
        let updated = self
            .mark_snapshot_primary(document_id, snapshot_id)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::SnapshotNotFound(snapshot_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::in_memory().expect("in-memory database")
    }

    #[test]
    fn test_create_and_get_document() {
        let db = test_db();
        let doc = db
            .create_document(&CreateDocumentInput {
                title: "A".to_string(),
                content: Some("hello".to_string()),
                metadata: None,
            })
            .unwrap();

        let fetched = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(fetched.title, "A");
        assert_eq!(fetched.content, "hello");
        assert!(fetched.metadata.is_empty());
    }

    #[test]
    fn test_update_document_merges_metadata() {
        let db = test_db();
        let mut metadata = BTreeMap::new();
        metadata.insert("status".to_string(), "draft".to_string());
        let doc = db
            .create_document(&CreateDocumentInput {
                title: "A".to_string(),
                content: None,
                metadata: Some(metadata),
            })
            .unwrap();

        let mut patch = BTreeMap::new();
        patch.insert("transcript".to_string(), "raw notes".to_string());
        let updated = db
            .update_document(
                &doc.id,
                &UpdateDocumentInput {
                    title: None,
                    content: Some("body".to_string()),
                    metadata: Some(patch),
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.content, "body");
        assert_eq!(updated.metadata.get("status").unwrap(), "draft");
        assert_eq!(updated.metadata.get("transcript").unwrap(), "raw notes");
    }

    #[test]
    fn test_update_missing_document_returns_none() {
        let db = test_db();
        let result = db
            .update_document(
                "missing",
                &UpdateDocumentInput {
                    title: Some("x".to_string()),
                    content: None,
                    metadata: None,
                },
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_snapshot_sequence_and_order() {
        let db = test_db();
        let doc = db.create_document(&CreateDocumentInput::new("A")).unwrap();

        let s1 = db
            .append_snapshot(&doc.id, &DocumentFields::new("A", "v1"), ChangeType::Manual, None)
            .unwrap();
        let s2 = db
            .append_snapshot(
                &doc.id,
                &DocumentFields::new("A", "v2"),
                ChangeType::Auto,
                Some("background save"),
            )
            .unwrap();

        assert_eq!(s1.sequence, 1);
        assert_eq!(s2.sequence, 2);

        let listed = db.list_document_snapshots(&doc.id).unwrap();
        assert_eq!(listed[0].sequence, 2);
        assert_eq!(listed[0].change_type, ChangeType::Auto);
        assert_eq!(listed[0].description.as_deref(), Some("background save"));
        assert_eq!(listed[1].sequence, 1);
    }

    #[test]
    fn test_snapshot_metadata_round_trip() {
        let db = test_db();
        let doc = db.create_document(&CreateDocumentInput::new("A")).unwrap();

        let mut fields = DocumentFields::new("A", "body");
        fields
            .metadata
            .insert("category".to_string(), "youtube".to_string());
        let snapshot = db
            .append_snapshot(&doc.id, &fields, ChangeType::Manual, None)
            .unwrap();

        let fetched = db.get_document_snapshot(&snapshot.id).unwrap().unwrap();
        assert_eq!(fetched.metadata.get("category").unwrap(), "youtube");
        assert_eq!(fetched.content_hash, fields.content_hash());
    }

    #[test]
    fn test_mark_primary_only_for_initial() {
        let db = test_db();
        let doc = db.create_document(&CreateDocumentInput::new("A")).unwrap();

        let initial = db
            .append_snapshot(&doc.id, &DocumentFields::new("A", "draft"), ChangeType::Initial, None)
            .unwrap();
        let manual = db
            .append_snapshot(&doc.id, &DocumentFields::new("A", "v2"), ChangeType::Manual, None)
            .unwrap();

        assert!(db.mark_snapshot_primary(&doc.id, &initial.id).unwrap());
        assert!(!db.mark_snapshot_primary(&doc.id, &manual.id).unwrap());

        let listed = db.list_document_snapshots(&doc.id).unwrap();
        assert!(listed.iter().find(|s| s.id == initial.id).unwrap().is_primary);
    }

    #[test]
    fn test_delete_document_removes_snapshots() {
        let db = test_db();
        let doc = db.create_document(&CreateDocumentInput::new("A")).unwrap();
        db.append_snapshot(&doc.id, &DocumentFields::new("A", "v1"), ChangeType::Manual, None)
            .unwrap();

        assert!(db.delete_document(&doc.id).unwrap());
        assert!(db.get_document(&doc.id).unwrap().is_none());
        assert!(db.list_document_snapshots(&doc.id).unwrap().is_empty());
    }
}
