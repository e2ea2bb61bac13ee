//! Document record operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{Document, DocumentStatus};
use crate::error::{DatabaseError, ServiceResult};

const DOCUMENT_COLUMNS: &str = "id, title, file_name, file_path, status, retry_count, \
     processing_started_at, processing_completed_at, extracted_text, summary, \
     document_type_name, document_type_category, processing_error, created_at, updated_at";

impl Database {
    /// Insert a new document record
    pub fn insert_document(&self, doc: &Document) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO documents (id, title, file_name, file_path, status, retry_count,
                processing_started_at, processing_completed_at, extracted_text, summary,
                document_type_name, document_type_category, processing_error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                doc.id,
                doc.title,
                doc.file_name,
                doc.file_path,
                doc.status.as_str(),
                doc.retry_count as i64,
                doc.processing_started_at.map(|t| t.to_rfc3339()),
                doc.processing_completed_at.map(|t| t.to_rfc3339()),
                doc.extracted_text,
                doc.summary,
                doc.document_type_name,
                doc.document_type_category,
                doc.processing_error,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        for tag in &doc.tags {
            conn.execute(
                "INSERT OR IGNORE INTO document_tags (document_id, tag) VALUES (?1, ?2)",
                params![doc.id, tag],
            )
            .map_err(DatabaseError::Query)?;
        }

        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();

        let doc = conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                params![id],
                |row| Document::from_row(row, vec![]),
            )
            .optional()
            .map_err(DatabaseError::Query)?;

        if let Some(mut doc) = doc {
            let mut stmt = conn
                .prepare("SELECT tag FROM document_tags WHERE document_id = ?1 ORDER BY tag")
                .map_err(DatabaseError::Query)?;
            let tags: Vec<String> = stmt
                .query_map(params![id], |row| row.get(0))
                .map_err(DatabaseError::Query)?
                .filter_map(|r| r.ok())
                .collect();
            doc.tags = tags;
            Ok(Some(doc))
        } else {
            Ok(None)
        }
    }

    /// Persist the mutable fields of a document record.
    ///
    /// Always stamps `updated_at`; the returned record carries the stamp.
    pub fn update_document(&self, doc: &Document) -> ServiceResult<Document> {
        let conn = self.conn.lock().unwrap();
        let updated_at = Utc::now();

        let rows = conn
            .execute(
                r#"
                UPDATE documents
                SET title = ?2, file_name = ?3, file_path = ?4, status = ?5, retry_count = ?6,
                    processing_started_at = ?7, processing_completed_at = ?8,
                    extracted_text = ?9, summary = ?10,
                    document_type_name = ?11, document_type_category = ?12,
                    processing_error = ?13, updated_at = ?14
                WHERE id = ?1
                "#,
                params![
                    doc.id,
                    doc.title,
                    doc.file_name,
                    doc.file_path,
                    doc.status.as_str(),
                    doc.retry_count as i64,
                    doc.processing_started_at.map(|t| t.to_rfc3339()),
                    doc.processing_completed_at.map(|t| t.to_rfc3339()),
                    doc.extracted_text,
                    doc.summary,
                    doc.document_type_name,
                    doc.document_type_category,
                    doc.processing_error,
                    updated_at.to_rfc3339(),
                ],
            )
            .map_err(DatabaseError::Query)?;

        if rows == 0 {
            return Err(crate::error::ServiceError::DocumentNotFound {
                document_id: doc.id.clone(),
            });
        }

        conn.execute(
            "DELETE FROM document_tags WHERE document_id = ?1",
            params![doc.id],
        )
        .map_err(DatabaseError::Query)?;
        for tag in &doc.tags {
            conn.execute(
                "INSERT OR IGNORE INTO document_tags (document_id, tag) VALUES (?1, ?2)",
                params![doc.id, tag],
            )
            .map_err(DatabaseError::Query)?;
        }

        Ok(Document {
            updated_at,
            ..doc.clone()
        })
    }

    /// List documents in a given status, oldest first
    pub fn list_documents_by_status(&self, status: DocumentStatus) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE status = ?1 ORDER BY created_at"
            ))
            .map_err(DatabaseError::Query)?;
        let docs: Vec<Document> = stmt
            .query_map(params![status.as_str()], |row| {
                Document::from_row(row, vec![])
            })
            .map_err(DatabaseError::Query)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(docs)
    }

    /// List all documents, newest first
    pub fn list_documents(&self) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC"
            ))
            .map_err(DatabaseError::Query)?;
        let docs: Vec<Document> = stmt
            .query_map([], |row| Document::from_row(row, vec![]))
            .map_err(DatabaseError::Query)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(docs)
    }
}
