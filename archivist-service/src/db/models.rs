//! Database model structs.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Lifecycle status for documents.
///
/// Transitions move one way through
/// `Pending -> Queued -> Processing -> {Processed | Failed}`; an explicit
/// re-submission takes a failed document back to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Uploaded but not yet submitted for processing
    Pending,
    /// Submitted; waiting for a worker
    Queued,
    /// A worker is enriching the document
    Processing,
    /// Enrichment finished
    Processed,
    /// The processing attempt failed
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "queued" => DocumentStatus::Queued,
            "processing" => DocumentStatus::Processing,
            "processed" => DocumentStatus::Processed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Pending,
        }
    }

    /// Terminal states see no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Declared file name; its extension drives content extraction
    pub file_name: String,
    pub file_path: Option<String>,
    pub status: DocumentStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type_category: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub(crate) fn from_row(row: &Row<'_>, tags: Vec<String>) -> Result<Self, rusqlite::Error> {
        let status_str: String = row.get(4)?;
        let retry_count: i64 = row.get(5)?;
        let started_at_str: Option<String> = row.get(6)?;
        let completed_at_str: Option<String> = row.get(7)?;
        let created_at_str: String = row.get(13)?;
        let updated_at_str: String = row.get(14)?;

        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            file_name: row.get(2)?,
            file_path: row.get(3)?,
            status: DocumentStatus::from_str(&status_str),
            retry_count: retry_count.max(0) as u32,
            processing_started_at: started_at_str.as_deref().and_then(parse_timestamp),
            processing_completed_at: completed_at_str.as_deref().and_then(parse_timestamp),
            extracted_text: row.get(8)?,
            summary: row.get(9)?,
            document_type_name: row.get(10)?,
            document_type_category: row.get(11)?,
            tags,
            processing_error: row.get(12)?,
            created_at: parse_timestamp(&created_at_str).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&updated_at_str).unwrap_or_else(Utc::now),
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
