//! Per-document processing pipeline.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::db::{Document, DocumentStatus};
use crate::enrichment::{ClassificationResult, SummaryResult};
use crate::error::{ProcessingError, ServiceResult};
use crate::service::ArchivistService;

/// How a pipeline run ended, short of an error.
enum PipelineOutcome {
    Completed,
    /// The record was gone: a caller error, logged and dropped.
    RecordMissing,
    /// Shutdown hit mid-pipeline; the record stays non-terminal and the
    /// startup recovery pass requeues it.
    Interrupted,
}

impl ArchivistService {
    /// Process a single document (called by a worker).
    ///
    /// Never lets an error escape: every failure path ends in a terminal
    /// record state or a logged drop, and the worker's loop continues.
    pub(crate) async fn process_document(&self, document_id: &str) {
        match self.run_pipeline(document_id).await {
            Ok(PipelineOutcome::Completed) => {}
            Ok(PipelineOutcome::RecordMissing) => {}
            Ok(PipelineOutcome::Interrupted) => {
                info!(doc_id = %document_id, "Document processing interrupted by shutdown");
            }
            Err(e) => self.mark_failed(document_id, &e.to_string()),
        }
    }

    async fn run_pipeline(&self, document_id: &str) -> ServiceResult<PipelineOutcome> {
        let Some(mut document) = self.db.get_document(document_id)? else {
            error!(doc_id = %document_id, "Document record not found, dropping job");
            return Ok(PipelineOutcome::RecordMissing);
        };

        if self.cancel.is_cancelled() {
            return Ok(PipelineOutcome::Interrupted);
        }

        // Queued -> Processing
        document.status = DocumentStatus::Processing;
        document.processing_started_at = Some(Utc::now());
        document.processing_completed_at = None;
        let mut document = self.db.update_document(&document)?;

        info!(doc_id = %document.id, title = %document.title, "Processing document");

        let path = document
            .file_path
            .clone()
            .ok_or_else(|| ProcessingError::MissingContent {
                document_id: document.id.clone(),
            })?;

        // Two independent read handles so the concurrent enrichment calls
        // never share a stream position.
        let classify_reader = self.storage.open(&path).await?;
        let summarize_reader = self.storage.open(&path).await?;

        // Both calls absorb their own failures and always resolve.
        let (classification, summary) = tokio::join!(
            self.enrichment
                .classify(&document, classify_reader, &self.cancel),
            self.enrichment
                .summarize(&document, summarize_reader, &self.cancel),
        );

        debug!(
            doc_id = %document.id,
            category = %classification.primary_category,
            confidence = ?classification.confidences.get(&classification.primary_category),
            notes = %classification.notes,
            key_points = summary.key_points.len(),
            language = %summary.language,
            classify_ms = classification.processing_time.as_millis() as u64,
            summarize_ms = summary.processing_time.as_millis() as u64,
            "Enrichment finished"
        );

        // Interrupted enrichment would only merge cancellation noise; leave
        // the record Processing for the recovery pass instead.
        if self.cancel.is_cancelled() {
            return Ok(PipelineOutcome::Interrupted);
        }

        // Processing -> Processed
        merge_results(&mut document, classification, summary);
        document.status = DocumentStatus::Processed;
        document.processing_completed_at = Some(Utc::now());
        self.db.update_document(&document)?;

        info!(
            doc_id = %document.id,
            category = document.document_type_name.as_deref().unwrap_or("-"),
            "Document processed"
        );

        Ok(PipelineOutcome::Completed)
    }

    /// Terminal failure transition: record the error, bump the retry count.
    /// Re-submission is an explicit external action, never automatic.
    fn mark_failed(&self, document_id: &str, message: &str) {
        error!(doc_id = %document_id, error = %message, "Document processing failed");

        match self.db.get_document(document_id) {
            Ok(Some(mut document)) => {
                document.status = DocumentStatus::Failed;
                document.processing_error = Some(message.to_string());
                document.retry_count += 1;
                document.processing_completed_at = Some(Utc::now());
                if let Err(update_err) = self.db.update_document(&document) {
                    warn!(
                        doc_id = %document_id,
                        original_error = %message,
                        update_error = %update_err,
                        "Failed to mark document as failed"
                    );
                }
            }
            Ok(None) => {
                warn!(doc_id = %document_id, "Document disappeared before failure could be recorded");
            }
            Err(e) => {
                warn!(
                    doc_id = %document_id,
                    original_error = %message,
                    load_error = %e,
                    "Failed to reload document to record failure"
                );
            }
        }
    }
}

/// Fold enrichment outputs into the record.
///
/// Empty results leave existing fields untouched; when no extracted text was
/// ever populated, a short text is synthesized from category and tags so
/// downstream search has something to index.
fn merge_results(
    document: &mut Document,
    classification: ClassificationResult,
    summary: SummaryResult,
) {
    if !summary.summary.trim().is_empty() {
        document.summary = Some(summary.summary);
    }

    let category = classification.primary_category.trim();
    if !category.is_empty() {
        document.document_type_name = Some(category.to_string());
        document.document_type_category = Some(category.to_string());
    }
    if !classification.tags.is_empty() {
        document.tags = classification.tags;
    }

    let has_text = document
        .extracted_text
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if !has_text {
        document.extracted_text = Some(synthesize_index_text(
            document.document_type_name.as_deref(),
            &document.tags,
        ));
    }
}

fn synthesize_index_text(category: Option<&str>, tags: &[String]) -> String {
    let mut text = format!("Category: {}.", category.unwrap_or("Unknown"));
    if !tags.is_empty() {
        text.push_str(&format!(" Tags: {}.", tags.join(", ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::service::test_support::{
        RoutingTransport, SharedRouting, build_service, wait_for_terminal,
    };

    #[tokio::test]
    async fn document_is_enriched_end_to_end() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            2,
            None,
        );
        let workers = ArchivistService::start_worker_pool(service.clone());

        let uploaded = service
            .upload_document(b"Amount due: 42 EUR", "invoice.txt", "March invoice")
            .await
            .unwrap();

        let done = wait_for_terminal(&service, &uploaded.id).await;
        assert_eq!(done.status, DocumentStatus::Processed);
        assert_eq!(done.document_type_name.as_deref(), Some("Invoice"));
        assert_eq!(done.tags, vec!["financial", "urgent"]);
        assert!(done.summary.as_deref().unwrap_or("").contains("amounts owed"));
        assert!(done.processing_started_at.is_some());
        assert!(done.processing_completed_at.is_some());
        assert_eq!(done.retry_count, 0);

        service.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn missing_blob_ends_in_failed_with_message() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            1,
            None,
        );
        let workers = ArchivistService::start_worker_pool(service.clone());

        let uploaded = service
            .upload_document(b"text", "notes.txt", "Notes")
            .await
            .unwrap();
        // First run succeeds; steal the blob and run again.
        let done = wait_for_terminal(&service, &uploaded.id).await;
        assert_eq!(done.status, DocumentStatus::Processed);

        let stored = done.file_path.clone().unwrap();
        tokio::fs::remove_file(service.config.storage.data_dir.join(&stored))
            .await
            .unwrap();

        service.submit_document(&uploaded.id).await.unwrap();
        let failed = wait_for_terminal(&service, &uploaded.id).await;
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert!(!failed.processing_error.clone().unwrap_or_default().is_empty());
        assert_eq!(failed.retry_count, 1);

        // A second failed attempt increments the count exactly once more.
        service.submit_document(&uploaded.id).await.unwrap();
        let failed_again = wait_for_terminal(&service, &uploaded.id).await;
        assert_eq!(failed_again.retry_count, 2);

        service.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn worker_survives_a_failing_document() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            1,
            None,
        );
        let workers = ArchivistService::start_worker_pool(service.clone());

        // A record pointing at a blob that never existed.
        let mut broken = service
            .upload_document(b"x", "a.txt", "Broken")
            .await
            .unwrap();
        broken = wait_for_terminal(&service, &broken.id).await;
        broken.file_path = Some("documents/never-there.txt".to_string());
        broken.status = DocumentStatus::Failed;
        service.db.update_document(&broken).unwrap();
        service.submit_document(&broken.id).await.unwrap();
        let failed = wait_for_terminal(&service, &broken.id).await;
        assert_eq!(failed.status, DocumentStatus::Failed);

        // The same (sole) worker still processes the next document.
        let healthy = service
            .upload_document(b"hello", "b.txt", "Healthy")
            .await
            .unwrap();
        let done = wait_for_terminal(&service, &healthy.id).await;
        assert_eq!(done.status, DocumentStatus::Processed);

        service.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn degraded_enrichment_still_reaches_processed() {
        use crate::error::LlmError;
        use crate::llm::testing::ScriptedTransport;

        // Both enrichment calls hit fatal model errors.
        let transport = ScriptedTransport::shared(vec![
            Err(LlmError::Generation {
                status: 500,
                message: "boom".to_string(),
            }),
            Err(LlmError::Generation {
                status: 500,
                message: "boom".to_string(),
            }),
        ]);
        let (_dir, service) = build_service(Box::new(transport), 1, None);
        let workers = ArchivistService::start_worker_pool(service.clone());

        let uploaded = service
            .upload_document(b"text", "notes.txt", "Notes")
            .await
            .unwrap();
        let done = wait_for_terminal(&service, &uploaded.id).await;

        assert_eq!(done.status, DocumentStatus::Processed);
        assert_eq!(done.document_type_name.as_deref(), Some("Error"));
        assert!(done.summary.as_deref().unwrap_or("").starts_with("Error:"));
        assert_eq!(done.retry_count, 0);

        service.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[test]
    fn merge_keeps_existing_fields_on_empty_results() {
        let mut document = empty_document();
        document.summary = Some("old summary".to_string());
        document.extracted_text = Some("old text".to_string());

        merge_results(
            &mut document,
            ClassificationResult {
                primary_category: "".to_string(),
                confidences: HashMap::new(),
                tags: Vec::new(),
                processing_time: Duration::ZERO,
                notes: String::new(),
            },
            SummaryResult {
                summary: "  ".to_string(),
                key_points: Vec::new(),
                language: "en".to_string(),
                processing_time: Duration::ZERO,
            },
        );

        assert_eq!(document.summary.as_deref(), Some("old summary"));
        assert_eq!(document.extracted_text.as_deref(), Some("old text"));
        assert!(document.document_type_name.is_none());
    }

    #[test]
    fn merge_synthesizes_index_text_when_none_present() {
        let mut document = empty_document();

        merge_results(
            &mut document,
            ClassificationResult {
                primary_category: "Invoice".to_string(),
                confidences: HashMap::new(),
                tags: vec!["financial".to_string()],
                processing_time: Duration::ZERO,
                notes: String::new(),
            },
            SummaryResult {
                summary: "A bill.".to_string(),
                key_points: Vec::new(),
                language: "en".to_string(),
                processing_time: Duration::ZERO,
            },
        );

        assert_eq!(
            document.extracted_text.as_deref(),
            Some("Category: Invoice. Tags: financial.")
        );
    }

    fn empty_document() -> Document {
        let now = Utc::now();
        Document {
            id: "doc".to_string(),
            title: "Doc".to_string(),
            file_name: "doc.txt".to_string(),
            file_path: None,
            status: DocumentStatus::Processing,
            retry_count: 0,
            processing_started_at: Some(now),
            processing_completed_at: None,
            extracted_text: None,
            summary: None,
            document_type_name: None,
            document_type_category: None,
            tags: Vec::new(),
            processing_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
