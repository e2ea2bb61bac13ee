//! Recovery of abandoned work.
//!
//! The queue is in-memory, so a process restart drops whatever was buffered.
//! At startup every non-terminal record is requeued; afterwards a periodic
//! sweep requeues documents stuck in `Processing` past the staleness
//! threshold (their worker died or the process was killed mid-pipeline).

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::db::{Document, DocumentStatus};
use crate::queue::ProcessingJob;
use crate::service::ArchivistService;

impl ArchivistService {
    /// Requeue all documents left non-terminal by a previous process.
    ///
    /// Must run after the workers exist but before producers submit new
    /// work, so a record cannot be requeued and freshly enqueued at once.
    pub async fn recover_abandoned(&self) -> usize {
        let mut recovered = 0;

        for status in [DocumentStatus::Queued, DocumentStatus::Processing] {
            let documents = match self.db.list_documents_by_status(status) {
                Ok(documents) => documents,
                Err(e) => {
                    warn!(status = status.as_str(), error = %e, "Failed to list documents for recovery");
                    continue;
                }
            };

            for document in documents {
                if self.requeue(document).await {
                    recovered += 1;
                }
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Requeued abandoned documents");
        }
        recovered
    }

    /// Start the periodic stale-job sweep. Runs until shutdown.
    pub fn start_recovery_sweep(service: Arc<ArchivistService>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.processing.sweep_interval());
            // The immediate first tick; startup recovery already ran.
            interval.tick().await;

            info!("Recovery sweep started");
            loop {
                tokio::select! {
                    _ = service.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match service.requeue_stale().await {
                    0 => {}
                    count => info!(count, "Requeued stale documents"),
                }
            }
            info!("Recovery sweep stopped");
        })
    }

    /// Requeue documents `Processing` for longer than the staleness
    /// threshold. A live worker would have driven them to a terminal state
    /// long ago.
    pub(crate) async fn requeue_stale(&self) -> usize {
        let documents = match self.db.list_documents_by_status(DocumentStatus::Processing) {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, "Failed to list processing documents for sweep");
                return 0;
            }
        };

        let stale_after = chrono::Duration::from_std(self.config.processing.stale_after())
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        let threshold = Utc::now() - stale_after;

        let mut requeued = 0;
        for document in documents {
            let stale = document
                .processing_started_at
                .map(|started| started < threshold)
                .unwrap_or(true);
            if !stale {
                continue;
            }
            if self.requeue(document).await {
                requeued += 1;
            }
        }
        requeued
    }

    async fn requeue(&self, mut document: Document) -> bool {
        let document_id = document.id.clone();
        document.status = DocumentStatus::Queued;

        if let Err(e) = self.db.update_document(&document) {
            warn!(doc_id = %document_id, error = %e, "Failed to requeue document");
            return false;
        }
        if let Err(e) = self.queue.enqueue(ProcessingJob::new(&document_id)) {
            warn!(doc_id = %document_id, error = %e, "Failed to enqueue requeued document");
            return false;
        }

        info!(doc_id = %document_id, "Requeued abandoned document");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::service::test_support::{
        RoutingTransport, SharedRouting, build_service, wait_for_terminal,
    };

    /// Insert a record as a previous process would have left it, with its
    /// blob in place.
    async fn leftover_record(
        service: &ArchivistService,
        id: &str,
        status: DocumentStatus,
        started_at: Option<chrono::DateTime<Utc>>,
    ) {
        let path = service
            .storage
            .save(id, "old.txt", b"old content")
            .await
            .unwrap();
        let now = Utc::now();
        let document = Document {
            id: id.to_string(),
            title: "Old".to_string(),
            file_name: "old.txt".to_string(),
            file_path: Some(path),
            status,
            retry_count: 0,
            processing_started_at: started_at,
            processing_completed_at: None,
            extracted_text: None,
            summary: None,
            document_type_name: None,
            document_type_category: None,
            tags: Vec::new(),
            processing_error: None,
            created_at: now,
            updated_at: now,
        };
        service.db.insert_document(&document).unwrap();
    }

    #[tokio::test]
    async fn startup_recovery_requeues_non_terminal_records() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            1,
            None,
        );

        leftover_record(&service, "left-queued", DocumentStatus::Queued, None).await;
        leftover_record(
            &service,
            "left-processing",
            DocumentStatus::Processing,
            Some(Utc::now() - Duration::hours(1)),
        )
        .await;
        leftover_record(&service, "left-done", DocumentStatus::Processed, None).await;

        let recovered = service.recover_abandoned().await;
        assert_eq!(recovered, 2);

        let queued = service
            .list_documents_by_status(DocumentStatus::Queued)
            .unwrap();
        assert!(queued.iter().any(|d| d.id == "left-queued"));
        assert!(queued.iter().any(|d| d.id == "left-processing"));

        // Terminal records are left alone.
        let done = service.get_document("left-done").unwrap().unwrap();
        assert_eq!(done.status, DocumentStatus::Processed);

        let workers = ArchivistService::start_worker_pool(service.clone());
        let done = wait_for_terminal(&service, "left-processing").await;
        assert!(done.status.is_terminal());

        service.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn sweep_requeues_only_stale_processing_documents() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            1,
            None,
        );

        leftover_record(
            &service,
            "fresh",
            DocumentStatus::Processing,
            Some(Utc::now()),
        )
        .await;
        leftover_record(
            &service,
            "stale",
            DocumentStatus::Processing,
            Some(Utc::now() - Duration::hours(2)),
        )
        .await;

        let requeued = service.requeue_stale().await;
        assert_eq!(requeued, 1);

        let reread_stale = service.get_document("stale").unwrap().unwrap();
        assert_eq!(reread_stale.status, DocumentStatus::Queued);
        let reread_fresh = service.get_document("fresh").unwrap().unwrap();
        assert_eq!(reread_fresh.status, DocumentStatus::Processing);
    }
}
