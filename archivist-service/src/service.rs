//! Service coordinator for the document processing pipeline.
//!
//! Owns the shared pieces every worker needs: the record store, blob storage,
//! the enrichment service, the job queue, the admission semaphore, and the
//! shutdown token.

mod processing;
mod submit;
mod sweep;
mod workers;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::db::{Database, Document, DocumentStatus};
use crate::enrichment::EnrichmentService;
use crate::error::ServiceResult;
use crate::llm::LlmClient;
use crate::queue::JobQueue;
use crate::storage::FileStorage;

/// Main service coordinator
pub struct ArchivistService {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub storage: Arc<FileStorage>,
    pub enrichment: Arc<EnrichmentService>,
    pub queue: Arc<JobQueue>,
    /// Admission permits bounding documents processed in parallel
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ArchivistService {
    /// Create a new service instance over the HTTP model transport
    pub fn new(config: AppConfig, db: Arc<Database>) -> ServiceResult<Self> {
        let llm = Arc::new(LlmClient::new(config.llm.clone())?);
        Ok(Self::with_llm(config, db, llm))
    }

    /// Create a service instance with a pre-built model client
    pub fn with_llm(config: AppConfig, db: Arc<Database>, llm: Arc<LlmClient>) -> Self {
        let storage = Arc::new(FileStorage::new(config.storage.data_dir.clone()));
        let enrichment = Arc::new(EnrichmentService::new(llm));
        let semaphore = Arc::new(Semaphore::new(config.processing.max_concurrent()));

        info!(
            workers = config.processing.workers,
            max_concurrent = config.processing.max_concurrent(),
            "Initializing archivist service"
        );

        Self {
            config,
            db,
            storage,
            enrichment,
            queue: Arc::new(JobQueue::new()),
            semaphore,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop accepting work and unblock all draining workers
    pub fn shutdown(&self) {
        info!("Shutting down document processing");
        self.cancel.cancel();
        self.queue.close();
    }

    pub fn get_document(&self, document_id: &str) -> ServiceResult<Option<Document>> {
        self.db.get_document(document_id)
    }

    pub fn list_documents(&self) -> ServiceResult<Vec<Document>> {
        self.db.list_documents()
    }

    pub fn list_documents_by_status(
        &self,
        status: DocumentStatus,
    ) -> ServiceResult<Vec<Document>> {
        self.db.list_documents_by_status(status)
    }
}
