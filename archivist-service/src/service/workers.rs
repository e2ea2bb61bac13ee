//! Background workers draining the job queue.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::service::ArchivistService;

impl ArchivistService {
    /// Start the fixed pool of pipeline workers.
    ///
    /// Called once on server startup. Each worker loops dequeuing a job,
    /// acquiring an admission permit, and running the per-document pipeline;
    /// the permit is released whatever the outcome. Workers stop when the
    /// shutdown token fires or the queue closes.
    pub fn start_worker_pool(service: Arc<ArchivistService>) -> Vec<JoinHandle<()>> {
        let count = service.config.processing.workers.max(1);

        (0..count)
            .map(|worker_id| {
                let service = service.clone();
                tokio::spawn(async move {
                    info!(worker_id, "Pipeline worker started");
                    loop {
                        let job = tokio::select! {
                            _ = service.cancel.cancelled() => break,
                            job = service.queue.dequeue() => job,
                        };
                        let Some(job) = job else { break };

                        let permit = match service.semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };

                        service.process_document(&job.document_id).await;
                        drop(permit);
                    }
                    info!(worker_id, "Pipeline worker stopped");
                })
            })
            .collect()
    }
}
