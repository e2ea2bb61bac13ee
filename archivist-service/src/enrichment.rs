//! Document enrichment via the external model endpoint.
//!
//! Two operations, `classify` and `summarize`, each composing content
//! extraction, prompt construction, model invocation, and response parsing.
//! Both absorb every internal failure into a degraded-but-valid result; the
//! processing pipeline never fails solely because an enrichment call failed.

pub mod parsers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::db::Document;
use crate::error::{ProcessingError, ServiceResult};
use crate::extraction;
use crate::llm::LlmClient;

/// Outcome of a classification call. Always structurally valid; a failed call
/// carries `primary_category = "Error"` and the failure in `notes`.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub primary_category: String,
    pub confidences: HashMap<String, f64>,
    pub tags: Vec<String>,
    pub processing_time: Duration,
    pub notes: String,
}

/// Outcome of a summarization call. A failed call carries
/// `summary = "Error: <message>"`.
#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub language: String,
    pub processing_time: Duration,
}

/// Enrichment operations over extracted document content
pub struct EnrichmentService {
    llm: Arc<LlmClient>,
}

impl EnrichmentService {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify a document's content into a category with tags.
    pub async fn classify<R>(
        &self,
        document: &Document,
        reader: R,
        cancel: &CancellationToken,
    ) -> ClassificationResult
    where
        R: AsyncRead + Unpin + Send,
    {
        let started = Instant::now();

        match self.try_classify(document, reader, cancel).await {
            Ok(mut result) => {
                result.processing_time = started.elapsed();
                result
            }
            Err(e) => {
                warn!(doc_id = %document.id, error = %e, "Classification degraded to error result");
                ClassificationResult {
                    primary_category: "Error".to_string(),
                    confidences: HashMap::new(),
                    tags: Vec::new(),
                    processing_time: started.elapsed(),
                    notes: e.to_string(),
                }
            }
        }
    }

    /// Summarize a document's content.
    pub async fn summarize<R>(
        &self,
        document: &Document,
        reader: R,
        cancel: &CancellationToken,
    ) -> SummaryResult
    where
        R: AsyncRead + Unpin + Send,
    {
        let started = Instant::now();

        match self.try_summarize(document, reader, cancel).await {
            Ok(mut result) => {
                result.processing_time = started.elapsed();
                result
            }
            Err(e) => {
                warn!(doc_id = %document.id, error = %e, "Summarization degraded to error result");
                SummaryResult {
                    summary: format!("Error: {}", e),
                    key_points: Vec::new(),
                    language: "en".to_string(),
                    processing_time: started.elapsed(),
                }
            }
        }
    }

    async fn try_classify<R>(
        &self,
        document: &Document,
        reader: R,
        cancel: &CancellationToken,
    ) -> ServiceResult<ClassificationResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let content = self.read_content(document, reader).await?;
        let prompt = classification_prompt(&document.title, &content.text);

        let response = self
            .llm
            .invoke(self.llm.default_model(), &prompt, cancel)
            .await?;

        let parsed = parsers::parse_classification(&response);
        let mut confidences = HashMap::new();
        if let Some(confidence) = parsed.confidence {
            confidences.insert(parsed.category.clone(), confidence);
        }

        debug!(
            doc_id = %document.id,
            category = %parsed.category,
            tags = parsed.tags.len(),
            "Document classified"
        );

        Ok(ClassificationResult {
            primary_category: parsed.category,
            confidences,
            tags: parsed.tags,
            processing_time: Duration::ZERO,
            notes: parsed.note.unwrap_or_default(),
        })
    }

    async fn try_summarize<R>(
        &self,
        document: &Document,
        reader: R,
        cancel: &CancellationToken,
    ) -> ServiceResult<SummaryResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let content = self.read_content(document, reader).await?;
        let prompt = summary_prompt(&document.title, &content.text);

        let response = self
            .llm
            .invoke(self.llm.default_model(), &prompt, cancel)
            .await?;

        let (summary, key_points) = parsers::parse_summary(&response);

        debug!(
            doc_id = %document.id,
            summary_len = summary.len(),
            key_points = key_points.len(),
            "Document summarized"
        );

        Ok(SummaryResult {
            summary,
            key_points,
            language: "en".to_string(),
            processing_time: Duration::ZERO,
        })
    }

    async fn read_content<R>(
        &self,
        document: &Document,
        mut reader: R,
    ) -> ServiceResult<extraction::ExtractedContent>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(ProcessingError::Io)?;

        let content = extraction::extract(&data, &document.file_name);
        debug!(
            doc_id = %document.id,
            content_type = content.content_type.as_str(),
            truncated = content.truncated,
            chars = content.text.len(),
            "Content extracted"
        );
        Ok(content)
    }
}

fn classification_prompt(title: &str, content: &str) -> String {
    format!(
        "Classify the document below into a single category.\n\
        Respond with a JSON object with fields \"category\" (string), \
        \"confidence\" (number between 0 and 1), and \"tags\" \
        (array of short lowercase strings).\n\n\
        Document name: {}\n\nContent:\n{}",
        title, content
    )
}

fn summary_prompt(title: &str, content: &str) -> String {
    format!(
        "Summarize the document below in one short paragraph. \
        Mention the most important facts first.\n\n\
        Document name: {}\n\nContent:\n{}",
        title, content
    )
}
