//! Blob storage for raw document content.
//!
//! Every reader gets its own independently opened file handle, so concurrent
//! consumers never share a stream position.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tracing::debug;

use crate::error::{ProcessingError, ServiceResult};

/// File-backed blob store rooted at the configured data directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { root: data_dir }
    }

    /// Write uploaded content under `documents/`, returning the stored
    /// relative path.
    pub async fn save(&self, document_id: &str, file_name: &str, content: &[u8]) -> ServiceResult<String> {
        let docs_dir = self.root.join("documents");
        tokio::fs::create_dir_all(&docs_dir)
            .await
            .map_err(ProcessingError::Io)?;

        let relative = format!("documents/{}_{}", document_id, sanitize_file_name(file_name));
        tokio::fs::write(self.root.join(&relative), content)
            .await
            .map_err(ProcessingError::Io)?;

        debug!(path = %relative, bytes = content.len(), "Stored document content");
        Ok(relative)
    }

    /// Open a fresh read handle to stored content.
    pub async fn open(&self, path: &str) -> ServiceResult<File> {
        let file = File::open(self.resolve(path))
            .await
            .map_err(ProcessingError::Io)?;
        Ok(file)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Sanitize a declared file name for use on disk
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
