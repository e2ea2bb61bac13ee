//! Content extraction for uploaded documents.
//!
//! Converts raw document bytes plus the declared file name into bounded plain
//! text suitable for embedding in a model prompt. Extraction never fails:
//! unsupported formats and extraction errors both yield stub results.

use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::ProcessingError;

/// Cap on extracted text, to bound prompt size sent to the model endpoint.
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// Marker appended when extracted text is cut at the cap.
pub const TRUNCATION_MARKER: &str = "\n[content truncated]";

/// Maximum CSV data rows rendered into the extracted text.
const MAX_CSV_ROWS: usize = 100;

/// Tag describing how content was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    Text,
    Csv,
    Unsupported,
    Error,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Text => "text",
            ContentType::Csv => "csv",
            ContentType::Unsupported => "unsupported",
            ContentType::Error => "error",
        }
    }
}

/// Bounded plain-text rendition of a document.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub content_type: ContentType,
    pub truncated: bool,
}

/// Extract bounded plain text from raw document bytes.
///
/// Dispatches on the declared file extension. Errors are folded into an
/// `Error`-tagged stub rather than propagated.
pub fn extract(data: &[u8], file_name: &str) -> ExtractedContent {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    debug!(file = %file_name, format = %extension, bytes = data.len(), "Extracting content");

    let result = match extension.as_str() {
        "pdf" => extract_pdf(data).map(|text| (text, ContentType::Pdf)),
        "txt" | "text" | "log" | "md" | "markdown" => {
            Ok((extract_text(data), ContentType::Text))
        }
        "csv" => Ok((extract_csv(data), ContentType::Csv)),
        _ => Ok((
            format!("Unsupported file type: {}", extension),
            ContentType::Unsupported,
        )),
    };

    match result {
        Ok((text, content_type)) => {
            let (text, truncated) = truncate_content(text);
            ExtractedContent {
                text,
                content_type,
                truncated,
            }
        }
        Err(e) => {
            warn!(file = %file_name, error = %e, "Content extraction failed");
            ExtractedContent {
                text: e.to_string(),
                content_type: ContentType::Error,
                truncated: false,
            }
        }
    }
}

/// Cut text at the cap, appending the truncation marker.
fn truncate_content(text: String) -> (String, bool) {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return (text, false);
    }

    let mut cut: String = text.chars().take(MAX_CONTENT_CHARS).collect();
    cut.push_str(TRUNCATION_MARKER);
    (cut, true)
}

/// Create a new Pdfium instance (dynamically linked).
/// Searches the current directory, then vendor/pdfium/lib/, then the system
/// library paths.
fn create_pdfium() -> Result<Pdfium, ProcessingError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| {
            ProcessingError::Io(std::io::Error::other(format!(
                "Failed to load PDFium library: {:?}",
                e
            )))
        })?;

    Ok(Pdfium::new(bindings))
}

/// Extract per-page text from a PDF, joining pages with `--- Page N ---`
/// separators. Accumulation stops once past the content cap.
fn extract_pdf(data: &[u8]) -> Result<String, ProcessingError> {
    let pdfium = create_pdfium()?;

    let document = pdfium.load_pdf_from_byte_slice(data, None).map_err(|e| {
        ProcessingError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to load PDF: {:?}", e),
        ))
    })?;

    let mut out = String::new();
    let mut char_count = 0usize;

    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = page_index + 1;

        let text = page.text().map_err(|e| {
            ProcessingError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to extract text from page {}: {:?}", page_num, e),
            ))
        })?;

        let page_text = text.all();
        let page_text = page_text.trim();
        if page_text.is_empty() {
            continue;
        }

        let section = format!("--- Page {} ---\n{}\n", page_num, page_text);
        char_count += section.chars().count();
        out.push_str(&section);

        if char_count > MAX_CONTENT_CHARS {
            debug!(page = page_num, "Content cap reached, stopping PDF extraction");
            break;
        }
    }

    Ok(out)
}

/// Full decoded text for plain-text style formats.
fn extract_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Render CSV content as a column list plus up to [`MAX_CSV_ROWS`]
/// pipe-delimited rows and a trailing processed-row count. Malformed rows are
/// tolerated rather than aborting extraction.
fn extract_csv(data: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(data);
    let mut lines = decoded.lines().filter(|l| !l.trim().is_empty());

    let mut out = String::new();

    if let Some(header) = lines.next() {
        let columns = split_csv_record(header);
        out.push_str("Columns: ");
        out.push_str(&columns.join(", "));
        out.push('\n');
    }

    let mut rows = 0usize;
    for line in lines.take(MAX_CSV_ROWS) {
        let fields = split_csv_record(line);
        out.push_str(&fields.join(" | "));
        out.push('\n');
        rows += 1;
    }

    out.push_str(&format!("({} rows)", rows));
    out
}

/// Split one CSV record into fields, tolerating malformed input.
///
/// Quote-aware: quoted fields may contain commas and doubled-quote escapes.
/// An unterminated quote consumes the rest of the line instead of failing.
fn split_csv_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current).trim().to_string());
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_read_in_full() {
        let content = extract(b"line one\nline two\n", "notes.txt");
        assert_eq!(content.content_type, ContentType::Text);
        assert!(!content.truncated);
        assert!(content.text.contains("line two"));
    }

    #[test]
    fn markdown_and_log_extensions_are_text() {
        assert_eq!(
            extract(b"# Title", "readme.md").content_type,
            ContentType::Text
        );
        assert_eq!(
            extract(b"boot ok", "system.log").content_type,
            ContentType::Text
        );
    }

    #[test]
    fn unknown_extension_yields_unsupported_stub() {
        let content = extract(b"\x00\x01", "archive.zip");
        assert_eq!(content.content_type, ContentType::Unsupported);
        assert!(content.text.contains("zip"));
        assert!(!content.truncated);
    }

    #[test]
    fn content_is_capped_with_marker() {
        let big = "a".repeat(MAX_CONTENT_CHARS + 500);
        let content = extract(big.as_bytes(), "big.txt");
        assert!(content.truncated);
        assert_eq!(
            content.text.chars().count(),
            MAX_CONTENT_CHARS + TRUNCATION_MARKER.chars().count()
        );
        assert!(content.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn content_at_cap_is_not_truncated() {
        let exact = "a".repeat(MAX_CONTENT_CHARS);
        let content = extract(exact.as_bytes(), "exact.txt");
        assert!(!content.truncated);
        assert_eq!(content.text.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn csv_renders_columns_rows_and_count() {
        let csv = "name,amount,date\nalice,30,2024-01-01\nbob,45,2024-01-02\n";
        let content = extract(csv.as_bytes(), "ledger.csv");
        assert_eq!(content.content_type, ContentType::Csv);
        assert!(content.text.starts_with("Columns: name, amount, date\n"));
        assert!(content.text.contains("alice | 30 | 2024-01-01"));
        assert!(content.text.ends_with("(2 rows)"));
    }

    #[test]
    fn csv_reads_at_most_one_hundred_rows() {
        let mut csv = String::from("id,value\n");
        for i in 0..250 {
            csv.push_str(&format!("{},{}\n", i, i * 2));
        }
        let content = extract(csv.as_bytes(), "big.csv");
        assert!(content.text.ends_with("(100 rows)"));
        assert!(!content.text.contains("101 | 202"));
    }

    #[test]
    fn malformed_csv_rows_are_tolerated() {
        let csv = "a,b\n\"unterminated,2\nok,3\n";
        let content = extract(csv.as_bytes(), "odd.csv");
        assert_eq!(content.content_type, ContentType::Csv);
        assert!(content.text.ends_with("(2 rows)"));
    }

    #[test]
    fn quoted_csv_fields_keep_commas() {
        let fields = split_csv_record(r#"alice,"one, two",3"#);
        assert_eq!(fields, vec!["alice", "one, two", "3"]);
    }

    #[test]
    fn doubled_quotes_unescape() {
        let fields = split_csv_record(r#""say ""hi""",x"#);
        assert_eq!(fields, vec![r#"say "hi""#, "x"]);
    }
}
