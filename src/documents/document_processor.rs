//! Document Preprocessor
//!
//! Turns an uploaded file into the plain-text payload of a job.
//!
//! - `application/pdf` (or a `.pdf` filename): text is extracted page by page
//!   with `lopdf` and the pages are joined with [`PAGE_SEPARATOR`]
//! - `text/*` (or a `.txt`/`.md` filename): bytes decoded as UTF-8, invalid
//!   sequences replaced
//!
//! Anything else is rejected with [`AppError::Preprocessing`].

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::types::{AppError, AppResult};

pub const PAGE_SEPARATOR: &str = "\n";

/// An uploaded document as received from the client
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl DocumentUpload {
    pub fn new(filename: Option<String>, content_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename,
            content_type,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

#[async_trait]
pub trait DocumentPreprocessor: Send + Sync {
    async fn extract_text(&self, upload: &DocumentUpload) -> AppResult<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentProcessor;

impl DocumentProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Declared content type wins; the filename extension is the fallback for
    /// clients that send `application/octet-stream`.
    pub fn detect_kind(upload: &DocumentUpload) -> Option<DocumentKind> {
        let declared = upload
            .content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok());

        if let Some(mime) = &declared {
            if mime.type_() == mime::APPLICATION && mime.subtype() == mime::PDF {
                return Some(DocumentKind::Pdf);
            }
            if mime.type_() == mime::TEXT {
                return Some(DocumentKind::PlainText);
            }
        }

        let extension = upload
            .filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Some(DocumentKind::Pdf),
            Some("txt") | Some("md") | Some("text") => Some(DocumentKind::PlainText),
            _ => None,
        }
    }

    pub fn extract_pdf_text(data: &[u8]) -> AppResult<String> {
        let document = lopdf::Document::load_mem(data)
            .map_err(|e| AppError::Preprocessing(format!("failed to parse PDF: {}", e)))?;

        let pages = document.get_pages();
        let mut page_texts = Vec::with_capacity(pages.len());
        for page_number in pages.keys() {
            let text = document.extract_text(&[*page_number]).map_err(|e| {
                AppError::Preprocessing(format!(
                    "failed to extract text from page {}: {}",
                    page_number, e
                ))
            })?;
            page_texts.push(text);
        }

        debug!(pages = page_texts.len(), "Extracted PDF text");
        Ok(page_texts.join(PAGE_SEPARATOR))
    }
}

#[async_trait]
impl DocumentPreprocessor for DocumentProcessor {
    async fn extract_text(&self, upload: &DocumentUpload) -> AppResult<String> {
        let kind = Self::detect_kind(upload).ok_or_else(|| {
            AppError::Preprocessing(format!(
                "unsupported document type (content type: {}, filename: {})",
                upload.content_type.as_deref().unwrap_or("none"),
                upload.filename.as_deref().unwrap_or("none"),
            ))
        })?;

        info!(
            kind = ?kind,
            bytes = upload.data.len(),
            filename = upload.filename.as_deref().unwrap_or(""),
            "Preprocessing document"
        );

        match kind {
            DocumentKind::PlainText => Ok(String::from_utf8_lossy(&upload.data).into_owned()),
            DocumentKind::Pdf => {
                // PDF parsing is CPU-bound; keep it off the request executor
                let data = upload.data.clone();
                tokio::task::spawn_blocking(move || Self::extract_pdf_text(&data))
                    .await
                    .map_err(|e| AppError::Internal(format!("PDF extraction task failed: {}", e)))?
            }
        }
    }
}
