//! Document provider boundary.
//!
//! The ingestion stage resolves the submitted document reference through
//! this trait. Failure modes are the contract's closed set: NotFound,
//! Forbidden, Unreachable.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document not found")]
    NotFound,

    #[error("Access to document forbidden")]
    Forbidden,

    #[error("Document unreachable: {0}")]
    Unreachable(String),
}

/// Resolved document content.
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Given an opaque document reference, return its byte content.
pub trait DocumentProvider: Send + Sync {
    fn fetch(&self, reference: &str) -> Result<DocumentContent, DocumentError>;
}

/// Rewrite common scholarly landing-page URLs to their PDF form.
/// arXiv `/abs/<id>` becomes `arxiv.org/pdf/<id>.pdf`; anything already
/// ending in `.pdf` passes through unchanged.
pub fn normalize_pdf_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with(".pdf") {
        return trimmed.to_string();
    }
    if let Some(idx) = trimmed.find("arxiv.org/abs/") {
        let tail = &trimmed[idx + "arxiv.org/abs/".len()..];
        let tail = tail.trim_end_matches('/');
        if !tail.is_empty() {
            return format!("https://arxiv.org/pdf/{tail}.pdf");
        }
    }
    trimmed.to_string()
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

/// Fetches documents over HTTP(S) with a bounded timeout.
///
/// Non-HTTP schemes (e.g. `gs://`) are reported as Unreachable — cloud
/// storage resolution belongs to a dedicated provider implementation.
pub struct HttpDocumentProvider {
    client: reqwest::blocking::Client,
}

impl HttpDocumentProvider {
    pub fn new(timeout: Duration) -> Result<Self, DocumentError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocumentError::Unreachable(e.to_string()))?;
        Ok(Self { client })
    }
}

impl DocumentProvider for HttpDocumentProvider {
    fn fetch(&self, reference: &str) -> Result<DocumentContent, DocumentError> {
        let url = normalize_pdf_url(reference);
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DocumentError::Unreachable(format!(
                "unsupported document scheme: {url}"
            )));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DocumentError::Unreachable(e.to_string()))?;

        match response.status().as_u16() {
            404 | 410 => return Err(DocumentError::NotFound),
            401 | 403 => return Err(DocumentError::Forbidden),
            s if s >= 400 => {
                return Err(DocumentError::Unreachable(format!("HTTP status {s}")))
            }
            _ => {}
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response
            .bytes()
            .map_err(|e| DocumentError::Unreachable(e.to_string()))?
            .to_vec();

        Ok(DocumentContent {
            bytes,
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Static provider
// ---------------------------------------------------------------------------

/// In-memory provider for tests and demos: serves pre-registered
/// reference → bytes mappings, NotFound for everything else.
#[derive(Default)]
pub struct StaticDocumentProvider {
    docs: HashMap<String, Vec<u8>>,
}

impl StaticDocumentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, reference: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.docs.insert(reference.into(), bytes.into());
        self
    }
}

impl DocumentProvider for StaticDocumentProvider {
    fn fetch(&self, reference: &str) -> Result<DocumentContent, DocumentError> {
        self.docs
            .get(reference)
            .map(|bytes| DocumentContent {
                bytes: bytes.clone(),
                content_type: Some("text/plain".into()),
            })
            .ok_or(DocumentError::NotFound)
    }
}
