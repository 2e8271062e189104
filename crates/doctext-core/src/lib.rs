use std::fmt;
use std::io::{Read, Seek};
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod backend;
pub mod config_file;
pub mod docx_xml;
pub mod orchestrator;
pub mod registry;
pub mod strategy;

// Re-export for convenience
pub use backend::{DocxLoader, OcrEngine, PageRasterizer, PdfTextBackend, PdfTextDocument};
/// Image type in the rasterizer and OCR engine signatures.
pub use image::DynamicImage;
pub use config_file::ExtractionConfig;
pub use docx_xml::OoxmlDocxLoader;
pub use orchestrator::{DEFAULT_FALLBACK_MIN_CHARS, ExtractOptions, Extractor, Input};
pub use registry::Registry;
pub use strategy::{
    DocxStrategy, ExtractionStrategy, NativePdfStrategy, OcrStrategy, RawTextStrategy,
};

/// Separator between page texts for PDF and OCR results.
pub const PAGE_SEPARATOR: &str = "\n\n";
/// Separator between paragraphs for DOCX results.
pub const PARAGRAPH_SEPARATOR: &str = "\n";
/// OCR language used when the caller does not pick one.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// A seekable byte source. Every strategy reads its input through this.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// String-keyed metadata attached to an [`ExtractionResult`].
pub type Metadata = Map<String, Value>;

/// The text extracted from one document.
///
/// `full_text` is always `pages` joined by the separator of the strategy that
/// produced it, and `pages` is never empty. The value is immutable: metadata
/// enrichment goes through [`ExtractionResult::with_metadata`], which consumes
/// the result and hands back a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    full_text: String,
    pages: Vec<String>,
    metadata: Metadata,
}

impl ExtractionResult {
    /// Build a result from ordered page texts.
    ///
    /// An empty page list is replaced by a single empty page.
    pub fn from_pages(pages: Vec<String>, separator: &str, metadata: Metadata) -> Self {
        let pages = if pages.is_empty() {
            vec![String::new()]
        } else {
            pages
        };
        let full_text = pages.join(separator);
        Self {
            full_text,
            pages,
            metadata,
        }
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The `method` metadata entry (`native_pdf`, `ocr`, `raw_text`, `docx`).
    pub fn method(&self) -> Option<&str> {
        self.metadata.get("method").and_then(Value::as_str)
    }

    /// The declared `page_count`, or the number of pages when undeclared.
    pub fn page_count(&self) -> usize {
        self.metadata
            .get("page_count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.pages.len())
    }

    /// Return a copy of this result with one more metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Identifies one of the four extraction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PdfNative,
    Ocr,
    RawText,
    Docx,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::PdfNative,
        StrategyKind::Ocr,
        StrategyKind::RawText,
        StrategyKind::Docx,
    ];

    /// Stable identifier used by [`Registry::get`].
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::PdfNative => "pdf_native",
            StrategyKind::Ocr => "ocr",
            StrategyKind::RawText => "raw_text",
            StrategyKind::Docx => "docx",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ExtractError::UnsupportedKind(s.to_string()))
    }
}

/// How the orchestrator decides whether to use OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OcrMode {
    /// Select by extension, and retry scanned-looking PDFs with OCR.
    #[default]
    Auto,
    /// Always OCR, whatever the extension.
    Force,
    /// Select by extension and never retry with OCR.
    Skip,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OcrMode::Auto => "auto",
            OcrMode::Force => "force",
            OcrMode::Skip => "skip",
        }
    }
}

impl fmt::Display for OcrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(OcrMode::Auto),
            "force" => Ok(OcrMode::Force),
            "skip" => Ok(OcrMode::Skip),
            other => Err(ExtractError::UnsupportedInput(format!(
                "unknown OCR mode: {other}"
            ))),
        }
    }
}

/// Errors raised by strategies, the registry, and the orchestrator.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to extract text from {source_kind}: {message}")]
    Extraction {
        source_kind: &'static str,
        message: String,
    },
    #[error("OCR process failed: {0}")]
    Ocr(String),
    #[error("unknown extraction method: {0}")]
    UnsupportedKind(String),
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn extraction(source_kind: &'static str, cause: impl fmt::Display) -> Self {
        ExtractError::Extraction {
            source_kind,
            message: cause.to_string(),
        }
    }
}

/// Errors reported by the native collaborators (PDF engine, rasterizer, OCR
/// engine, DOCX loader).
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    Open(String),
    #[error("failed to extract text: {0}")]
    Extraction(String),
    #[error("failed to render page: {0}")]
    Render(String),
    #[error("OCR engine failure: {0}")]
    Ocr(String),
    #[error("backend not available: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
