use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use crate::backend::DocxLoader;
use crate::docx_xml::OoxmlDocxLoader;
use crate::{
    ExtractError, ExtractionResult, Metadata, PARAGRAPH_SEPARATOR, ReadSeek, StrategyKind,
};

use super::ExtractionStrategy;

/// Inputs above this size get an advisory memory warning.
pub const LARGE_DOCX_WARN_BYTES: u64 = 50 * 1024 * 1024;

/// Word documents. DOCX has no page concept, so the result is a single page
/// holding every paragraph joined by newlines.
pub struct DocxStrategy {
    loader: Arc<dyn DocxLoader>,
}

impl DocxStrategy {
    pub fn new(loader: Arc<dyn DocxLoader>) -> Self {
        Self { loader }
    }
}

impl Default for DocxStrategy {
    fn default() -> Self {
        Self::new(Arc::new(OoxmlDocxLoader))
    }
}

impl ExtractionStrategy for DocxStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Docx
    }

    fn extract(
        &self,
        stream: &mut dyn ReadSeek,
        _language: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        tracing::info!("Starting DOCX extraction");

        let size = stream_len(stream).map_err(|e| ExtractError::extraction("DOCX", e))?;
        if size > LARGE_DOCX_WARN_BYTES {
            tracing::warn!(
                mb = size / (1024 * 1024),
                "Large DOCX file detected, the whole document is loaded into memory"
            );
        }

        let paragraphs = self.loader.paragraphs(stream).map_err(|e| {
            tracing::error!(error = %e, "DOCX extraction failed");
            ExtractError::extraction("DOCX", e)
        })?;

        let paragraph_count = paragraphs.len();
        let text = paragraphs.join(PARAGRAPH_SEPARATOR);

        tracing::info!(paragraphs = paragraph_count, "DOCX extraction complete");

        let mut metadata = Metadata::new();
        metadata.insert("method".into(), "docx".into());
        metadata.insert("page_count".into(), 1.into());
        metadata.insert("paragraph_count".into(), paragraph_count.into());
        Ok(ExtractionResult::from_pages(
            vec![text],
            PARAGRAPH_SEPARATOR,
            metadata,
        ))
    }
}

/// Total length of the stream, leaving it rewound.
fn stream_len(stream: &mut dyn ReadSeek) -> std::io::Result<u64> {
    let size = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(size)
}
