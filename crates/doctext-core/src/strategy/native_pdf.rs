use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::backend::PdfTextBackend;
use crate::{
    ExtractError, ExtractionResult, Metadata, PAGE_SEPARATOR, ReadSeek, StrategyKind,
};

use super::ExtractionStrategy;

/// Text from the PDF content stream, page by page.
///
/// Only one page's layout state is alive at a time; the backend drops it
/// before the next page is loaded. Any page failure aborts the document.
pub struct NativePdfStrategy {
    backend: Arc<dyn PdfTextBackend>,
}

impl NativePdfStrategy {
    pub fn new(backend: Arc<dyn PdfTextBackend>) -> Self {
        Self { backend }
    }

    fn extract_pages(&self, stream: &mut dyn ReadSeek) -> Result<Vec<String>, ExtractError> {
        stream.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;

        let document = self
            .backend
            .open(bytes)
            .map_err(|e| ExtractError::extraction("PDF", e))?;
        let page_count = document
            .page_count()
            .map_err(|e| ExtractError::extraction("PDF", e))?;

        let mut pages = Vec::with_capacity(page_count);
        for index in 0..page_count {
            let text = document
                .page_text(index)
                .map_err(|e| ExtractError::extraction("PDF", format!("page {}: {e}", index + 1)))?;
            pages.push(text);
        }
        Ok(pages)
    }
}

impl ExtractionStrategy for NativePdfStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PdfNative
    }

    fn extract(
        &self,
        stream: &mut dyn ReadSeek,
        _language: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        tracing::info!("Starting native PDF extraction");

        let pages = self.extract_pages(stream).inspect_err(|e| {
            tracing::error!(error = %e, "Native PDF extraction failed");
        })?;

        tracing::info!(pages = pages.len(), "Native PDF extraction complete");

        let mut metadata = Metadata::new();
        metadata.insert("method".into(), "native_pdf".into());
        metadata.insert("page_count".into(), pages.len().into());
        Ok(ExtractionResult::from_pages(pages, PAGE_SEPARATOR, metadata))
    }
}
