use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::backend::{OcrEngine, PageRasterizer};
use crate::{
    BackendError, ExtractError, ExtractionResult, Metadata, PAGE_SEPARATOR, ReadSeek,
    StrategyKind,
};

use super::ExtractionStrategy;

/// Pages rasterized per batch. Peak memory is bounded by one batch of images.
pub const BATCH_SIZE: usize = 5;

/// OCR for scanned PDFs and raster images.
///
/// The input is spooled to a temp file (the rasterizer needs random file
/// access) that is removed when the call returns, on success or failure.
/// Content decides the path, not the extension: a file the rasterizer can
/// count pages in is OCR'd as a PDF, anything else is loaded as one image.
pub struct OcrStrategy {
    rasterizer: Arc<dyn PageRasterizer>,
    engine: Arc<dyn OcrEngine>,
    batch_size: usize,
}

impl OcrStrategy {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            rasterizer,
            engine,
            batch_size: BATCH_SIZE,
        }
    }

    /// Override the number of pages rasterized per batch (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Size of the per-batch worker pool: never more workers than pages in a
    /// batch, never more than the hardware offers.
    pub fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        self.batch_size.min(cores)
    }

    fn ocr_pdf(
        &self,
        path: &Path,
        page_count: usize,
        language: &str,
    ) -> Result<Vec<String>, BackendError> {
        let dpi = self.rasterizer.render_dpi();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count())
            .thread_name(|i| format!("doctext-ocr-{i}"))
            .build()
            .map_err(|e| BackendError::Ocr(format!("failed to start OCR workers: {e}")))?;

        let mut pages = Vec::with_capacity(page_count);

        for first in (1..=page_count).step_by(self.batch_size) {
            let last = (first + self.batch_size - 1).min(page_count);
            tracing::info!(first, last, "Processing OCR batch");

            let images = self.rasterizer.render_pages(path, first, last)?;
            let expected = last - first + 1;
            if images.len() != expected {
                return Err(BackendError::Render(format!(
                    "rasterizer returned {} images for pages {first}-{last}",
                    images.len()
                )));
            }

            // Each image is owned by its task and dropped as soon as its OCR
            // call returns, whether or not recognition succeeded. The indexed
            // collect keeps page order regardless of completion order.
            let texts = pool.install(|| {
                images
                    .into_par_iter()
                    .map(|image| match dpi {
                        Some(dpi) => self.engine.recognize_rendered(&image, language, dpi),
                        None => self.engine.recognize(&image, language),
                    })
                    .collect::<Result<Vec<String>, BackendError>>()
            })?;

            pages.extend(texts);
        }

        Ok(pages)
    }

    fn ocr_image(&self, path: &Path, language: &str) -> Result<Vec<String>, BackendError> {
        let image = self.rasterizer.load_image(path)?;
        let text = self.engine.recognize(&image, language)?;
        Ok(vec![text])
    }

    fn extract_pages(
        &self,
        stream: &mut dyn ReadSeek,
        language: &str,
    ) -> Result<Vec<String>, BackendError> {
        let spooled = spool_to_temp(stream)?;
        let path = spooled.path();
        tracing::debug!(path = %path.display(), "Processing via temp file");

        // A page count of zero is no better than a failed read: there is
        // nothing to render, and an empty result must not pass as success.
        let counted = self.rasterizer.page_count(path).and_then(|count| match count {
            0 => Err(BackendError::Open("PDF has no pages".into())),
            count => Ok(count),
        });

        match counted {
            Ok(page_count) => self.ocr_pdf(path, page_count, language),
            Err(pdf_err) => {
                tracing::info!(
                    error = %pdf_err,
                    "PDF processing failed, attempting fallback to image loader"
                );
                self.ocr_image(path, language)
            }
        }
        // `spooled` is dropped here, deleting the temp file.
    }
}

impl ExtractionStrategy for OcrStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ocr
    }

    fn extract(
        &self,
        stream: &mut dyn ReadSeek,
        language: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        tracing::info!(language, "Starting OCR extraction");

        let pages = self.extract_pages(stream, language).map_err(|e| {
            tracing::error!(error = %e, "OCR extraction failed");
            ExtractError::Ocr(e.to_string())
        })?;

        tracing::info!(pages = pages.len(), "OCR extraction complete");

        let mut metadata = Metadata::new();
        metadata.insert("method".into(), "ocr".into());
        metadata.insert("language".into(), language.into());
        metadata.insert("page_count".into(), pages.len().into());
        Ok(ExtractionResult::from_pages(pages, PAGE_SEPARATOR, metadata))
    }
}

/// Copy the whole stream into a fresh temp file.
fn spool_to_temp(stream: &mut dyn ReadSeek) -> Result<NamedTempFile, BackendError> {
    stream.seek(SeekFrom::Start(0))?;
    let mut spooled = tempfile::Builder::new()
        .prefix("doctext-ocr-")
        .suffix(".pdf")
        .tempfile()?;
    std::io::copy(stream, &mut spooled)?;
    spooled.flush()?;
    Ok(spooled)
}
