use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;

use doctext_core::{
    DocxStrategy, Extractor, NativePdfStrategy, OcrEngine, OcrStrategy, PageRasterizer,
    PdfTextBackend, RawTextStrategy,
};

// Re-export domain types for convenience
pub use doctext_core::{
    ExtractError, ExtractOptions, ExtractionConfig, ExtractionResult, Input, OcrMode, Registry,
    StrategyKind,
};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("extraction registry already initialized")]
    AlreadyInitialized,
}

/// The process-wide registry plus the extractor tunables resolved with it.
struct Pipeline {
    registry: Registry,
    fallback_min_chars: usize,
}

static PIPELINE: OnceCell<Pipeline> = OnceCell::new();

/// Build a registry wired to the native backends compiled into this crate.
///
/// Without the `pdf` feature, PDF text and page rasterization fail with
/// [`doctext_core::BackendError::Unavailable`]; images can still be OCR'd.
/// Without the `ocr` feature, every OCR call fails the same way.
pub fn build_registry(config: &ExtractionConfig) -> Registry {
    let (pdf_text, rasterizer) = pdf_backends(config);
    let ocr = OcrStrategy::new(rasterizer, ocr_engine(config)).with_batch_size(config.batch_size);

    Registry::new(
        Arc::new(NativePdfStrategy::new(pdf_text)),
        Arc::new(ocr),
        Arc::new(RawTextStrategy::new()),
        Arc::new(DocxStrategy::default()),
    )
}

/// Install the process-wide registry. Call once at startup, before the first
/// [`extract`]; later calls fail with [`IngestError::AlreadyInitialized`].
pub fn init_registry(config: &ExtractionConfig) -> Result<(), IngestError> {
    PIPELINE
        .set(Pipeline {
            registry: build_registry(config),
            fallback_min_chars: config.fallback_min_chars,
        })
        .map_err(|_| IngestError::AlreadyInitialized)?;
    tracing::debug!(?config, "Extraction registry initialized");
    Ok(())
}

fn pipeline() -> &'static Pipeline {
    PIPELINE.get_or_init(|| {
        let config = ExtractionConfig::default();
        Pipeline {
            registry: build_registry(&config),
            fallback_min_chars: config.fallback_min_chars,
        }
    })
}

/// The process-wide registry, built from defaults if [`init_registry`] was
/// never called.
pub fn registry() -> &'static Registry {
    &pipeline().registry
}

/// Extract text from `input` using the process-wide registry.
pub fn extract(
    input: Input<'_>,
    options: &ExtractOptions,
) -> Result<ExtractionResult, ExtractError> {
    let pipeline = pipeline();
    Extractor::new(&pipeline.registry)
        .with_fallback_min_chars(pipeline.fallback_min_chars)
        .extract(input, options)
}

#[cfg(feature = "pdf")]
fn pdf_backends(config: &ExtractionConfig) -> (Arc<dyn PdfTextBackend>, Arc<dyn PageRasterizer>) {
    let backend = Arc::new(
        doctext_mupdf::MupdfBackend::new()
            .with_dpi(config.raster_dpi)
            .with_render_threads(config.render_threads),
    );
    let text: Arc<dyn PdfTextBackend> = backend.clone();
    (text, backend)
}

#[cfg(not(feature = "pdf"))]
fn pdf_backends(_config: &ExtractionConfig) -> (Arc<dyn PdfTextBackend>, Arc<dyn PageRasterizer>) {
    let backend = Arc::new(no_support::NoPdfSupport);
    let text: Arc<dyn PdfTextBackend> = backend.clone();
    (text, backend)
}

#[cfg(feature = "ocr")]
fn ocr_engine(config: &ExtractionConfig) -> Arc<dyn OcrEngine> {
    let mut engine = doctext_tesseract::TesseractEngine::new();
    if let Some(dir) = &config.tessdata_dir {
        engine = engine.with_tessdata_dir(dir);
    }
    Arc::new(engine)
}

#[cfg(not(feature = "ocr"))]
fn ocr_engine(_config: &ExtractionConfig) -> Arc<dyn OcrEngine> {
    Arc::new(no_support::NoOcrSupport)
}

#[cfg(any(not(feature = "pdf"), not(feature = "ocr")))]
mod no_support {
    #[cfg(not(feature = "pdf"))]
    use std::path::Path;

    use doctext_core::BackendError;

    #[cfg(not(feature = "pdf"))]
    pub struct NoPdfSupport;

    #[cfg(not(feature = "pdf"))]
    const NO_PDF: &str = "PDF support not compiled in (enable the `pdf` feature of doctext-ingest)";

    #[cfg(not(feature = "pdf"))]
    impl doctext_core::PdfTextBackend for NoPdfSupport {
        fn open(
            &self,
            _bytes: Vec<u8>,
        ) -> Result<Box<dyn doctext_core::PdfTextDocument>, BackendError> {
            Err(BackendError::Unavailable(NO_PDF.into()))
        }
    }

    #[cfg(not(feature = "pdf"))]
    impl doctext_core::PageRasterizer for NoPdfSupport {
        fn page_count(&self, _path: &Path) -> Result<usize, BackendError> {
            Err(BackendError::Unavailable(NO_PDF.into()))
        }

        fn render_pages(
            &self,
            _path: &Path,
            _first: usize,
            _last: usize,
        ) -> Result<Vec<doctext_core::DynamicImage>, BackendError> {
            Err(BackendError::Unavailable(NO_PDF.into()))
        }
    }

    #[cfg(not(feature = "ocr"))]
    pub struct NoOcrSupport;

    #[cfg(not(feature = "ocr"))]
    impl doctext_core::OcrEngine for NoOcrSupport {
        fn recognize(
            &self,
            _image: &doctext_core::DynamicImage,
            _language: &str,
        ) -> Result<String, BackendError> {
            Err(BackendError::Unavailable(
                "OCR support not compiled in (enable the `ocr` feature of doctext-ingest)".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_all_four_strategies() {
        let registry = build_registry(&ExtractionConfig::default());
        for kind in StrategyKind::ALL {
            assert_eq!(registry.strategy(kind).kind(), kind);
        }
    }

    #[test]
    fn built_registry_extracts_plain_text() {
        let registry = build_registry(&ExtractionConfig::default());
        let result = Extractor::new(&registry)
            .extract(
                Input::bytes(b"plain notes".as_slice()),
                &ExtractOptions::default().with_filename("notes.txt"),
            )
            .unwrap();
        assert_eq!(result.full_text(), "plain notes");
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn pdf_without_feature_is_extraction_error() {
        let registry = build_registry(&ExtractionConfig::default());
        let err = Extractor::new(&registry)
            .extract(
                Input::bytes(b"%PDF-1.7".as_slice()),
                &ExtractOptions::default()
                    .with_filename("a.pdf")
                    .with_ocr_mode(OcrMode::Skip),
            )
            .unwrap_err();
        assert!(err.to_string().contains("PDF support not compiled in"));
    }
}
