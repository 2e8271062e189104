//! Narrow interfaces to the native libraries the strategies delegate to.
//!
//! The strategies own the decision logic (batching, fallback, decoding
//! policy); the libraries behind these traits own the format parsing. Each
//! trait is object safe so tests can swap in hand-written fakes.

use std::path::Path;

use image::DynamicImage;

use crate::{BackendError, ReadSeek};

/// Layout-aware PDF text extraction.
pub trait PdfTextBackend: Send + Sync {
    /// Parse a PDF held in memory.
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn PdfTextDocument>, BackendError>;
}

/// An opened PDF, read one page at a time.
pub trait PdfTextDocument {
    fn page_count(&self) -> Result<usize, BackendError>;

    /// Text of the page at `index` (0-based). Any page-scoped state is
    /// released before this returns.
    fn page_text(&self, index: usize) -> Result<String, BackendError>;
}

/// Turns PDF pages (or image files) into raster images for OCR.
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the PDF at `path`. Fails when the file is not a PDF.
    fn page_count(&self, path: &Path) -> Result<usize, BackendError>;

    /// Render pages `first..=last` (1-based) to images, in page order.
    fn render_pages(
        &self,
        path: &Path,
        first: usize,
        last: usize,
    ) -> Result<Vec<DynamicImage>, BackendError>;

    /// Resolution `render_pages` renders at, if known.
    fn render_dpi(&self) -> Option<u32> {
        None
    }

    /// Open `path` as a single raster image, sniffing the format from content.
    fn load_image(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| BackendError::Open(e.to_string()))
    }
}

/// Optical character recognition over a single image.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, BackendError>;

    /// Recognize a page the rasterizer rendered at `dpi`. Engines that take a
    /// resolution hint override this; supplied images go through
    /// [`recognize`](Self::recognize) with no hint.
    fn recognize_rendered(
        &self,
        image: &DynamicImage,
        language: &str,
        dpi: u32,
    ) -> Result<String, BackendError> {
        let _ = dpi;
        self.recognize(image, language)
    }
}

/// Loads the paragraph list of a DOCX document.
pub trait DocxLoader: Send + Sync {
    /// Paragraph texts in document order, empty paragraphs included.
    fn paragraphs(&self, stream: &mut dyn ReadSeek) -> Result<Vec<String>, BackendError>;
}
