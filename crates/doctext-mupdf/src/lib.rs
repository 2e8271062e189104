use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use mupdf::{Colorspace, Document, Matrix, TextPageFlags};
use rayon::prelude::*;

use doctext_core::{BackendError, PageRasterizer, PdfTextBackend, PdfTextDocument};

const PDF_MAGIC: &str = "application/pdf";

/// MuPDF-based implementation of [`PdfTextBackend`] and [`PageRasterizer`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that non-PDF code paths do not transitively
/// depend on it.
pub struct MupdfBackend {
    /// Rasterization resolution for OCR.
    dpi: u32,
    /// Upper bound on concurrent render workers for one page range.
    render_threads: usize,
}

impl Default for MupdfBackend {
    fn default() -> Self {
        Self {
            dpi: 200,
            render_threads: 2,
        }
    }
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rasterization resolution. Zero keeps the current value.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        if dpi > 0 {
            self.dpi = dpi;
        }
        self
    }

    /// Set the number of render workers (minimum 1).
    pub fn with_render_threads(mut self, threads: usize) -> Self {
        self.render_threads = threads.max(1);
        self
    }

    fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }

    /// Render 1-based pages `first..=last` from a document opened here.
    fn render_range(
        &self,
        path: &Path,
        first: usize,
        last: usize,
    ) -> Result<Vec<DynamicImage>, BackendError> {
        let document = open_pdf_file(path)?;
        let matrix = Matrix::new_scale(self.scale(), self.scale());
        let colorspace = Colorspace::device_rgb();

        (first..=last)
            .map(|page_no| {
                let page = document
                    .load_page((page_no - 1) as i32)
                    .map_err(|e| BackendError::Render(format!("page {page_no}: {e}")))?;
                let pixmap = page
                    .to_pixmap(&matrix, &colorspace, false, false)
                    .map_err(|e| BackendError::Render(format!("page {page_no}: {e}")))?;
                pixmap_to_image(
                    pixmap.width() as u32,
                    pixmap.height() as u32,
                    pixmap.stride() as usize,
                    pixmap.n() as usize,
                    pixmap.samples(),
                )
                .ok_or_else(|| BackendError::Render(format!("page {page_no}: bad pixmap layout")))
            })
            .collect()
    }
}

/// Open a file strictly as PDF, whatever its name or content sniffing says.
fn open_pdf_file(path: &Path) -> Result<Document, BackendError> {
    let bytes = std::fs::read(path)?;
    Document::from_bytes(&bytes, PDF_MAGIC).map_err(|e| BackendError::Open(e.to_string()))
}

impl PdfTextBackend for MupdfBackend {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn PdfTextDocument>, BackendError> {
        let document =
            Document::from_bytes(&bytes, PDF_MAGIC).map_err(|e| BackendError::Open(e.to_string()))?;
        Ok(Box::new(MupdfDocument { document }))
    }
}

struct MupdfDocument {
    document: Document,
}

impl PdfTextDocument for MupdfDocument {
    fn page_count(&self) -> Result<usize, BackendError> {
        let count = self
            .document
            .page_count()
            .map_err(|e| BackendError::Extraction(e.to_string()))?;
        Ok(count.max(0) as usize)
    }

    fn page_text(&self, index: usize) -> Result<String, BackendError> {
        let page = self
            .document
            .load_page(index as i32)
            .map_err(|e| BackendError::Extraction(e.to_string()))?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::Extraction(e.to_string()))?;

        // Block/line iteration keeps reading order per layout block
        let mut page_text = String::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                let line_text: String = line
                    .chars()
                    .map(|c| c.char().unwrap_or('\u{FFFD}'))
                    .collect();
                page_text.push_str(&line_text);
                page_text.push('\n');
            }
        }
        Ok(page_text)
    }
}

impl PageRasterizer for MupdfBackend {
    fn page_count(&self, path: &Path) -> Result<usize, BackendError> {
        let count = open_pdf_file(path)?
            .page_count()
            .map_err(|e| BackendError::Open(e.to_string()))?;
        if count <= 0 {
            return Err(BackendError::Open("PDF has no pages".into()));
        }
        Ok(count as usize)
    }

    fn render_pages(
        &self,
        path: &Path,
        first: usize,
        last: usize,
    ) -> Result<Vec<DynamicImage>, BackendError> {
        if first == 0 || last < first {
            return Err(BackendError::Render(format!("invalid page range {first}-{last}")));
        }
        let ranges = split_range(first, last, self.render_threads);
        tracing::debug!(first, last, workers = ranges.len(), dpi = self.dpi, "Rendering pages");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ranges.len())
            .thread_name(|i| format!("doctext-render-{i}"))
            .build()
            .map_err(|e| BackendError::Render(format!("failed to start render workers: {e}")))?;

        // MuPDF documents are not shareable across threads, so each worker
        // opens its own handle.
        let rendered = pool.install(|| {
            ranges
                .into_par_iter()
                .map(|(start, end)| self.render_range(path, start, end))
                .collect::<Result<Vec<_>, BackendError>>()
        })?;

        Ok(rendered.into_iter().flatten().collect())
    }

    fn render_dpi(&self) -> Option<u32> {
        Some(self.dpi)
    }
}

/// Split `first..=last` into at most `parts` contiguous, ordered sub-ranges.
fn split_range(first: usize, last: usize, parts: usize) -> Vec<(usize, usize)> {
    let total = last - first + 1;
    let parts = parts.clamp(1, total);
    let base = total / parts;
    let extra = total % parts;

    let mut ranges = Vec::with_capacity(parts);
    let mut start = first;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        ranges.push((start, start + len - 1));
        start += len;
    }
    ranges
}

/// Copy pixmap samples into an owned image. Rows may be padded (`stride`).
fn pixmap_to_image(
    width: u32,
    height: u32,
    stride: usize,
    components: usize,
    samples: &[u8],
) -> Option<DynamicImage> {
    let (w, h) = (width as usize, height as usize);
    if components == 0 || stride == 0 || stride < w * components || samples.len() < stride * h {
        return None;
    }
    let rows = samples.chunks(stride).take(h);

    match components {
        1 | 2 => {
            let data: Vec<u8> = rows
                .flat_map(|row| row[..w * components].chunks(components).map(|px| px[0]))
                .collect();
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        _ => {
            let data: Vec<u8> = rows
                .flat_map(|row| {
                    row[..w * components]
                        .chunks(components)
                        .flat_map(|px| [px[0], px[1], px[2]])
                })
                .collect();
            RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
    }
}
