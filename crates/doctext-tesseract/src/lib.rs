use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use leptess::LepTess;

use doctext_core::{BackendError, OcrEngine};

/// Tesseract-backed [`OcrEngine`].
///
/// A fresh Tesseract handle is created per image; handles are not `Sync`, and
/// the OCR strategy calls `recognize` from several worker threads at once.
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine {
    /// Directory holding `<lang>.traineddata`. `None` lets Tesseract use
    /// `TESSDATA_PREFIX` or its compiled-in default.
    tessdata_dir: Option<PathBuf>,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    pub fn tessdata_dir(&self) -> Option<&Path> {
        self.tessdata_dir.as_deref()
    }

    fn init(&self, language: &str) -> Result<LepTess, BackendError> {
        let data_path = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| BackendError::Ocr("invalid tessdata path encoding".into()))?,
            ),
            None => None,
        };
        LepTess::new(data_path, language).map_err(|e| {
            BackendError::Ocr(format!(
                "failed to initialize Tesseract with language '{language}': {e}. \
                 Make sure the language data is installed"
            ))
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, BackendError> {
        self.run(image, language, None)
    }

    fn recognize_rendered(
        &self,
        image: &DynamicImage,
        language: &str,
        dpi: u32,
    ) -> Result<String, BackendError> {
        self.run(image, language, Some(dpi).filter(|&dpi| dpi > 0))
    }
}

impl TesseractEngine {
    /// `source_dpi` is only known for pages we rendered ourselves.
    fn run(
        &self,
        image: &DynamicImage,
        language: &str,
        source_dpi: Option<u32>,
    ) -> Result<String, BackendError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BackendError::Ocr(format!(
                "image dimensions must be non-zero (got {}x{})",
                image.width(),
                image.height()
            )));
        }

        let mut lt = self.init(language)?;

        // Encode image to PNG in memory (leptess expects encoded image data)
        let mut png_buf = Cursor::new(Vec::new());
        image
            .write_to(&mut png_buf, ImageFormat::Png)
            .map_err(|e| BackendError::Ocr(format!("failed to encode image to PNG: {e}")))?;

        lt.set_image_from_mem(png_buf.get_ref())
            .map_err(|e| BackendError::Ocr(format!("failed to set image from memory: {e}")))?;
        if let Some(dpi) = source_dpi {
            lt.set_source_resolution(dpi as i32);
        }

        let text = lt
            .get_utf8_text()
            .map_err(|e| BackendError::Ocr(format!("recognized text is not UTF-8: {e}")))?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            chars = text.len(),
            "Tesseract page done"
        );
        Ok(text)
    }
}
