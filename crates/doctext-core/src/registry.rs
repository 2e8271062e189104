use std::sync::Arc;

use crate::strategy::ExtractionStrategy;
use crate::{ExtractError, StrategyKind};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "bmp"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "xml"];

/// Immutable mapping from [`StrategyKind`] to the shared strategy instance.
///
/// Built once at startup; every extraction in the process reads from the same
/// registry. Strategies are stateless, so sharing them needs no locking.
pub struct Registry {
    pdf_native: Arc<dyn ExtractionStrategy>,
    ocr: Arc<dyn ExtractionStrategy>,
    raw_text: Arc<dyn ExtractionStrategy>,
    docx: Arc<dyn ExtractionStrategy>,
}

impl Registry {
    pub fn new(
        pdf_native: Arc<dyn ExtractionStrategy>,
        ocr: Arc<dyn ExtractionStrategy>,
        raw_text: Arc<dyn ExtractionStrategy>,
        docx: Arc<dyn ExtractionStrategy>,
    ) -> Self {
        Self {
            pdf_native,
            ocr,
            raw_text,
            docx,
        }
    }

    pub fn strategy(&self, kind: StrategyKind) -> &dyn ExtractionStrategy {
        match kind {
            StrategyKind::PdfNative => self.pdf_native.as_ref(),
            StrategyKind::Ocr => self.ocr.as_ref(),
            StrategyKind::RawText => self.raw_text.as_ref(),
            StrategyKind::Docx => self.docx.as_ref(),
        }
    }

    /// Look up a strategy by identifier (`pdf_native`, `ocr`, `raw_text`, `docx`).
    pub fn get(&self, key: &str) -> Result<&dyn ExtractionStrategy, ExtractError> {
        let kind: StrategyKind = key.parse()?;
        Ok(self.strategy(kind))
    }

    /// Pick the strategy for `filename`. See [`select_kind`].
    pub fn select(&self, filename: &str, enable_ocr: bool) -> &dyn ExtractionStrategy {
        self.strategy(select_kind(filename, enable_ocr))
    }
}

/// Strategy for a filename, by case-insensitive extension.
///
/// `enable_ocr` always wins. Unknown or missing extensions go to the native
/// PDF strategy.
pub fn select_kind(filename: &str, enable_ocr: bool) -> StrategyKind {
    if enable_ocr {
        tracing::info!("Strategy selected: OCR (user override)");
        return StrategyKind::Ocr;
    }

    let ext = extension(filename);
    let kind = match ext.as_deref() {
        Some("pdf") => StrategyKind::PdfNative,
        Some(e) if IMAGE_EXTENSIONS.contains(&e) => StrategyKind::Ocr,
        Some(e) if TEXT_EXTENSIONS.contains(&e) => StrategyKind::RawText,
        Some("docx") => StrategyKind::Docx,
        _ => {
            tracing::warn!(filename, "Unknown file type, falling back to native PDF");
            return StrategyKind::PdfNative;
        }
    };
    tracing::info!(strategy = %kind, "Strategy selected");
    kind
}

/// Lowercased text after the last `.`, if any.
fn extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && !ext.contains(['/', '\\']))
}
