use crate::{ExtractError, ExtractionResult, ReadSeek, StrategyKind};

pub mod docx;
pub mod native_pdf;
pub mod ocr;
pub mod raw_text;

pub use docx::DocxStrategy;
pub use native_pdf::NativePdfStrategy;
pub use ocr::OcrStrategy;
pub use raw_text::RawTextStrategy;

/// One way of turning a byte stream into text.
///
/// Implementations hold no per-call state, so a single instance is shared by
/// every extraction in the process. `extract` rewinds the stream itself; it
/// never relies on the caller's read position.
pub trait ExtractionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Extract the whole document. Returns either a complete result or an
    /// error, never a partial result.
    fn extract(
        &self,
        stream: &mut dyn ReadSeek,
        language: &str,
    ) -> Result<ExtractionResult, ExtractError>;
}
