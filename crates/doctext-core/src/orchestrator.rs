//! The extraction entry point.
//!
//! [`Extractor::extract`] normalizes the input into a seekable stream, asks the
//! [`Registry`] for a strategy, runs it, and retries near-empty native PDF
//! results with OCR.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::SpooledTempFile;

use crate::registry::Registry;
use crate::{DEFAULT_LANGUAGE, ExtractError, ExtractionResult, OcrMode, ReadSeek, StrategyKind};

/// Native PDF results whose trimmed text is shorter than this many characters
/// are treated as scanned and re-extracted with OCR.
pub const DEFAULT_FALLBACK_MIN_CHARS: usize = 50;

/// Filename used for byte buffers when the caller gives none.
const UNKNOWN_FILE: &str = "unknown_file";
/// Filename used for streams with neither a caller filename nor a name hint.
const UNKNOWN_STREAM: &str = "unknown_stream";

/// Readers are held in memory up to this size before spilling to disk.
const SPOOL_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// A document to extract from.
pub enum Input<'a> {
    /// A file on disk. Opened (and closed) by the extractor.
    Path(PathBuf),
    /// An in-memory document.
    Bytes(Cow<'a, [u8]>),
    /// A caller-owned seekable stream. `name` is used as a filename hint.
    Stream {
        stream: &'a mut dyn ReadSeek,
        name: Option<String>,
    },
    /// A caller-owned forward-only reader, spooled before extraction.
    Reader {
        reader: &'a mut dyn Read,
        name: Option<String>,
    },
}

impl<'a> Input<'a> {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Input::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Input::Bytes(bytes.into())
    }

    pub fn stream(stream: &'a mut dyn ReadSeek) -> Self {
        Input::Stream { stream, name: None }
    }

    pub fn named_stream(stream: &'a mut dyn ReadSeek, name: impl Into<String>) -> Self {
        Input::Stream {
            stream,
            name: Some(name.into()),
        }
    }

    pub fn reader(reader: &'a mut dyn Read, name: Option<String>) -> Self {
        Input::Reader { reader, name }
    }
}

impl From<PathBuf> for Input<'_> {
    fn from(path: PathBuf) -> Self {
        Input::Path(path)
    }
}

impl From<&Path> for Input<'_> {
    fn from(path: &Path) -> Self {
        Input::Path(path.to_path_buf())
    }
}

impl<'a> From<&'a [u8]> for Input<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Input::Bytes(Cow::Borrowed(bytes))
    }
}

impl From<Vec<u8>> for Input<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytes(Cow::Owned(bytes))
    }
}

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Drives extension-based selection. Derived from the input when `None`.
    pub filename: Option<String>,
    pub ocr_mode: OcrMode,
    /// Tesseract language code, e.g. `eng` or `eng+fra`.
    pub language: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            filename: None,
            ocr_mode: OcrMode::Auto,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl ExtractOptions {
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_ocr_mode(mut self, ocr_mode: OcrMode) -> Self {
        self.ocr_mode = ocr_mode;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Runs extractions against a [`Registry`].
pub struct Extractor<'r> {
    registry: &'r Registry,
    fallback_min_chars: usize,
}

impl<'r> Extractor<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            fallback_min_chars: DEFAULT_FALLBACK_MIN_CHARS,
        }
    }

    pub fn with_fallback_min_chars(mut self, min_chars: usize) -> Self {
        self.fallback_min_chars = min_chars;
        self
    }

    /// Extract text from `input`.
    ///
    /// Errors from selection or from any strategy are logged and returned
    /// unchanged. Streams opened here are closed before returning; caller
    /// streams are left open.
    pub fn extract(
        &self,
        input: Input<'_>,
        options: &ExtractOptions,
    ) -> Result<ExtractionResult, ExtractError> {
        let start = Instant::now();
        let result = self.extract_input(input, options);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(r) => tracing::info!(
                elapsed_ms,
                method = r.method().unwrap_or("unknown"),
                pages = r.page_count(),
                "Extraction finished"
            ),
            Err(e) => tracing::error!(elapsed_ms, error = %e, "Extraction failed"),
        }
        result
    }

    fn extract_input(
        &self,
        input: Input<'_>,
        options: &ExtractOptions,
    ) -> Result<ExtractionResult, ExtractError> {
        match input {
            Input::Path(path) => {
                let mut file = open_regular_file(&path)?;
                let derived = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                let filename = resolve_filename(options, derived, UNKNOWN_FILE);
                self.extract_stream(&mut file, &filename, options)
            }
            Input::Bytes(bytes) => {
                let mut cursor = Cursor::new(bytes.as_ref());
                let filename = resolve_filename(options, None, UNKNOWN_FILE);
                self.extract_stream(&mut cursor, &filename, options)
            }
            Input::Stream { stream, name } => {
                let filename = resolve_filename(options, name, UNKNOWN_STREAM);
                self.extract_stream(stream, &filename, options)
            }
            Input::Reader { reader, name } => {
                let mut spooled = SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
                std::io::copy(reader, &mut spooled)?;
                spooled.seek(SeekFrom::Start(0))?;
                let filename = resolve_filename(options, name, UNKNOWN_STREAM);
                self.extract_stream(&mut spooled, &filename, options)
            }
        }
    }

    fn extract_stream(
        &self,
        stream: &mut dyn ReadSeek,
        filename: &str,
        options: &ExtractOptions,
    ) -> Result<ExtractionResult, ExtractError> {
        tracing::info!(filename, mode = %options.ocr_mode, "Processing document");

        let strategy = self
            .registry
            .select(filename, options.ocr_mode == OcrMode::Force);
        let result = strategy.extract(stream, &options.language)?;

        if options.ocr_mode != OcrMode::Auto
            || strategy.kind() != StrategyKind::PdfNative
            || !self.looks_scanned(&result)
        {
            return Ok(result);
        }

        tracing::warn!(
            chars = result.full_text().trim().chars().count(),
            "Native PDF extraction yielded little text, falling back to OCR"
        );
        stream.seek(SeekFrom::Start(0))?;
        let ocr = self.registry.get(StrategyKind::Ocr.as_str())?;
        let result = ocr
            .extract(stream, &options.language)?
            .with_metadata("fallback_triggered", true)
            .with_metadata("original_method", StrategyKind::PdfNative.as_str());
        Ok(result)
    }

    /// Little text across at least one page suggests image-only pages.
    fn looks_scanned(&self, result: &ExtractionResult) -> bool {
        result.page_count() >= 1
            && result.full_text().trim().chars().count() < self.fallback_min_chars
    }
}

fn resolve_filename(options: &ExtractOptions, derived: Option<String>, placeholder: &str) -> String {
    options
        .filename
        .clone()
        .or(derived)
        .unwrap_or_else(|| placeholder.to_string())
}

fn open_regular_file(path: &Path) -> Result<File, ExtractError> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::NotFound(path.to_path_buf()),
        _ => ExtractError::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(ExtractError::UnsupportedInput(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::strategy::ExtractionStrategy;
    use crate::{Metadata, PAGE_SEPARATOR};

    /// Records every call and the bytes it could read from the stream's
    /// current position. Never seeks on its own.
    struct Fake {
        kind: StrategyKind,
        text: String,
        page_count: usize,
        fail: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl Fake {
        fn new(kind: StrategyKind, text: &str, page_count: usize) -> Arc<Self> {
            Arc::new(Self {
                kind,
                text: text.to_string(),
                page_count,
                fail: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(kind: StrategyKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                text: String::new(),
                page_count: 0,
                fail: true,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ExtractionStrategy for Fake {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn extract(
            &self,
            stream: &mut dyn ReadSeek,
            language: &str,
        ) -> Result<ExtractionResult, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes)?;
            self.seen.lock().unwrap().push(bytes);
            if self.fail {
                return Err(ExtractError::extraction("PDF", "corrupt xref table"));
            }
            let mut metadata = Metadata::new();
            metadata.insert("method".into(), self.kind.as_str().into());
            metadata.insert("page_count".into(), self.page_count.into());
            metadata.insert("language".into(), language.into());
            Ok(ExtractionResult::from_pages(
                vec![self.text.clone()],
                PAGE_SEPARATOR,
                metadata,
            ))
        }
    }

    struct Fixture {
        native: Arc<Fake>,
        ocr: Arc<Fake>,
        raw: Arc<Fake>,
        docx: Arc<Fake>,
        registry: Registry,
    }

    const LONG_TEXT: &str =
        "This native PDF page carries a real text layer, well past the fallback threshold.";

    fn fixture_with(native: Arc<Fake>) -> Fixture {
        let ocr = Fake::new(StrategyKind::Ocr, "text recognized by OCR", 1);
        let raw = Fake::new(StrategyKind::RawText, "hi", 1);
        let docx = Fake::new(StrategyKind::Docx, "short docx", 1);
        let registry = Registry::new(native.clone(), ocr.clone(), raw.clone(), docx.clone());
        Fixture {
            native,
            ocr,
            raw,
            docx,
            registry,
        }
    }

    fn fixture(native_text: &str, native_pages: usize) -> Fixture {
        fixture_with(Fake::new(StrategyKind::PdfNative, native_text, native_pages))
    }

    fn options(filename: &str) -> ExtractOptions {
        ExtractOptions::default().with_filename(filename)
    }

    #[test]
    fn scanned_pdf_falls_back_to_ocr_once() {
        let f = fixture("  \n\n \t ", 3);
        let extractor = Extractor::new(&f.registry);

        let result = extractor
            .extract(Input::bytes(b"%PDF-1.7 scan".as_slice()), &options("scan.pdf"))
            .unwrap();

        assert_eq!(f.native.calls(), 1);
        assert_eq!(f.ocr.calls(), 1);
        assert_eq!(result.full_text(), "text recognized by OCR");
        assert_eq!(result.metadata()["fallback_triggered"], true);
        assert_eq!(result.metadata()["original_method"], "pdf_native");
        assert_eq!(result.method(), Some("ocr"));
        // OCR reads the document from the start again.
        assert_eq!(f.ocr.seen.lock().unwrap()[0], b"%PDF-1.7 scan");
    }

    #[test]
    fn fallback_threshold_boundary() {
        let below = fixture(&"x".repeat(DEFAULT_FALLBACK_MIN_CHARS - 1), 1);
        Extractor::new(&below.registry)
            .extract(Input::bytes(b"pdf".as_slice()), &options("a.pdf"))
            .unwrap();
        assert_eq!(below.ocr.calls(), 1);

        let at = fixture(&"x".repeat(DEFAULT_FALLBACK_MIN_CHARS), 1);
        let result = Extractor::new(&at.registry)
            .extract(Input::bytes(b"pdf".as_slice()), &options("a.pdf"))
            .unwrap();
        assert_eq!(at.ocr.calls(), 0);
        assert_eq!(result.method(), Some("pdf_native"));
    }

    #[test]
    fn custom_threshold() {
        let f = fixture(LONG_TEXT, 1);
        let extractor = Extractor::new(&f.registry).with_fallback_min_chars(1000);
        extractor
            .extract(Input::bytes(b"pdf".as_slice()), &options("a.pdf"))
            .unwrap();
        assert_eq!(f.ocr.calls(), 1);
    }

    #[test]
    fn long_native_text_is_returned_as_is() {
        let f = fixture(LONG_TEXT, 2);
        let result = Extractor::new(&f.registry)
            .extract(Input::bytes(b"pdf".as_slice()), &options("paper.pdf"))
            .unwrap();

        assert_eq!(f.ocr.calls(), 0);
        assert_eq!(result.full_text(), LONG_TEXT);
        assert!(result.metadata().get("fallback_triggered").is_none());
    }

    #[test]
    fn zero_page_pdf_does_not_fall_back() {
        let f = fixture("", 0);
        Extractor::new(&f.registry)
            .extract(Input::bytes(b"pdf".as_slice()), &options("empty.pdf"))
            .unwrap();
        assert_eq!(f.ocr.calls(), 0);
    }

    #[test]
    fn skip_mode_suppresses_fallback() {
        let f = fixture("", 4);
        let result = Extractor::new(&f.registry)
            .extract(
                Input::bytes(b"pdf".as_slice()),
                &options("scan.pdf").with_ocr_mode(OcrMode::Skip),
            )
            .unwrap();

        assert_eq!(f.native.calls(), 1);
        assert_eq!(f.ocr.calls(), 0);
        assert_eq!(result.method(), Some("pdf_native"));
    }

    #[test]
    fn short_text_from_other_strategies_never_falls_back() {
        let f = fixture(LONG_TEXT, 1);
        let extractor = Extractor::new(&f.registry);

        extractor
            .extract(Input::bytes(b"hi".as_slice()), &options("notes.txt"))
            .unwrap();
        extractor
            .extract(Input::bytes(b"PK".as_slice()), &options("memo.docx"))
            .unwrap();

        assert_eq!(f.raw.calls(), 1);
        assert_eq!(f.docx.calls(), 1);
        assert_eq!(f.ocr.calls(), 0);
    }

    #[test]
    fn force_mode_uses_ocr_for_any_extension() {
        let f = fixture(LONG_TEXT, 1);
        let extractor = Extractor::new(&f.registry);

        for name in ["paper.pdf", "notes.txt", "memo.docx"] {
            let result = extractor
                .extract(
                    Input::bytes(b"data".as_slice()),
                    &options(name).with_ocr_mode(OcrMode::Force),
                )
                .unwrap();
            assert!(result.metadata().get("fallback_triggered").is_none());
        }

        assert_eq!(f.ocr.calls(), 3);
        assert_eq!(f.native.calls() + f.raw.calls() + f.docx.calls(), 0);
    }

    #[test]
    fn language_reaches_the_strategy() {
        let f = fixture(LONG_TEXT, 1);
        let result = Extractor::new(&f.registry)
            .extract(
                Input::bytes(b"img".as_slice()),
                &options("scan.png").with_language("deu"),
            )
            .unwrap();
        assert_eq!(result.metadata()["language"], "deu");
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.pdf");
        let f = fixture(LONG_TEXT, 1);

        let err = Extractor::new(&f.registry)
            .extract(Input::path(&missing), &ExtractOptions::default())
            .unwrap_err();

        assert!(matches!(err, ExtractError::NotFound(ref p) if p == &missing));
        assert_eq!(f.native.calls(), 0);
    }

    #[test]
    fn directory_path_is_unsupported_input() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(LONG_TEXT, 1);

        let err = Extractor::new(&f.registry)
            .extract(Input::path(dir.path()), &ExtractOptions::default())
            .unwrap_err();

        assert!(matches!(err, ExtractError::UnsupportedInput(_)));
    }

    #[test]
    fn path_input_derives_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Notes.TXT");
        std::fs::write(&path, b"file contents").unwrap();
        let f = fixture(LONG_TEXT, 1);

        Extractor::new(&f.registry)
            .extract(Input::path(&path), &ExtractOptions::default())
            .unwrap();

        assert_eq!(f.raw.calls(), 1);
        assert_eq!(f.raw.seen.lock().unwrap()[0], b"file contents");
    }

    #[test]
    fn explicit_filename_beats_derived_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"PK").unwrap();
        let f = fixture(LONG_TEXT, 1);

        Extractor::new(&f.registry)
            .extract(Input::path(&path), &options("memo.docx"))
            .unwrap();

        assert_eq!(f.docx.calls(), 1);
    }

    #[test]
    fn unnamed_bytes_route_to_native_pdf() {
        let f = fixture(LONG_TEXT, 1);
        Extractor::new(&f.registry)
            .extract(Input::from(b"%PDF".to_vec()), &ExtractOptions::default())
            .unwrap();
        assert_eq!(f.native.calls(), 1);
    }

    #[test]
    fn stream_name_is_a_filename_hint() {
        let f = fixture(LONG_TEXT, 1);
        let extractor = Extractor::new(&f.registry);

        let mut stream = Cursor::new(b"PK".to_vec());
        extractor
            .extract(
                Input::named_stream(&mut stream, "memo.docx"),
                &ExtractOptions::default(),
            )
            .unwrap();
        assert_eq!(f.docx.calls(), 1);

        // An explicit filename still wins over the hint.
        let mut stream = Cursor::new(b"plain".to_vec());
        extractor
            .extract(
                Input::named_stream(&mut stream, "memo.docx"),
                &options("notes.md"),
            )
            .unwrap();
        assert_eq!(f.raw.calls(), 1);
    }

    #[test]
    fn caller_stream_remains_usable() {
        let f = fixture("", 1);
        let mut stream = Cursor::new(b"%PDF scanned".to_vec());

        Extractor::new(&f.registry)
            .extract(Input::stream(&mut stream), &ExtractOptions::default())
            .unwrap();

        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut again = String::new();
        stream.read_to_string(&mut again).unwrap();
        assert_eq!(again, "%PDF scanned");
    }

    #[test]
    fn reader_input_is_spooled() {
        let f = fixture(LONG_TEXT, 1);
        let mut reader: &[u8] = b"forward-only text";

        Extractor::new(&f.registry)
            .extract(
                Input::reader(&mut reader, Some("log.txt".into())),
                &ExtractOptions::default(),
            )
            .unwrap();

        assert_eq!(f.raw.seen.lock().unwrap()[0], b"forward-only text");
    }

    #[test]
    fn strategy_errors_propagate_unchanged() {
        let f = fixture_with(Fake::failing(StrategyKind::PdfNative));

        let err = Extractor::new(&f.registry)
            .extract(Input::bytes(b"junk".as_slice()), &options("broken.pdf"))
            .unwrap_err();

        assert!(matches!(
            err,
            ExtractError::Extraction {
                source_kind: "PDF",
                ..
            }
        ));
        assert_eq!(f.ocr.calls(), 0);
    }
}
