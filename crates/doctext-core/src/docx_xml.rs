//! Paragraph reader for WordprocessingML (`.docx`) packages.
//!
//! Reads `word/document.xml` out of the ZIP container with SAX-style event
//! processing and returns the body-level paragraphs (`<w:p>` elements that are
//! direct children of `<w:body>`). Paragraphs inside tables and text boxes are
//! not body-level and are skipped. The whole part is parsed in memory; there
//! is no incremental mode.

use std::io::{BufRead, BufReader, Seek, SeekFrom};

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::backend::DocxLoader;
use crate::{BackendError, ReadSeek};

const DOCUMENT_PART: &str = "word/document.xml";

/// Default [`DocxLoader`] backed by `zip` and `quick-xml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OoxmlDocxLoader;

impl DocxLoader for OoxmlDocxLoader {
    fn paragraphs(&self, stream: &mut dyn ReadSeek) -> Result<Vec<String>, BackendError> {
        stream.seek(SeekFrom::Start(0))?;
        let mut archive = zip::ZipArchive::new(stream)
            .map_err(|e| BackendError::Open(format!("not a DOCX package: {e}")))?;
        let part = archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| BackendError::Open(format!("missing {DOCUMENT_PART}: {e}")))?;
        parse_paragraphs(BufReader::new(part))
    }
}

/// Parse the paragraphs of a `document.xml` part.
///
/// Run text (`<w:t>`) is concatenated; `<w:tab/>` becomes a tab and
/// `<w:br/>` / `<w:cr/>` become newlines. Empty paragraphs are kept.
pub fn parse_paragraphs<R: BufRead>(reader: R) -> Result<Vec<String>, BackendError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(false);

    let mut buf = Vec::with_capacity(4096);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut paragraphs = Vec::new();

    // Body-level paragraph being read, and the stack depth it was opened at.
    let mut current: Option<String> = None;
    let mut paragraph_depth = 0usize;
    let mut in_text = false;
    let mut text_box_depth = 0usize;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"w:p" if is_body(&stack) => {
                        current = Some(String::new());
                        paragraph_depth = stack.len();
                    }
                    b"w:t" if current.is_some() && text_box_depth == 0 => in_text = true,
                    b"w:txbxContent" => text_box_depth += 1,
                    _ => {}
                }
                stack.push(name);
            }

            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                match name.as_ref() {
                    b"w:p" if is_body(&stack) => paragraphs.push(String::new()),
                    b"w:tab" if text_box_depth == 0 => {
                        if let Some(p) = current.as_mut() {
                            p.push('\t');
                        }
                    }
                    b"w:br" | b"w:cr" if text_box_depth == 0 => {
                        if let Some(p) = current.as_mut() {
                            p.push('\n');
                        }
                    }
                    _ => {}
                }
            }

            Ok(Event::Text(ref e)) => {
                if in_text && let Some(p) = current.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| BackendError::Extraction(err.to_string()))?;
                    p.push_str(&text);
                }
            }

            Ok(Event::CData(ref e)) => {
                if in_text && let Some(p) = current.as_mut() {
                    p.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }

            Ok(Event::End(ref e)) => {
                stack.pop();
                match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:txbxContent" => text_box_depth = text_box_depth.saturating_sub(1),
                    b"w:p" if stack.len() == paragraph_depth => {
                        if let Some(p) = current.take() {
                            paragraphs.push(p);
                        }
                    }
                    _ => {}
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(BackendError::Extraction(format!(
                    "malformed {DOCUMENT_PART} at byte {}: {e}",
                    xml.buffer_position()
                )));
            }

            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn is_body(stack: &[Vec<u8>]) -> bool {
    stack.last().is_some_and(|name| name == b"w:body")
}

/// Build an in-memory `.docx` whose body is `body_xml`.
#[cfg(test)]
pub(crate) fn build_docx(body_xml: &str) -> Vec<u8> {
    use std::io::{Cursor, Write};

    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body_xml}<w:sectPr/></w:body></w:document>"#
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer
        .write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    writer.start_file(DOCUMENT_PART, options).unwrap();
    writer.write_all(document.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}
