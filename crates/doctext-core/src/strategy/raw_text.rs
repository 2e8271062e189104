use std::io::{Read, Seek, SeekFrom};

use crate::{
    ExtractError, ExtractionResult, Metadata, PARAGRAPH_SEPARATOR, ReadSeek, StrategyKind,
};

use super::ExtractionStrategy;

/// Bytes read from the stream per decode step.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Past this many bytes a large-file warning is logged. Reading continues.
pub const LARGE_TEXT_WARN_BYTES: u64 = 500 * 1024 * 1024;

/// Plain text files (`.txt`, `.md`, `.csv`, `.json`, `.xml`).
///
/// Each chunk is decoded as UTF-8 and falls back to Latin-1 on its own, so a
/// malformed chunk never aborts the read. A multi-byte character split across
/// two chunks is carried over rather than treated as malformed.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawTextStrategy;

impl RawTextStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Decode an in-memory buffer in one step, with the same UTF-8 then
    /// Latin-1 policy as the streaming path.
    pub fn extract_bytes(&self, bytes: &[u8]) -> ExtractionResult {
        text_result(decode_bytes(bytes))
    }
}

impl ExtractionStrategy for RawTextStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RawText
    }

    fn extract(
        &self,
        stream: &mut dyn ReadSeek,
        _language: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        tracing::info!("Starting raw text extraction");

        let text = read_chunked(stream).map_err(|e| {
            tracing::error!(error = %e, "Raw text extraction failed");
            ExtractError::extraction("text file", e)
        })?;

        tracing::info!(chars = text.chars().count(), "Raw text extraction complete");
        Ok(text_result(text))
    }
}

fn text_result(text: String) -> ExtractionResult {
    let mut metadata = Metadata::new();
    metadata.insert("method".into(), "raw_text".into());
    metadata.insert("page_count".into(), 1.into());
    ExtractionResult::from_pages(vec![text], PARAGRAPH_SEPARATOR, metadata)
}

fn read_chunked(stream: &mut dyn ReadSeek) -> std::io::Result<String> {
    stream.seek(SeekFrom::Start(0))?;

    let mut text = String::new();
    // Incomplete UTF-8 sequence left at the end of the previous chunk.
    let mut pending: Vec<u8> = Vec::new();
    let mut total: u64 = 0;
    let mut warned = false;

    loop {
        let carried = pending.len();
        let mut chunk = Vec::with_capacity(CHUNK_SIZE + carried);
        chunk.append(&mut pending);
        let read = (&mut *stream)
            .take(CHUNK_SIZE as u64)
            .read_to_end(&mut chunk)?;

        if read == 0 {
            if !chunk.is_empty() {
                text.push_str(&decode_bytes(&chunk));
            }
            break;
        }

        total += read as u64;
        if total > LARGE_TEXT_WARN_BYTES && !warned {
            warned = true;
            tracing::warn!(
                mb = total / (1024 * 1024),
                "Large text file detected, still reading"
            );
        }

        pending = decode_chunk(&mut text, chunk, carried);
    }

    Ok(text)
}

/// Append one chunk to `text`, returning an incomplete trailing sequence to
/// carry into the next chunk. The first `carried` bytes are the previous
/// chunk's carry; if they turn out not to start a character they are decoded
/// as Latin-1 alone and the rest of the chunk is decoded on its own.
fn decode_chunk(text: &mut String, mut chunk: Vec<u8>, carried: usize) -> Vec<u8> {
    match std::str::from_utf8(&chunk) {
        Ok(decoded) => {
            text.push_str(decoded);
            Vec::new()
        }
        Err(e) if e.error_len().is_some() && e.valid_up_to() < carried => {
            let rest = chunk.split_off(carried);
            text.push_str(&decode_latin1(&chunk));
            decode_chunk(text, rest, 0)
        }
        Err(e) if e.error_len().is_none() => {
            let tail = chunk.split_off(e.valid_up_to());
            text.push_str(&String::from_utf8_lossy(&chunk));
            tail
        }
        Err(_) => {
            tracing::warn!("UTF-8 decode failed for chunk, falling back to latin-1");
            text.push_str(&decode_latin1(&chunk));
            Vec::new()
        }
    }
}

/// UTF-8 if valid, Latin-1 otherwise.
pub fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(decoded) => decoded.to_owned(),
        Err(_) => {
            tracing::warn!("UTF-8 decode failed, falling back to latin-1");
            decode_latin1(bytes)
        }
    }
}

/// Latin-1 maps every byte to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}
