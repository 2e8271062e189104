use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use clap::ValueEnum;
use zip::write::SimpleFileOptions;

use doctext_ingest::ExtractionResult;

/// How the extraction result is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The full text
    Text,
    /// The full result with pages and metadata, as JSON
    Json,
    /// A ZIP archive with one `page_NNN.txt` entry per page
    Zip,
}

/// Write `result` to a stream. ZIP output needs a seekable file; use
/// [`write_to_path`] for it.
pub fn write_result(
    w: &mut dyn Write,
    result: &ExtractionResult,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => w.write_all(result.full_text().as_bytes())?,
        OutputFormat::Json => serde_json::to_writer_pretty(&mut *w, result)?,
        OutputFormat::Zip => anyhow::bail!("ZIP output must be written to a file"),
    }
    Ok(())
}

/// Write `result` to a new file at `path`, replacing any existing file.
pub fn write_to_path(
    path: &Path,
    result: &ExtractionResult,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let file = File::create(path)?;
    match format {
        OutputFormat::Zip => {
            write_page_archive(file, result)?;
        }
        _ => {
            let mut writer = BufWriter::new(file);
            write_result(&mut writer, result, format)?;
            writer.flush()?;
        }
    }
    Ok(())
}

/// Name of the archive entry for 1-based page `page`.
pub fn page_entry_name(page: usize) -> String {
    format!("page_{page:03}.txt")
}

/// One text entry per page, in page order.
pub fn write_page_archive<W: Write + Seek>(
    writer: W,
    result: &ExtractionResult,
) -> anyhow::Result<W> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = SimpleFileOptions::default();
    for (i, page) in result.pages().iter().enumerate() {
        zip.start_file(page_entry_name(i + 1), options)?;
        zip.write_all(page.as_bytes())?;
    }
    Ok(zip.finish()?)
}
