use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use doctext_core::OcrMode;
use doctext_core::config_file::load_config;
use doctext_ingest::{ExtractOptions, ExtractionConfig, Input};

mod output;

use output::OutputFormat;

/// Extract plain text from PDFs, scanned documents, images, DOCX and text files
#[derive(Parser, Debug)]
#[command(name = "doctext", version, about, long_about = None)]
struct Cli {
    /// Path to the document to extract text from
    input_file: PathBuf,

    /// Force OCR regardless of file type
    #[arg(long, conflicts_with = "no_ocr")]
    ocr: bool,

    /// Never retry PDFs with little text through OCR
    #[arg(long)]
    no_ocr: bool,

    /// OCR language code (e.g. eng, deu, eng+fra)
    #[arg(long)]
    language: Option<String>,

    /// Directory containing Tesseract traineddata files
    #[arg(long)]
    tessdata_dir: Option<PathBuf>,

    /// Path to output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn ocr_mode(&self) -> OcrMode {
        if self.ocr {
            OcrMode::Force
        } else if self.no_ocr {
            OcrMode::Skip
        } else {
            OcrMode::Auto
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

/// Logs go to stderr so stdout carries only extracted text.
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults
fn resolve_config(cli: &Cli) -> ExtractionConfig {
    let mut config = ExtractionConfig::resolve(&load_config());
    if let Some(dir) = &cli.tessdata_dir {
        config.tessdata_dir = Some(dir.clone());
    }
    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    config
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if !cli.input_file.exists() {
        anyhow::bail!("File not found: {}", cli.input_file.display());
    }
    if cli.format == OutputFormat::Zip && cli.output.is_none() {
        anyhow::bail!("--format zip requires --output <path>");
    }

    let config = resolve_config(&cli);
    doctext_ingest::init_registry(&config)?;

    let options = ExtractOptions::default()
        .with_ocr_mode(cli.ocr_mode())
        .with_language(config.language.clone());

    let result = doctext_ingest::extract(Input::path(&cli.input_file), &options)
        .with_context(|| format!("Extraction failed for {}", cli.input_file.display()))?;

    tracing::info!(
        method = result.method().unwrap_or("unknown"),
        pages = result.page_count(),
        chars = result.full_text().chars().count(),
        "Extraction complete"
    );

    match &cli.output {
        Some(path) => {
            output::write_to_path(path, &result, cli.format)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Output written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            output::write_result(&mut stdout, &result, cli.format)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}
