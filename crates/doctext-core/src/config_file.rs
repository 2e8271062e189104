use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::DEFAULT_LANGUAGE;
use crate::orchestrator::DEFAULT_FALLBACK_MIN_CHARS;
use crate::strategy::ocr::BATCH_SIZE;

/// Environment variable overriding the OCR language.
pub const LANGUAGE_ENV: &str = "DOCTEXT_LANGUAGE";
/// Tesseract's own variable for the trained-data directory.
pub const TESSDATA_ENV: &str = "TESSDATA_PREFIX";

pub const DEFAULT_RASTER_DPI: u32 = 200;
pub const DEFAULT_RENDER_THREADS: usize = 2;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub ocr: Option<OcrConfig>,
    pub pdf: Option<PdfConfig>,
    pub extraction: Option<ExtractionSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    pub language: Option<String>,
    pub tessdata_dir: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfConfig {
    pub raster_dpi: Option<u32>,
    pub render_threads: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSection {
    pub fallback_min_chars: Option<usize>,
}

/// Platform config directory path: `<config_dir>/doctext/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("doctext").join("config.toml"))
}

/// Load config by cascading CWD `.doctext.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".doctext.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        ocr: Some(OcrConfig {
            language: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.language.clone())
                .or_else(|| base.ocr.as_ref().and_then(|o| o.language.clone())),
            tessdata_dir: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.tessdata_dir.clone())
                .or_else(|| base.ocr.as_ref().and_then(|o| o.tessdata_dir.clone())),
            batch_size: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.batch_size)
                .or_else(|| base.ocr.as_ref().and_then(|o| o.batch_size)),
        }),
        pdf: Some(PdfConfig {
            raster_dpi: overlay
                .pdf
                .as_ref()
                .and_then(|p| p.raster_dpi)
                .or_else(|| base.pdf.as_ref().and_then(|p| p.raster_dpi)),
            render_threads: overlay
                .pdf
                .as_ref()
                .and_then(|p| p.render_threads)
                .or_else(|| base.pdf.as_ref().and_then(|p| p.render_threads)),
        }),
        extraction: Some(ExtractionSection {
            fallback_min_chars: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.fallback_min_chars)
                .or_else(|| {
                    base.extraction
                        .as_ref()
                        .and_then(|e| e.fallback_min_chars)
                }),
        }),
    }
}

/// Resolved tunables for building the registry and extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub batch_size: usize,
    pub fallback_min_chars: usize,
    pub raster_dpi: u32,
    pub render_threads: usize,
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            fallback_min_chars: DEFAULT_FALLBACK_MIN_CHARS,
            raster_dpi: DEFAULT_RASTER_DPI,
            render_threads: DEFAULT_RENDER_THREADS,
            tessdata_dir: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl ExtractionConfig {
    /// Resolve from a config file and the process environment.
    /// Environment wins over the file; the file wins over defaults.
    pub fn resolve(file: &ConfigFile) -> Self {
        Self::resolve_with(file, |key| std::env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with an explicit environment lookup.
    pub fn resolve_with(file: &ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let ocr = file.ocr.clone().unwrap_or_default();
        let pdf = file.pdf.clone().unwrap_or_default();
        let extraction = file.extraction.clone().unwrap_or_default();

        let language = env(LANGUAGE_ENV)
            .filter(|s| !s.trim().is_empty())
            .or(ocr.language)
            .unwrap_or(defaults.language);
        let tessdata_dir = env(TESSDATA_ENV)
            .filter(|s| !s.trim().is_empty())
            .or(ocr.tessdata_dir)
            .map(PathBuf::from);

        Self {
            batch_size: ocr.batch_size.unwrap_or(defaults.batch_size).max(1),
            fallback_min_chars: extraction
                .fallback_min_chars
                .unwrap_or(defaults.fallback_min_chars),
            raster_dpi: pdf
                .raster_dpi
                .filter(|&dpi| dpi > 0)
                .unwrap_or(defaults.raster_dpi),
            render_threads: pdf.render_threads.unwrap_or(defaults.render_threads).max(1),
            tessdata_dir,
            language,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn partial_toml_deserializes() {
        let toml_str = "[ocr]\nlanguage = \"deu\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let ocr = parsed.ocr.unwrap();
        assert_eq!(ocr.language.as_deref(), Some("deu"));
        assert!(ocr.tessdata_dir.is_none());
        assert!(parsed.pdf.is_none());
    }

    #[test]
    fn round_trip_toml() {
        let config = ConfigFile {
            pdf: Some(PdfConfig {
                raster_dpi: Some(300),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.pdf.unwrap().raster_dpi, Some(300));
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            ocr: Some(OcrConfig {
                language: Some("eng".into()),
                batch_size: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            ocr: Some(OcrConfig {
                language: Some("fra".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay).ocr.unwrap();
        assert_eq!(merged.language.as_deref(), Some("fra"));
        assert_eq!(merged.batch_size, Some(3));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            extraction: Some(ExtractionSection {
                fallback_min_chars: Some(10),
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.extraction.unwrap().fallback_min_chars, Some(10));
    }

    #[test]
    fn load_from_path_missing_or_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("absent.toml")).is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[ocr\nlanguage = ").unwrap();
        assert!(load_from_path(&bad).is_none());

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[pdf]\nrender_threads = 4\n").unwrap();
        assert_eq!(load_from_path(&good).unwrap().pdf.unwrap().render_threads, Some(4));
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = ExtractionConfig::resolve_with(&ConfigFile::default(), no_env);
        assert_eq!(config, ExtractionConfig::default());
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.fallback_min_chars, 50);
        assert_eq!(config.language, "eng");
    }

    #[test]
    fn env_beats_file() {
        let file = ConfigFile {
            ocr: Some(OcrConfig {
                language: Some("spa".into()),
                tessdata_dir: Some("/file/tessdata".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env: HashMap<&str, &str> =
            HashMap::from([(LANGUAGE_ENV, "jpn"), (TESSDATA_ENV, "/env/tessdata")]);

        let config =
            ExtractionConfig::resolve_with(&file, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.language, "jpn");
        assert_eq!(config.tessdata_dir, Some(PathBuf::from("/env/tessdata")));

        let config = ExtractionConfig::resolve_with(&file, no_env);
        assert_eq!(config.language, "spa");
        assert_eq!(config.tessdata_dir, Some(PathBuf::from("/file/tessdata")));
    }

    #[test]
    fn blank_env_is_ignored() {
        let config = ExtractionConfig::resolve_with(&ConfigFile::default(), |k| {
            (k == LANGUAGE_ENV).then(|| "  ".to_string())
        });
        assert_eq!(config.language, "eng");
    }

    #[test]
    fn zero_values_are_clamped() {
        let file = ConfigFile {
            ocr: Some(OcrConfig {
                batch_size: Some(0),
                ..Default::default()
            }),
            pdf: Some(PdfConfig {
                raster_dpi: Some(0),
                render_threads: Some(0),
            }),
            ..Default::default()
        };
        let config = ExtractionConfig::resolve_with(&file, no_env);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.raster_dpi, DEFAULT_RASTER_DPI);
        assert_eq!(config.render_threads, 1);
    }
}
