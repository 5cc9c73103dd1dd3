use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ExtractionError;
use crate::extract::CommandExtractor;
use crate::model::ContentFilter;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "csv", "tsv", "json", "xml", "html", "htm", "md", "log", "ini", "cfg", "conf", "yaml",
    "yml", "toml", "rs", "py", "js", "ts", "jsx", "tsx", "c", "h", "cpp", "hpp", "cc", "java",
    "kt", "go", "rb", "php", "cs", "swift", "sh", "bat", "ps1", "sql", "css",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "gif"];

/// Content family of a file, decided by extension alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    PlainText,
    Pdf,
    Image,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let extension = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return Self::Other,
        };
        if PLAIN_TEXT_EXTENSIONS.contains(&extension.as_str()) {
            Self::PlainText
        } else if extension == "pdf" {
            Self::Pdf
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Self::Image
        } else {
            Self::Other
        }
    }
}

/// Text extraction backend for one file family (PDF, OCR, ...).
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentCount {
    pub matched: bool,
    pub occurrences: usize,
    /// The file itself could not be read, as opposed to a backend failing on it.
    pub unreadable: bool,
}

impl ContentCount {
    fn none() -> Self {
        Self::default()
    }

    fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentCapabilities {
    pub plain_text: bool,
    pub pdf: Option<String>,
    pub ocr: Option<String>,
}

pub struct ContentMatcher {
    pdf: Option<Box<dyn TextExtractor>>,
    ocr: Option<Box<dyn TextExtractor>>,
    ocr_case_insensitive: bool,
}

impl Default for ContentMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContentMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentMatcher")
            .field("capabilities", &self.capabilities())
            .field("ocr_case_insensitive", &self.ocr_case_insensitive)
            .finish()
    }
}

impl ContentMatcher {
    /// Plain-text matching only; PDF and image files never match.
    pub fn new() -> Self {
        Self {
            pdf: None,
            ocr: None,
            ocr_case_insensitive: true,
        }
    }

    /// Probes the host for `pdftotext` and `tesseract` and wires whichever exist.
    pub fn from_system() -> Self {
        let mut matcher = Self::new();
        if let Some(pdf) = CommandExtractor::pdftotext().probe() {
            matcher.pdf = Some(Box::new(pdf));
        }
        if let Some(ocr) = CommandExtractor::tesseract().probe() {
            matcher.ocr = Some(Box::new(ocr));
        }
        matcher
    }

    pub fn with_pdf_extractor(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.pdf = Some(Box::new(extractor));
        self
    }

    pub fn with_ocr_extractor(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.ocr = Some(Box::new(extractor));
        self
    }

    pub fn with_ocr_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.ocr_case_insensitive = case_insensitive;
        self
    }

    pub fn ocr_available(&self) -> bool {
        self.ocr.is_some()
    }

    pub fn capabilities(&self) -> ContentCapabilities {
        ContentCapabilities {
            plain_text: true,
            pdf: self.pdf.as_ref().map(|backend| backend.name().to_string()),
            ocr: self.ocr.as_ref().map(|backend| backend.name().to_string()),
        }
    }

    /// Counts literal occurrences of `filter.pattern` in the text of `path`.
    ///
    /// Never fails: missing backends and extraction errors read as zero occurrences.
    pub fn count_occurrences(
        &self,
        path: &Path,
        filter: &ContentFilter,
        kind: FileKind,
    ) -> ContentCount {
        if filter.pattern.is_empty() {
            return ContentCount::none();
        }

        let (text, case_insensitive) = match kind {
            FileKind::PlainText => match fs::read(path) {
                Ok(bytes) => (String::from_utf8_lossy(&bytes).into_owned(), false),
                Err(err) => {
                    warn!("content read failed for {}: {}", path.display(), err);
                    return ContentCount::unreadable();
                }
            },
            FileKind::Pdf => match self.extract_with(self.pdf.as_deref(), path) {
                Ok(Some(text)) => (text, false),
                Ok(None) => return ContentCount::none(),
                Err(count) => return count,
            },
            FileKind::Image => match self.extract_with(self.ocr.as_deref(), path) {
                Ok(Some(text)) => (text, self.ocr_case_insensitive),
                Ok(None) => return ContentCount::none(),
                Err(count) => return count,
            },
            FileKind::Other => return ContentCount::none(),
        };

        let occurrences = if case_insensitive {
            count_literal(&text.to_lowercase(), &filter.pattern.to_lowercase())
        } else {
            count_literal(&text, &filter.pattern)
        };

        ContentCount {
            matched: occurrences >= filter.threshold(),
            occurrences,
            unreadable: false,
        }
    }

    fn extract_with(
        &self,
        backend: Option<&dyn TextExtractor>,
        path: &Path,
    ) -> Result<Option<String>, ContentCount> {
        let Some(backend) = backend else {
            return Ok(None);
        };
        match backend.extract_text(path) {
            Ok(text) => Ok(Some(text)),
            Err(err @ ExtractionError::Io { .. }) => {
                warn!("{} extraction could not read file: {}", backend.name(), err);
                Err(ContentCount::unreadable())
            }
            Err(err) => {
                warn!("{err}; treating file as not containing the pattern");
                Err(ContentCount::none())
            }
        }
    }
}

/// Non-overlapping literal substring count.
pub fn count_literal(text: &str, pattern: &str) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    text.matches(pattern).count()
}
