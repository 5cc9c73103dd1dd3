//! Text extraction through external programs.
//!
//! PDF text comes from poppler's `pdftotext`, image text from `tesseract`.
//! Availability is probed once when the extractor is built; a missing
//! program simply leaves that file family without content matching.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::content::TextExtractor;
use crate::error::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractorMode {
    Pdf,
    Ocr,
}

#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    mode: ExtractorMode,
}

impl CommandExtractor {
    pub fn pdftotext() -> Self {
        Self {
            program: "pdftotext".to_string(),
            mode: ExtractorMode::Pdf,
        }
    }

    pub fn tesseract() -> Self {
        Self {
            program: "tesseract".to_string(),
            mode: ExtractorMode::Ocr,
        }
    }

    /// Overrides the executable, e.g. an absolute path outside `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the extractor if its program runs on this host.
    pub fn probe(self) -> Option<Self> {
        let flag = match self.mode {
            ExtractorMode::Pdf => "-v",
            ExtractorMode::Ocr => "--version",
        };
        let status = Command::new(&self.program)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => {
                info!("{} text extraction enabled via {}", self.kind_label(), self.program);
                Some(self)
            }
            Ok(status) => {
                debug!("{} probe exited with {}", self.program, status);
                None
            }
            Err(err) => {
                debug!("{} not available: {}", self.program, err);
                None
            }
        }
    }

    fn kind_label(&self) -> &'static str {
        match self.mode {
            ExtractorMode::Pdf => "PDF",
            ExtractorMode::Ocr => "OCR",
        }
    }

    fn command_for(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        match self.mode {
            ExtractorMode::Pdf => {
                command.args(["-q", "-enc", "UTF-8"]).arg(path).arg("-");
            }
            ExtractorMode::Ocr => {
                command.arg(path).arg("stdout");
            }
        }
        command.stdin(Stdio::null());
        command
    }
}

impl TextExtractor for CommandExtractor {
    fn name(&self) -> &str {
        &self.program
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        std::fs::File::open(path).map_err(|source| ExtractionError::Io {
            path: PathBuf::from(path),
            source,
        })?;

        let output = self
            .command_for(path)
            .output()
            .map_err(|err| ExtractionError::Backend {
                backend: self.program.clone(),
                path: PathBuf::from(path),
                message: err.to_string(),
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Backend {
                backend: self.program.clone(),
                path: PathBuf::from(path),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(match self.mode {
            ExtractorMode::Pdf => text,
            ExtractorMode::Ocr => normalize_whitespace(&text),
        })
    }
}

/// Collapses runs of whitespace the way OCR output is cleaned before matching.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
