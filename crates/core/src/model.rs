use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ShredError;
use crate::patterns::split_patterns;

/// Fixed pass sequence of the 7-pass DoD 5220.22-M style method.
pub const DOD_PASS_SEQUENCE: [PassPattern; 7] = [
    PassPattern::Fixed(0xFF),
    PassPattern::Fixed(0x00),
    PassPattern::Random,
    PassPattern::Fixed(0x00),
    PassPattern::Fixed(0xFF),
    PassPattern::Random,
    PassPattern::Fixed(0x00),
];

pub const DEFAULT_PASSES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchCriteria {
    pub root: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub follow_links: bool,
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub owner_pattern: Option<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_include: Option<ContentFilter>,
    #[serde(default)]
    pub content_exclude: Option<ContentFilter>,
    #[serde(default)]
    pub ocr_enabled: bool,
}

impl Default for MatchCriteria {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            recursive: false,
            follow_links: false,
            include_patterns: vec!["*".to_string()],
            exclude_patterns: Vec::new(),
            owner_pattern: None,
            created_after: None,
            created_before: None,
            modified_after: None,
            modified_before: None,
            content_include: None,
            content_exclude: None,
            ocr_enabled: false,
        }
    }
}

impl MatchCriteria {
    /// Builds criteria from comma/semicolon separated pattern strings, e.g. `"*.txt; secret*"`.
    pub fn from_pattern_strings(root: impl Into<PathBuf>, include: &str, exclude: &str) -> Self {
        Self {
            root: root.into(),
            include_patterns: split_patterns(include),
            exclude_patterns: split_patterns(exclude),
            ..Self::default()
        }
    }
}

/// A literal text pattern that must occur at least `min_occurrences` times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentFilter {
    pub pattern: String,
    #[serde(default = "default_min_occurrences")]
    pub min_occurrences: usize,
}

fn default_min_occurrences() -> usize {
    1
}

impl ContentFilter {
    pub fn new(pattern: impl Into<String>, min_occurrences: usize) -> Self {
        Self {
            pattern: pattern.into(),
            min_occurrences,
        }
    }

    pub(crate) fn threshold(&self) -> usize {
        self.min_occurrences.max(1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentFilterKind {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentMatch {
    pub filter: ContentFilterKind,
    pub pattern: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(default)]
    pub content_match: Option<ContentMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    NamePattern,
    CreatedOutOfRange,
    ModifiedOutOfRange,
    Owner { owner: String },
    ContentMissing { pattern: String, occurrences: usize },
    ContentPresent { pattern: String, occurrences: usize },
    Unreadable { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExcludedFile {
    pub path: PathBuf,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MatchResult {
    pub root: PathBuf,
    pub files: Vec<MatchedFile>,
    pub excluded: Vec<ExcludedFile>,
    pub excluded_count: u64,
}

impl MatchResult {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|file| file.path.clone()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files
            .iter()
            .fold(0_u64, |acc, file| acc.saturating_add(file.size_bytes))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShredMethod {
    #[default]
    Basic,
    #[serde(rename = "dod_5220_22_m", alias = "dod")]
    Dod522022M,
}

/// Byte pattern written by one pass. `Random` draws one byte per pass and repeats it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassPattern {
    Fixed(u8),
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShredConfig {
    #[serde(default)]
    pub method: ShredMethod,
    #[serde(default = "default_passes")]
    pub passes: u32,
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_passes() -> u32 {
    DEFAULT_PASSES
}

fn default_verify() -> bool {
    true
}

impl Default for ShredConfig {
    fn default() -> Self {
        Self {
            method: ShredMethod::Basic,
            passes: DEFAULT_PASSES,
            verify: true,
        }
    }
}

impl ShredConfig {
    pub fn basic(passes: u32) -> Self {
        Self {
            method: ShredMethod::Basic,
            passes,
            verify: false,
        }
    }

    pub fn dod() -> Self {
        Self {
            method: ShredMethod::Dod522022M,
            passes: DOD_PASS_SEQUENCE.len() as u32,
            verify: false,
        }
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn validate(&self) -> Result<(), ShredError> {
        if self.method == ShredMethod::Basic && self.passes == 0 {
            return Err(ShredError::InvalidConfig(
                "basic method requires at least one pass".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of real overwrite passes. The 7-pass method ignores `passes`.
    pub fn pass_count(&self) -> u32 {
        match self.method {
            ShredMethod::Basic => self.passes,
            ShredMethod::Dod522022M => DOD_PASS_SEQUENCE.len() as u32,
        }
    }

    /// Pattern for a 1-based pass index.
    pub fn pattern_for(&self, pass: u32) -> PassPattern {
        match self.method {
            ShredMethod::Basic => match pass {
                1 => PassPattern::Fixed(0xFF),
                2 => PassPattern::Fixed(0x00),
                _ => PassPattern::Random,
            },
            ShredMethod::Dod522022M => {
                let index = (pass.max(1) as usize - 1) % DOD_PASS_SEQUENCE.len();
                DOD_PASS_SEQUENCE[index]
            }
        }
    }

    pub fn pass_plan(&self) -> Vec<PassPattern> {
        (1..=self.pass_count())
            .map(|pass| self.pattern_for(pass))
            .collect()
    }

    /// Progress weight of the whole run; a verification read counts as one more unit per pass.
    pub fn progress_units(&self) -> u32 {
        if self.verify {
            self.pass_count().saturating_mul(2)
        } else {
            self.pass_count()
        }
    }

    pub fn describe(&self) -> String {
        let method = match self.method {
            ShredMethod::Basic => format!("Basic ({}-pass)", self.pass_count()),
            ShredMethod::Dod522022M => "DoD 5220.22-M (7-pass)".to_string(),
        };
        let verify = if self.verify {
            "with verification"
        } else {
            "without verification"
        };
        format!("{method} {verify}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShredReport {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub passes: u32,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: u64,
    pub failed: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn counts(&self) -> (u64, u64) {
        (self.succeeded, self.failed)
    }
}

/// Events emitted while a single file is being shredded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileEvent {
    PassStarted {
        pass: u32,
        total_passes: u32,
        pattern: PassPattern,
    },
    Progress {
        fraction: f64,
    },
    PassWritten {
        pass: u32,
        bytes: u64,
    },
    PassVerified {
        pass: u32,
    },
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShredEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub kind: ShredEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShredEventKind {
    FileStarted {
        index: usize,
        path: String,
    },
    PassStarted {
        index: usize,
        pass: u32,
        total_passes: u32,
        pattern: PassPattern,
    },
    Progress {
        index: usize,
        path: String,
        file_fraction: f64,
        overall_fraction: f64,
    },
    PassWritten {
        index: usize,
        pass: u32,
        bytes: u64,
    },
    PassVerified {
        index: usize,
        pass: u32,
    },
    FileDone {
        index: usize,
        path: String,
        success: bool,
        error: Option<String>,
    },
    BatchDone {
        summary: BatchSummary,
    },
}

#[cfg(test)]
mod tests {
    use super::{MatchCriteria, PassPattern, ShredConfig, ShredMethod};

    #[test]
    fn basic_plan_is_ones_zeros_then_random() {
        let plan = ShredConfig::basic(5).pass_plan();
        assert_eq!(
            plan,
            vec![
                PassPattern::Fixed(0xFF),
                PassPattern::Fixed(0x00),
                PassPattern::Random,
                PassPattern::Random,
                PassPattern::Random,
            ]
        );
    }

    #[test]
    fn dod_plan_ignores_configured_pass_count() {
        let config = ShredConfig {
            method: ShredMethod::Dod522022M,
            passes: 2,
            verify: true,
        };
        assert_eq!(config.pass_count(), 7);
        assert_eq!(config.progress_units(), 14);
        assert_eq!(config.pass_plan()[2], PassPattern::Random);
        assert_eq!(config.pass_plan()[6], PassPattern::Fixed(0x00));
    }

    #[test]
    fn basic_requires_a_pass() {
        assert!(ShredConfig::basic(0).validate().is_err());
        assert!(ShredConfig::basic(1).validate().is_ok());
    }

    #[test]
    fn pattern_strings_are_split() {
        let criteria = MatchCriteria::from_pattern_strings("/tmp", "*.txt, secret*;", "");
        assert_eq!(criteria.include_patterns, vec!["*.txt", "secret*"]);
        assert!(criteria.exclude_patterns.is_empty());
    }
}
