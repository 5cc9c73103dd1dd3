use std::ffi::OsStr;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::LocateError;

/// Splits a user-supplied pattern string on `,` and `;`, trimming and dropping empty entries.
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Case-sensitive glob matcher over bare file names.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    globset: Option<GlobSet>,
    patterns: Vec<String>,
}

impl NameMatcher {
    pub fn new(patterns: &[String]) -> Result<Self, LocateError> {
        let patterns = patterns
            .iter()
            .map(|pattern| pattern.trim())
            .filter(|pattern| !pattern.is_empty())
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if patterns.is_empty() {
            return Ok(Self {
                globset: None,
                patterns,
            });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern)
                .map_err(|err| LocateError::invalid_pattern(pattern.clone(), err))?;
            builder.add(glob);
        }
        let globset = builder
            .build()
            .map_err(|err| LocateError::invalid_pattern(patterns.join(","), err))?;

        Ok(Self {
            globset: Some(globset),
            patterns,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_match(&self, file_name: &OsStr) -> bool {
        match &self.globset {
            Some(globset) => globset.is_match(Path::new(file_name)),
            None => false,
        }
    }
}
