use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::content::{ContentMatcher, FileKind};
use crate::error::LocateError;
use crate::model::{
    ContentFilter, ContentFilterKind, ContentMatch, ExcludedFile, ExclusionReason, MatchCriteria,
    MatchResult, MatchedFile,
};
use crate::owner::OwnerLookup;
use crate::patterns::NameMatcher;

/// Walks a directory and selects the files a [`MatchCriteria`] describes.
#[derive(Debug, Default)]
pub struct FileLocator {
    content: ContentMatcher,
    cancel_flag: Option<Arc<AtomicBool>>,
}

/// Compiled form of a [`MatchCriteria`], built once per run.
struct CompiledCriteria<'a> {
    criteria: &'a MatchCriteria,
    include: NameMatcher,
    exclude: NameMatcher,
    owner: Option<(Regex, OwnerLookup)>,
    content_include: Option<&'a ContentFilter>,
    content_exclude: Option<&'a ContentFilter>,
}

enum Verdict {
    Matched(MatchedFile),
    Excluded(ExclusionReason),
}

impl FileLocator {
    pub fn new(content: ContentMatcher) -> Self {
        Self {
            content,
            cancel_flag: None,
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn content_matcher(&self) -> &ContentMatcher {
        &self.content
    }

    pub fn locate(&self, criteria: &MatchCriteria) -> Result<MatchResult, LocateError> {
        let compiled = compile(criteria)?;
        let root = resolve_root(&criteria.root)?;

        let mut walker = WalkDir::new(&root)
            .follow_links(criteria.follow_links)
            .min_depth(1)
            .sort_by_file_name();
        if !criteria.recursive {
            walker = walker.max_depth(1);
        }

        let mut result = MatchResult {
            root: root.clone(),
            ..MatchResult::default()
        };
        let mut seen = HashSet::new();

        for item in walker {
            if self.is_cancelled() {
                return Err(LocateError::Cancelled);
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    if let Some(ancestor) = err.loop_ancestor() {
                        let at = err
                            .path()
                            .map(|path| path.display().to_string())
                            .unwrap_or_default();
                        warn!(
                            "symlink loop skipped at {} (points back to {})",
                            at,
                            ancestor.display()
                        );
                    } else {
                        warn!("walk error under {}: {}", root.display(), err);
                    }
                    continue;
                }
            };

            // Links are only file candidates when followed, in which case file_type is the target's.
            if !entry.file_type().is_file() {
                continue;
            }
            if !compiled.include.is_match(entry.file_name()) {
                continue;
            }

            // Followed links are reported by target path, each target once.
            let resolved;
            let path = if criteria.follow_links {
                resolved = match fs::canonicalize(entry.path()) {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        warn!("cannot resolve {}: {}", entry.path().display(), err);
                        continue;
                    }
                };
                if !seen.insert(resolved.clone()) {
                    debug!("{} already listed", resolved.display());
                    continue;
                }
                resolved.as_path()
            } else {
                entry.path()
            };

            match self.evaluate(path, entry.file_name(), &compiled) {
                Verdict::Matched(file) => result.files.push(file),
                Verdict::Excluded(reason) => {
                    debug!("excluded {}: {:?}", path.display(), reason);
                    result.excluded.push(ExcludedFile {
                        path: path.to_path_buf(),
                        reason,
                    });
                }
            }
        }

        result.excluded_count = result.excluded.len() as u64;

        let mut message = format!(
            "found {} file(s) matching '{}' under {}",
            result.files.len(),
            criteria.include_patterns.join(","),
            root.display()
        );
        if result.excluded_count > 0 {
            message.push_str(&format!(" (excluded {})", result.excluded_count));
        }
        info!("{message}");

        Ok(result)
    }

    /// Ordered checks; the cheapest run first and the first exclusion wins.
    /// `name` is the name the entry was found under, which for a followed link
    /// differs from the last component of `path`.
    fn evaluate(&self, path: &Path, name: &OsStr, compiled: &CompiledCriteria<'_>) -> Verdict {
        let criteria = compiled.criteria;

        if compiled.exclude.is_match(name) {
            return Verdict::Excluded(ExclusionReason::NamePattern);
        }

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => return Verdict::Excluded(unreadable("metadata", err)),
        };

        if criteria.created_after.is_some() || criteria.created_before.is_some() {
            match metadata.created() {
                Ok(created) => {
                    if !within(created, criteria.created_after, criteria.created_before) {
                        return Verdict::Excluded(ExclusionReason::CreatedOutOfRange);
                    }
                }
                Err(err) => return Verdict::Excluded(unreadable("creation time", err)),
            }
        }

        if criteria.modified_after.is_some() || criteria.modified_before.is_some() {
            match metadata.modified() {
                Ok(modified) => {
                    if !within(modified, criteria.modified_after, criteria.modified_before) {
                        return Verdict::Excluded(ExclusionReason::ModifiedOutOfRange);
                    }
                }
                Err(err) => return Verdict::Excluded(unreadable("modification time", err)),
            }
        }

        if let Some(reason) = owner_exclusion(compiled, &metadata) {
            return Verdict::Excluded(reason);
        }

        let kind = match FileKind::from_path(path) {
            FileKind::Image if !criteria.ocr_enabled => FileKind::Other,
            kind => kind,
        };
        let mut content_match = None;

        if let Some(filter) = compiled.content_include {
            let count = self.content.count_occurrences(path, filter, kind);
            if count.unreadable {
                return Verdict::Excluded(ExclusionReason::Unreadable {
                    message: "content could not be read".to_string(),
                });
            }
            if !count.matched {
                return Verdict::Excluded(ExclusionReason::ContentMissing {
                    pattern: filter.pattern.clone(),
                    occurrences: count.occurrences,
                });
            }
            content_match = Some(ContentMatch {
                filter: ContentFilterKind::Include,
                pattern: filter.pattern.clone(),
                occurrences: count.occurrences,
            });
        }

        if let Some(filter) = compiled.content_exclude {
            let count = self.content.count_occurrences(path, filter, kind);
            if count.unreadable {
                return Verdict::Excluded(ExclusionReason::Unreadable {
                    message: "content could not be read".to_string(),
                });
            }
            if count.matched {
                return Verdict::Excluded(ExclusionReason::ContentPresent {
                    pattern: filter.pattern.clone(),
                    occurrences: count.occurrences,
                });
            }
            if content_match.is_none() && count.occurrences > 0 {
                content_match = Some(ContentMatch {
                    filter: ContentFilterKind::Exclude,
                    pattern: filter.pattern.clone(),
                    occurrences: count.occurrences,
                });
            }
        }

        Verdict::Matched(MatchedFile {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            content_match,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Locates with plain-text content matching only.
pub fn locate(criteria: &MatchCriteria) -> Result<MatchResult, LocateError> {
    FileLocator::default().locate(criteria)
}

fn compile(criteria: &MatchCriteria) -> Result<CompiledCriteria<'_>, LocateError> {
    let include = NameMatcher::new(&criteria.include_patterns)?;
    if include.is_empty() {
        return Err(LocateError::invalid_pattern(
            "",
            "at least one include pattern is required",
        ));
    }
    let exclude = NameMatcher::new(&criteria.exclude_patterns)?;

    let owner = match criteria
        .owner_pattern
        .as_deref()
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
    {
        Some(pattern) => {
            let regex =
                Regex::new(pattern).map_err(|err| LocateError::invalid_pattern(pattern, err))?;
            if !OwnerLookup::is_supported() {
                warn!("owner filtering is not supported on this platform; owner pattern ignored");
            }
            Some((regex, OwnerLookup::load()))
        }
        None => None,
    };

    Ok(CompiledCriteria {
        criteria,
        include,
        exclude,
        owner,
        content_include: active_filter(criteria.content_include.as_ref()),
        content_exclude: active_filter(criteria.content_exclude.as_ref()),
    })
}

fn active_filter(filter: Option<&ContentFilter>) -> Option<&ContentFilter> {
    filter.filter(|filter| !filter.pattern.is_empty())
}

fn resolve_root(root: &Path) -> Result<PathBuf, LocateError> {
    let resolved = fs::canonicalize(root).map_err(|err| LocateError::discovery(root, err))?;
    let metadata = fs::metadata(&resolved).map_err(|err| LocateError::discovery(root, err))?;
    if !metadata.is_dir() {
        return Err(LocateError::discovery(root, "not a directory"));
    }
    fs::read_dir(&resolved).map_err(|err| LocateError::discovery(root, err))?;
    Ok(resolved)
}

fn owner_exclusion(compiled: &CompiledCriteria<'_>, metadata: &Metadata) -> Option<ExclusionReason> {
    let (regex, lookup) = compiled.owner.as_ref()?;
    let owner = lookup.owner_of(metadata)?;
    if regex.is_match(&owner) {
        None
    } else {
        Some(ExclusionReason::Owner { owner })
    }
}

fn within(time: SystemTime, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> bool {
    let time = DateTime::<Utc>::from(time);
    if after.is_some_and(|after| time < after) {
        return false;
    }
    if before.is_some_and(|before| time > before) {
        return false;
    }
    true
}

fn unreadable(what: &str, err: std::io::Error) -> ExclusionReason {
    ExclusionReason::Unreadable {
        message: format!("{what} unavailable: {err}"),
    }
}
