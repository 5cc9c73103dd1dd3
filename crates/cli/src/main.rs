use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use file_shredder_core::{
    collect_doctor_info, split_patterns, BatchSummary, ContentFilter, ContentMatch,
    ContentFilterKind, ContentMatcher, FileLocator, MatchCriteria, MatchResult, ShredConfig,
    ShredEngine, ShredEventKind, ShredMethod,
};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "file-shredder",
    version,
    about = "Find files by name, metadata and content, then destroy them with multi-pass overwrite."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List files matching the criteria without touching them.
    Find(FindArgs),
    /// Overwrite and delete matching files (or an explicit file list).
    Shred(ShredArgs),
    /// Show platform capabilities and erasure limitations.
    Doctor,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliMethod {
    Basic,
    #[value(name = "dod", alias = "dod-5220-22-m")]
    Dod,
}

impl From<CliMethod> for ShredMethod {
    fn from(value: CliMethod) -> Self {
        match value {
            CliMethod::Basic => ShredMethod::Basic,
            CliMethod::Dod => ShredMethod::Dod522022M,
        }
    }
}

#[derive(Debug, Args)]
struct CriteriaArgs {
    /// Directory to search.
    #[arg(long, value_name = "DIR", default_value = ".")]
    dir: PathBuf,

    /// Name globs to include; comma/semicolon separated or repeated (e.g. "*.txt, secret*").
    #[arg(long = "pattern", value_name = "GLOB", action = ArgAction::Append)]
    patterns: Vec<String>,

    /// Name globs to exclude.
    #[arg(long = "exclude", value_name = "GLOB", action = ArgAction::Append)]
    excludes: Vec<String>,

    /// Descend into subdirectories.
    #[arg(long, short = 'r')]
    recursive: bool,

    /// Follow symbolic links (cycles are detected and skipped).
    #[arg(long)]
    follow_links: bool,

    /// Regex the owning user name must match.
    #[arg(long, value_name = "REGEX")]
    owner: Option<String>,

    /// Only files created on/after this date (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_name = "DATE", value_parser = parse_date_bound)]
    created_after: Option<DateTime<Utc>>,

    /// Only files created before this date (midnight at its start for YYYY-MM-DD).
    #[arg(long, value_name = "DATE", value_parser = parse_date_bound)]
    created_before: Option<DateTime<Utc>>,

    /// Only files modified on/after this date.
    #[arg(long, value_name = "DATE", value_parser = parse_date_bound)]
    modified_after: Option<DateTime<Utc>>,

    /// Only files modified before this date (midnight at its start for YYYY-MM-DD).
    #[arg(long, value_name = "DATE", value_parser = parse_date_bound)]
    modified_before: Option<DateTime<Utc>>,

    /// Include only files whose text contains this literal.
    #[arg(long, value_name = "TEXT")]
    content: Option<String>,

    /// Minimum occurrences for --content.
    #[arg(long, default_value_t = 1, value_name = "N")]
    content_min: usize,

    /// Exclude files whose text contains this literal.
    #[arg(long, value_name = "TEXT")]
    exclude_content: Option<String>,

    /// Minimum occurrences for --exclude-content.
    #[arg(long, default_value_t = 1, value_name = "N")]
    exclude_content_min: usize,

    /// Run OCR on images for content filters (requires tesseract).
    #[arg(long)]
    ocr: bool,
}

impl CriteriaArgs {
    fn into_criteria(self) -> MatchCriteria {
        MatchCriteria {
            root: self.dir,
            recursive: self.recursive,
            follow_links: self.follow_links,
            include_patterns: flatten_patterns(&self.patterns),
            exclude_patterns: flatten_patterns(&self.excludes),
            owner_pattern: self.owner,
            created_after: self.created_after,
            created_before: self.created_before,
            modified_after: self.modified_after,
            modified_before: self.modified_before,
            content_include: self
                .content
                .map(|pattern| ContentFilter::new(pattern, self.content_min)),
            content_exclude: self
                .exclude_content
                .map(|pattern| ContentFilter::new(pattern, self.exclude_content_min)),
            ocr_enabled: self.ocr,
        }
    }
}

#[derive(Debug, Args)]
struct FindArgs {
    #[command(flatten)]
    criteria: CriteriaArgs,

    /// Also list excluded files with the reason.
    #[arg(long)]
    show_excluded: bool,

    /// Write the match result as JSON.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ShredArgs {
    /// Shred these files instead of searching.
    #[arg(long = "file", value_name = "PATH", num_args = 1.., action = ArgAction::Append, conflicts_with = "patterns")]
    files: Vec<PathBuf>,

    #[command(flatten)]
    criteria: CriteriaArgs,

    /// Overwrite method.
    #[arg(long, default_value = "basic")]
    method: CliMethod,

    /// Pass count for the basic method (the dod method always runs 7).
    #[arg(long, default_value_t = 3, value_name = "N")]
    passes: u32,

    /// Skip the read-back verification of each pass.
    #[arg(long)]
    no_verify: bool,

    /// Confirm irreversible deletion.
    #[arg(long)]
    yes: bool,

    /// Only list what would be shredded.
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON report of the run.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ShredRunReport {
    config: ShredConfig,
    located: Option<MatchResult>,
    summary: BatchSummary,
    failures: Vec<FailedFile>,
}

#[derive(Debug, Serialize)]
struct FailedFile {
    path: String,
    error: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Find(args) => run_find_command(args),
        Commands::Shred(args) => run_shred_command(args),
        Commands::Doctor => {
            run_doctor_command();
            Ok(())
        }
    }
}

fn run_find_command(args: FindArgs) -> Result<()> {
    let result = locate_files(args.criteria)?;

    for file in &result.files {
        println!(
            "{}  ({}){}",
            file.path.display(),
            human_bytes(file.size_bytes),
            describe_content_match(file.content_match.as_ref())
        );
    }
    if args.show_excluded {
        for excluded in &result.excluded {
            println!("excluded: {}  {:?}", excluded.path.display(), excluded.reason);
        }
    }
    println!(
        "Found {} file(s), {} total; excluded {}.",
        result.files.len(),
        human_bytes(result.total_bytes()),
        result.excluded_count
    );

    if let Some(output) = args.output {
        write_json(&output, &result)?;
        println!("Match result written to {}", output.display());
    }
    Ok(())
}

fn run_shred_command(args: ShredArgs) -> Result<()> {
    let config = ShredConfig {
        method: args.method.into(),
        passes: args.passes,
        verify: !args.no_verify,
    };
    config
        .validate()
        .context("invalid shredding configuration")?;

    let (paths, located) = if !args.files.is_empty() {
        (args.files, None)
    } else {
        if args.criteria.patterns.is_empty() {
            anyhow::bail!("either --file or --pattern is required");
        }
        let result = locate_files(args.criteria)?;
        (result.paths(), Some(result))
    };

    if paths.is_empty() {
        println!("No files to shred.");
        return Ok(());
    }

    println!("Method: {}", config.describe());
    if args.dry_run || !args.yes {
        for path in &paths {
            println!("would shred: {}", path.display());
        }
        if !args.yes && !args.dry_run {
            println!(
                "{} file(s) selected. Re-run with --yes to destroy them; this cannot be undone.",
                paths.len()
            );
        }
        return Ok(());
    }

    let engine = ShredEngine::new(config.clone());
    let mut failures = Vec::new();
    let summary = engine.shred_batch_with_callback(&paths, |event| match event.kind {
        ShredEventKind::Progress {
            path,
            overall_fraction,
            ..
        } => debug!("{:5.1}% {}", overall_fraction * 100.0, path),
        ShredEventKind::FileDone {
            path,
            success,
            error,
            ..
        } => {
            if success {
                println!("[shredded] {path}");
            } else {
                println!("[failed]   {path}");
                failures.push(FailedFile { path, error });
            }
        }
        _ => {}
    });

    println!(
        "Shredding complete. Successfully shredded: {}, failed: {}{}",
        summary.succeeded,
        summary.failed,
        if summary.cancelled { " (cancelled)" } else { "" }
    );

    if let Some(output) = &args.output {
        let report = ShredRunReport {
            config,
            located,
            summary,
            failures,
        };
        write_json(output, &report)?;
        println!("Run report written to {}", output.display());
    }

    if summary.failed > 0 {
        anyhow::bail!("{} file(s) could not be shredded", summary.failed);
    }
    Ok(())
}

fn run_doctor_command() {
    let info = collect_doctor_info();
    println!("OS: {} ({})", info.os, info.arch);
    if let Some(current_dir) = info.current_dir {
        println!("Current directory: {}", current_dir);
    }
    println!(
        "PDF extraction: {}",
        info.pdf_backend.as_deref().unwrap_or("unavailable")
    );
    println!(
        "OCR extraction: {}",
        info.ocr_backend.as_deref().unwrap_or("unavailable")
    );
    println!("Owner lookup supported: {}", info.owner_lookup_supported);
    println!("Overwrite chunk size: {}", human_bytes(info.chunk_size_bytes));
    for note in info.notes {
        println!("Note: {}", note);
    }
}

fn locate_files(args: CriteriaArgs) -> Result<MatchResult> {
    let criteria = args.into_criteria();
    let content = if criteria.content_include.is_some() || criteria.content_exclude.is_some() {
        ContentMatcher::from_system()
    } else {
        ContentMatcher::new()
    };
    if criteria.ocr_enabled && !content.ocr_available() {
        tracing::warn!("--ocr requested but tesseract is not available; images will not match");
    }

    FileLocator::new(content)
        .locate(&criteria)
        .with_context(|| format!("failed to search {}", criteria.root.display()))
}

fn flatten_patterns(values: &[String]) -> Vec<String> {
    values.iter().flat_map(|value| split_patterns(value)).collect()
}

fn describe_content_match(content_match: Option<&ContentMatch>) -> String {
    match content_match {
        Some(found) => {
            let label = match found.filter {
                ContentFilterKind::Include => "contains",
                ContentFilterKind::Exclude => "mentions",
            };
            format!(
                "  [{label} '{}' x{}]",
                found.pattern, found.occurrences
            )
        }
        None => String::new(),
    }
}

fn parse_date_bound(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("invalid date: {value}"))?;
        return Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| format!("date does not exist in local time: {value}"));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| "date must be YYYY-MM-DD or RFC 3339".to_string())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    fs::write(path, payload).with_context(|| format!("failed to write {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn human_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if value == 0 {
        return "0 B".to_string();
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}
