use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{PassError, ShredError};
use crate::model::{
    BatchSummary, FileEvent, PassPattern, ShredConfig, ShredEvent, ShredEventKind, ShredReport,
};
use crate::overwrite::{verify_pass, write_pass};

/// States of a single-file shred. Terminal outcomes are the `Result` of
/// [`ShredEngine::shred_file_with_events`]: `Ok` after deletion, `Err` for
/// a missing file or any failed write, sync, verification or delete.
enum ShredState {
    Inspecting,
    Overwriting { pass: u32 },
    Verifying { pass: u32, pattern: PassPattern, file: File },
    Deleting,
}

#[derive(Debug, Clone, Default)]
pub struct ShredEngine {
    config: ShredConfig,
    cancel_flag: Option<Arc<AtomicBool>>,
}

pub struct ShredRunOutput {
    pub summary: BatchSummary,
    pub events: Vec<ShredEvent>,
}

impl ShredEngine {
    pub fn new(config: ShredConfig) -> Self {
        Self {
            config,
            cancel_flag: None,
        }
    }

    /// Cancellation is checked between files, never inside a file's pass sequence.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn config(&self) -> &ShredConfig {
        &self.config
    }

    /// Shreds one file, reporting a non-decreasing fraction in [0, 1]. Never fails loudly.
    pub fn shred<F>(&self, path: &Path, mut on_progress: F) -> bool
    where
        F: FnMut(f64),
    {
        let result = self.shred_file_with_events(path, |event| {
            if let FileEvent::Progress { fraction } = event {
                on_progress(fraction);
            }
        });
        match result {
            Ok(_) => true,
            Err(err) => {
                warn!("error shredding file: {err}");
                false
            }
        }
    }

    pub fn shred_file(&self, path: &Path) -> Result<ShredReport, ShredError> {
        self.shred_file_with_events(path, |_| {})
    }

    pub fn shred_file_with_events<F>(
        &self,
        path: &Path,
        on_event: F,
    ) -> Result<ShredReport, ShredError>
    where
        F: FnMut(FileEvent),
    {
        self.run_file(path, on_event, |file, pattern, size, on_chunk| {
            verify_pass(file, pattern, size, on_chunk)
        })
    }

    /// The per-file state machine with the read-back step supplied by the caller.
    fn run_file<F, V>(
        &self,
        path: &Path,
        mut on_event: F,
        mut verifier: V,
    ) -> Result<ShredReport, ShredError>
    where
        F: FnMut(FileEvent),
        V: FnMut(&mut File, PassPattern, u64, &mut dyn FnMut(u64)) -> Result<(), PassError>,
    {
        self.config.validate()?;

        let total_passes = self.config.pass_count();
        let verify = self.config.verify;
        let units = f64::from(self.config.progress_units());
        let weight = if verify { 2 } else { 1 };
        let mut reporter = FileReporter::new(&mut on_event);
        let mut size = 0_u64;
        let mut state = ShredState::Inspecting;

        loop {
            state = match state {
                ShredState::Inspecting => {
                    let metadata = fs::symlink_metadata(path).map_err(|err| {
                        if err.kind() == io::ErrorKind::NotFound {
                            ShredError::NotFound(path.to_path_buf())
                        } else {
                            access_error(path, "inspect", err)
                        }
                    })?;
                    if !metadata.file_type().is_file() {
                        return Err(ShredError::NotRegularFile(path.to_path_buf()));
                    }
                    size = metadata.len();
                    if size == 0 {
                        debug!("{} is empty; deleting without overwrite", path.display());
                        ShredState::Deleting
                    } else {
                        ShredState::Overwriting { pass: 1 }
                    }
                }
                ShredState::Overwriting { pass } => {
                    let pattern = self.config.pattern_for(pass);
                    reporter.event(FileEvent::PassStarted {
                        pass,
                        total_passes,
                        pattern,
                    });

                    let mut file = OpenOptions::new()
                        .read(true)
                        .write(true)
                        .open(path)
                        .map_err(|err| access_error(path, "open", err))?;
                    let base = f64::from((pass - 1) * weight);
                    write_pass(&mut file, pattern_byte(pattern), size, |written| {
                        reporter.progress((base + written as f64 / size as f64) / units);
                    })
                    .map_err(|err| pass_error(path, pass, "overwrite", err))?;

                    reporter.event(FileEvent::PassWritten { pass, bytes: size });
                    debug!(
                        "completed pass {}/{} ({:?}) for {}",
                        pass,
                        total_passes,
                        pattern,
                        path.display()
                    );

                    if verify {
                        ShredState::Verifying {
                            pass,
                            pattern,
                            file,
                        }
                    } else {
                        next_state(pass, total_passes)
                    }
                }
                ShredState::Verifying {
                    pass,
                    pattern,
                    mut file,
                } => {
                    let base = f64::from((pass - 1) * weight + 1);
                    let mut on_chunk = |verified: u64| {
                        reporter.progress((base + verified as f64 / size as f64) / units);
                    };
                    verifier(&mut file, pattern, size, &mut on_chunk)
                        .map_err(|err| pass_error(path, pass, "verify", err))?;

                    reporter.event(FileEvent::PassVerified { pass });
                    next_state(pass, total_passes)
                }
                ShredState::Deleting => {
                    fs::remove_file(path).map_err(|err| access_error(path, "delete", err))?;
                    reporter.event(FileEvent::Deleted);
                    reporter.progress(1.0);
                    info!("shredded {}", path.display());

                    return Ok(ShredReport {
                        path: path.to_path_buf(),
                        size_bytes: size,
                        passes: if size == 0 { 0 } else { total_passes },
                        verified: verify && size > 0,
                    });
                }
            };
        }
    }

    /// Shreds `paths` in order with the caller-facing callback pair.
    /// Returns the aggregate; per-file failures never stop the batch.
    pub fn shred_batch<P, F, D>(
        &self,
        paths: &[P],
        mut on_progress: F,
        mut on_file_done: D,
    ) -> BatchSummary
    where
        P: AsRef<Path>,
        F: FnMut(f64, &Path),
        D: FnMut(&Path, bool),
    {
        self.shred_batch_with_callback(paths, |event| match event.kind {
            ShredEventKind::Progress {
                index,
                overall_fraction,
                ..
            } => on_progress(overall_fraction, paths[index].as_ref()),
            ShredEventKind::FileDone { index, success, .. } => {
                on_file_done(paths[index].as_ref(), success)
            }
            _ => {}
        })
    }

    pub fn shred_batch_with_events<P>(&self, paths: &[P]) -> ShredRunOutput
    where
        P: AsRef<Path>,
    {
        let mut events = Vec::new();
        let summary = self.shred_batch_with_callback(paths, |event| events.push(event));
        ShredRunOutput { summary, events }
    }

    pub fn shred_batch_with_callback<P, F>(&self, paths: &[P], mut on_event: F) -> BatchSummary
    where
        P: AsRef<Path>,
        F: FnMut(ShredEvent),
    {
        let mut state = BatchState::new(paths.len());
        let mut cancelled = false;

        for (index, path) in paths.iter().enumerate() {
            if self.is_cancelled() {
                warn!(
                    "shredding canceled by caller; {} file(s) not processed",
                    paths.len() - index
                );
                cancelled = true;
                break;
            }

            let path = path.as_ref();
            state = apply(
                &state,
                BatchStep::Begin {
                    index,
                    path: path.to_string_lossy().to_string(),
                },
                &mut on_event,
            );

            let result = self.shred_file_with_events(path, |event| {
                state = apply(&state, BatchStep::File(event), &mut on_event);
            });

            let finish = match result {
                Ok(_) => BatchStep::Finish {
                    success: true,
                    error: None,
                },
                Err(err) => {
                    warn!("error shredding file {}: {}", path.display(), err);
                    BatchStep::Finish {
                        success: false,
                        error: Some(err.to_string()),
                    }
                }
            };
            state = apply(&state, finish, &mut on_event);
        }

        state = apply(&state, BatchStep::Complete { cancelled }, &mut on_event);
        let summary = state.summary();
        info!(
            "shredding complete. success: {}, failed: {}",
            summary.succeeded, summary.failed
        );
        summary
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Input to [`BatchState::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStep {
    Begin { index: usize, path: String },
    File(FileEvent),
    Finish { success: bool, error: Option<String> },
    Complete { cancelled: bool },
}

/// Batch bookkeeping as a value: each step yields the next state and the events to publish.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchState {
    pub total_files: usize,
    pub current_index: usize,
    pub current_path: String,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: bool,
    pub seq: u64,
}

impl BatchState {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            ..Self::default()
        }
    }

    pub fn completed_files(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// (completed files + current file fraction) / total files.
    pub fn overall_fraction(&self, file_fraction: f64) -> f64 {
        if self.total_files == 0 {
            return 1.0;
        }
        ((self.completed_files() as f64 + file_fraction) / self.total_files as f64).min(1.0)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: (self.total_files as u64).saturating_sub(self.completed_files()),
            cancelled: self.cancelled,
        }
    }

    pub fn advance(&self, step: BatchStep) -> (BatchState, Vec<ShredEvent>) {
        let mut next = self.clone();
        let index = self.current_index;
        let kinds = match step {
            BatchStep::Begin { index, path } => {
                next.current_index = index;
                next.current_path = path.clone();
                vec![ShredEventKind::FileStarted { index, path }]
            }
            BatchStep::File(event) => match event {
                FileEvent::PassStarted {
                    pass,
                    total_passes,
                    pattern,
                } => vec![ShredEventKind::PassStarted {
                    index,
                    pass,
                    total_passes,
                    pattern,
                }],
                FileEvent::Progress { fraction } => vec![ShredEventKind::Progress {
                    index,
                    path: self.current_path.clone(),
                    file_fraction: fraction,
                    overall_fraction: self.overall_fraction(fraction),
                }],
                FileEvent::PassWritten { pass, bytes } => {
                    vec![ShredEventKind::PassWritten { index, pass, bytes }]
                }
                FileEvent::PassVerified { pass } => {
                    vec![ShredEventKind::PassVerified { index, pass }]
                }
                FileEvent::Deleted => Vec::new(),
            },
            BatchStep::Finish { success, error } => {
                if success {
                    next.succeeded += 1;
                } else {
                    next.failed += 1;
                }
                vec![ShredEventKind::FileDone {
                    index,
                    path: self.current_path.clone(),
                    success,
                    error,
                }]
            }
            BatchStep::Complete { cancelled } => {
                next.cancelled = cancelled;
                vec![ShredEventKind::BatchDone {
                    summary: next.summary(),
                }]
            }
        };

        let events = kinds
            .into_iter()
            .map(|kind| {
                next.seq += 1;
                ShredEvent {
                    seq: next.seq,
                    kind,
                }
            })
            .collect();
        (next, events)
    }
}

fn apply<F>(state: &BatchState, step: BatchStep, on_event: &mut F) -> BatchState
where
    F: FnMut(ShredEvent),
{
    let (next, events) = state.advance(step);
    for event in events {
        on_event(event);
    }
    next
}

struct FileReporter<'a> {
    on_event: &'a mut dyn FnMut(FileEvent),
    last_fraction: f64,
}

impl<'a> FileReporter<'a> {
    fn new(on_event: &'a mut dyn FnMut(FileEvent)) -> Self {
        Self {
            on_event,
            last_fraction: 0.0,
        }
    }

    fn event(&mut self, event: FileEvent) {
        (self.on_event)(event);
    }

    fn progress(&mut self, fraction: f64) {
        let fraction = fraction.clamp(self.last_fraction, 1.0);
        self.last_fraction = fraction;
        (self.on_event)(FileEvent::Progress { fraction });
    }
}

fn next_state(pass: u32, total_passes: u32) -> ShredState {
    if pass < total_passes {
        ShredState::Overwriting { pass: pass + 1 }
    } else {
        ShredState::Deleting
    }
}

/// Random passes draw from 0x01..=0xFE, not the full byte range. The random-pass
/// check rejects a chunk that is uniformly 0x00 or 0xFF, so a full-range draw would
/// fail a correctly written pass with probability 2/256.
fn pattern_byte(pattern: PassPattern) -> u8 {
    match pattern {
        PassPattern::Fixed(byte) => byte,
        PassPattern::Random => rand::thread_rng().gen_range(0x01..=0xFE),
    }
}

fn access_error(path: &Path, action: &'static str, source: io::Error) -> ShredError {
    ShredError::FileAccess {
        path: path.to_path_buf(),
        action,
        source,
    }
}

fn pass_error(path: &Path, pass: u32, action: &'static str, err: PassError) -> ShredError {
    match err {
        PassError::Io(source) => access_error(path, action, source),
        PassError::Mismatch(mismatch) => ShredError::Verification {
            path: path.to_path_buf(),
            pass,
            mismatch,
        },
    }
}
