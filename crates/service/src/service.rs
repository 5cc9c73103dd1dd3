use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use file_shredder_core::{
    collect_doctor_info, BatchSummary, ContentMatcher, DoctorInfo, FileLocator, LocateError,
    MatchCriteria, MatchResult, ShredConfig, ShredEngine, ShredEvent, ShredEventKind,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShredRequest {
    #[serde(default)]
    pub shred_id: Option<String>,
    /// Search criteria; ignored when `files` is non-empty.
    #[serde(default)]
    pub criteria: Option<MatchCriteria>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub config: ShredConfig,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default = "default_system_extractors")]
    pub use_system_extractors: bool,
    /// When false, no `Progress` events are buffered; pass, file and batch events still are.
    #[serde(default = "default_emit_progress_events")]
    pub emit_progress_events: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

fn default_system_extractors() -> bool {
    true
}

fn default_emit_progress_events() -> bool {
    true
}

fn default_progress_interval() -> u64 {
    250
}

impl Default for ShredRequest {
    fn default() -> Self {
        Self {
            shred_id: None,
            criteria: None,
            files: Vec::new(),
            config: ShredConfig::default(),
            output: None,
            use_system_extractors: default_system_extractors(),
            emit_progress_events: default_emit_progress_events(),
            progress_interval_ms: default_progress_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShredSessionStatus {
    Locating,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ShredSessionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShredSessionSnapshot {
    pub shred_id: String,
    pub status: ShredSessionStatus,
    pub located: Option<MatchResult>,
    pub summary: Option<BatchSummary>,
    pub error: Option<String>,
    pub total_events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelShredResponse {
    pub shred_id: String,
    pub status: ShredSessionStatus,
}

#[derive(Debug, Serialize)]
struct ShredRunRecord<'a> {
    shred_id: &'a str,
    config: &'a ShredConfig,
    located: Option<&'a MatchResult>,
    summary: BatchSummary,
    events: &'a [ShredEvent],
}

#[derive(Debug, Clone)]
struct ShredSession {
    status: ShredSessionStatus,
    located: Option<MatchResult>,
    summary: Option<BatchSummary>,
    error: Option<String>,
    events: Vec<ShredEvent>,
    cancel_flag: Arc<AtomicBool>,
}

static SESSIONS: Lazy<Mutex<HashMap<String, ShredSession>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Runs the locate step synchronously and returns what a shred would touch.
pub fn find_files(criteria: &MatchCriteria) -> Result<MatchResult> {
    FileLocator::new(ContentMatcher::from_system())
        .locate(criteria)
        .with_context(|| format!("failed to search {}", criteria.root.display()))
}

/// Starts a background shred run and returns its session id.
///
/// The configuration is validated up front so a bad request never creates a
/// session. Progress is collected as [`ShredEvent`]s for [`poll_shred_events`].
pub fn start_shred(request: ShredRequest) -> Result<String> {
    request
        .config
        .validate()
        .context("invalid shredding configuration")?;
    if request.progress_interval_ms == 0 {
        return Err(anyhow!("progress_interval_ms must be greater than zero"));
    }
    if request.files.is_empty() && request.criteria.is_none() {
        return Err(anyhow!("a shred request needs either files or criteria"));
    }

    let shred_id = request
        .shred_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let cancel_flag = Arc::new(AtomicBool::new(false));

    {
        let mut sessions = lock_sessions()?;
        if sessions
            .get(&shred_id)
            .is_some_and(|session| !session.status.is_finished())
        {
            return Err(anyhow!("shred session already running: {shred_id}"));
        }
        sessions.insert(
            shred_id.clone(),
            ShredSession {
                status: ShredSessionStatus::Locating,
                located: None,
                summary: None,
                error: None,
                events: Vec::new(),
                cancel_flag: Arc::clone(&cancel_flag),
            },
        );
    }

    let thread_shred_id = shred_id.clone();
    thread::spawn(move || run_session(&thread_shred_id, request, cancel_flag));

    Ok(shred_id)
}

fn run_session(shred_id: &str, request: ShredRequest, cancel_flag: Arc<AtomicBool>) {
    let (paths, located) = if request.files.is_empty() {
        let Some(criteria) = &request.criteria else {
            return;
        };
        let content = if request.use_system_extractors {
            ContentMatcher::from_system()
        } else {
            ContentMatcher::new()
        };
        let locator = FileLocator::new(content).with_cancel_flag(Arc::clone(&cancel_flag));
        match locator.locate(criteria) {
            Ok(result) => (result.paths(), Some(result)),
            Err(LocateError::Cancelled) => {
                update_session(shred_id, |session| {
                    session.status = ShredSessionStatus::Cancelled;
                });
                return;
            }
            Err(err) => {
                update_session(shred_id, |session| {
                    session.status = ShredSessionStatus::Failed;
                    session.error = Some(err.to_string());
                });
                return;
            }
        }
    } else {
        (request.files.clone(), None)
    };

    info!(shred_id, files = paths.len(), "shred session started");
    update_session(shred_id, |session| {
        session.status = ShredSessionStatus::Running;
        session.located = located;
    });

    let engine = ShredEngine::new(request.config.clone()).with_cancel_flag(cancel_flag);
    let mut throttle =
        ProgressThrottle::new(request.emit_progress_events, request.progress_interval_ms);
    let summary = engine.shred_batch_with_callback(&paths, |event| {
        if throttle.admit(&event, Instant::now()) {
            update_session(shred_id, |session| session.events.push(event));
        }
    });

    if let Some(path) = &request.output {
        let write_result = lock_sessions().and_then(|sessions| {
            let session = sessions
                .get(shred_id)
                .ok_or_else(|| anyhow!("shred session not found: {shred_id}"))?;
            let record = ShredRunRecord {
                shred_id,
                config: &request.config,
                located: session.located.as_ref(),
                summary,
                events: &session.events,
            };
            serde_json::to_string_pretty(&record).context("failed to serialize run record")
        });
        let write_result = write_result.and_then(|payload| {
            fs::write(path, payload)
                .with_context(|| format!("failed to write run record to {}", path.display()))
        });
        if let Err(err) = write_result {
            warn!("{err:#}");
            update_session(shred_id, |session| {
                session.status = ShredSessionStatus::Failed;
                session.summary = Some(summary);
                session.error = Some(err.to_string());
            });
            return;
        }
    }

    update_session(shred_id, |session| {
        session.summary = Some(summary);
        session.status = if summary.cancelled {
            ShredSessionStatus::Cancelled
        } else {
            ShredSessionStatus::Completed
        };
    });
}

/// Buffers at most one `Progress` event per interval. Every other event is kept.
struct ProgressThrottle {
    enabled: bool,
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            enabled,
            interval: Duration::from_millis(interval_ms),
            last: None,
        }
    }

    fn admit(&mut self, event: &ShredEvent, now: Instant) -> bool {
        if !matches!(event.kind, ShredEventKind::Progress { .. }) {
            return true;
        }
        if !self.enabled {
            return false;
        }
        let due = self
            .last
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}

pub fn poll_shred_events(shred_id: &str, from_seq: u64) -> Result<Vec<ShredEvent>> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(shred_id)
        .ok_or_else(|| anyhow!("shred session not found: {shred_id}"))?;

    Ok(session
        .events
        .iter()
        .filter(|event| event.seq > from_seq)
        .cloned()
        .collect())
}

/// Requests cancellation. The file currently being shredded is finished first.
pub fn cancel_shred(shred_id: &str) -> Result<CancelShredResponse> {
    let mut sessions = lock_sessions()?;
    let session = sessions
        .get_mut(shred_id)
        .ok_or_else(|| anyhow!("shred session not found: {shred_id}"))?;

    session.cancel_flag.store(true, Ordering::Relaxed);

    Ok(CancelShredResponse {
        shred_id: shred_id.to_string(),
        status: session.status.clone(),
    })
}

pub fn get_shred_session(shred_id: &str) -> Result<ShredSessionSnapshot> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(shred_id)
        .ok_or_else(|| anyhow!("shred session not found: {shred_id}"))?;

    Ok(ShredSessionSnapshot {
        shred_id: shred_id.to_string(),
        status: session.status.clone(),
        located: session.located.clone(),
        summary: session.summary,
        error: session.error.clone(),
        total_events: session.events.len() as u64,
    })
}

pub fn doctor() -> DoctorInfo {
    collect_doctor_info()
}

fn update_session<F>(shred_id: &str, update: F)
where
    F: FnOnce(&mut ShredSession),
{
    if let Ok(mut sessions) = lock_sessions() {
        if let Some(session) = sessions.get_mut(shred_id) {
            update(session);
        }
    }
}

fn lock_sessions() -> Result<std::sync::MutexGuard<'static, HashMap<String, ShredSession>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("shred session registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{Duration, Instant};

    use file_shredder_core::{MatchCriteria, ShredConfig, ShredEventKind};
    use tempfile::TempDir;

    use super::{
        cancel_shred, doctor, find_files, get_shred_session, poll_shred_events, start_shred,
        ProgressThrottle, ShredEvent, ShredRequest, ShredSessionSnapshot, ShredSessionStatus,
    };

    fn progress_event(seq: u64) -> ShredEvent {
        ShredEvent {
            seq,
            kind: ShredEventKind::Progress {
                index: 0,
                path: "a.bin".to_string(),
                file_fraction: 0.5,
                overall_fraction: 0.5,
            },
        }
    }

    fn count_progress(events: &[ShredEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event.kind, ShredEventKind::Progress { .. }))
            .count()
    }

    fn wait_for(shred_id: &str) -> ShredSessionSnapshot {
        let started = Instant::now();
        loop {
            let snapshot = get_shred_session(shred_id).expect("session exists");
            if snapshot.status.is_finished() {
                return snapshot;
            }
            assert!(started.elapsed() < Duration::from_secs(30));
            std::thread::sleep(Duration::from_millis(25));
        }
    }

    #[test]
    fn start_shred_locates_and_destroys_matching_files() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("secret.txt"), b"classified").expect("write");
        fs::write(temp.path().join("keep.md"), b"notes").expect("write");

        let request = ShredRequest {
            criteria: Some(MatchCriteria::from_pattern_strings(temp.path(), "*.txt", "")),
            config: ShredConfig::basic(2).with_verify(true),
            use_system_extractors: false,
            ..ShredRequest::default()
        };
        let shred_id = start_shred(request).expect("shred starts");
        let snapshot = wait_for(&shred_id);

        assert_eq!(snapshot.status, ShredSessionStatus::Completed);
        let summary = snapshot.summary.expect("summary");
        assert_eq!(summary.counts(), (1, 0));
        assert_eq!(snapshot.located.expect("located").files.len(), 1);
        assert!(!temp.path().join("secret.txt").exists());
        assert!(temp.path().join("keep.md").exists());

        let events = poll_shred_events(&shred_id, 0).expect("events");
        assert!(matches!(
            events.last().map(|event| &event.kind),
            Some(ShredEventKind::BatchDone { .. })
        ));
        let tail = poll_shred_events(&shred_id, events[0].seq).expect("tail");
        assert_eq!(tail.len(), events.len() - 1);

        let cancel = cancel_shred(&shred_id).expect("cancel response");
        assert_eq!(cancel.shred_id, shred_id);
        assert_eq!(cancel.status, ShredSessionStatus::Completed);
    }

    #[test]
    fn throttle_admits_one_progress_event_per_interval() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(true, 250);

        assert!(throttle.admit(&progress_event(1), start));
        assert!(!throttle.admit(&progress_event(2), start + Duration::from_millis(100)));
        assert!(throttle.admit(&progress_event(3), start + Duration::from_millis(260)));

        let pass_done = ShredEvent {
            seq: 4,
            kind: ShredEventKind::PassWritten {
                index: 0,
                pass: 1,
                bytes: 10,
            },
        };
        assert!(throttle.admit(&pass_done, start + Duration::from_millis(261)));

        let mut silent = ProgressThrottle::new(false, 250);
        assert!(!silent.admit(&progress_event(1), start));
        assert!(silent.admit(&pass_done, start));
    }

    #[test]
    fn session_buffers_throttled_progress_but_every_pass_event() {
        let temp = TempDir::new().expect("tempdir");
        let first = temp.path().join("first.bin");
        let second = temp.path().join("second.bin");
        fs::write(&first, vec![1_u8; 3 * 1024 * 1024]).expect("write");
        fs::write(&second, vec![2_u8; 3 * 1024 * 1024]).expect("write");

        let throttled = ShredRequest {
            files: vec![first],
            config: ShredConfig::basic(2).with_verify(true),
            progress_interval_ms: 60_000,
            ..ShredRequest::default()
        };
        let shred_id = start_shred(throttled).expect("shred starts");
        assert_eq!(wait_for(&shred_id).status, ShredSessionStatus::Completed);
        let events = poll_shred_events(&shred_id, 0).expect("events");
        assert_eq!(count_progress(&events), 1);
        let passes = events
            .iter()
            .filter(|event| matches!(event.kind, ShredEventKind::PassWritten { .. }))
            .count();
        assert_eq!(passes, 2);
        assert!(events
            .iter()
            .any(|event| matches!(event.kind, ShredEventKind::FileDone { success: true, .. })));

        let silent = ShredRequest {
            files: vec![second],
            config: ShredConfig::basic(1),
            emit_progress_events: false,
            ..ShredRequest::default()
        };
        let shred_id = start_shred(silent).expect("shred starts");
        assert_eq!(wait_for(&shred_id).status, ShredSessionStatus::Completed);
        let events = poll_shred_events(&shred_id, 0).expect("events");
        assert_eq!(count_progress(&events), 0);
        assert!(matches!(
            events.last().map(|event| &event.kind),
            Some(ShredEventKind::BatchDone { .. })
        ));
    }

    #[test]
    fn explicit_files_with_missing_entry_still_complete() {
        let temp = TempDir::new().expect("tempdir");
        let present = temp.path().join("present.bin");
        fs::write(&present, vec![7_u8; 4096]).expect("write");

        let request = ShredRequest {
            files: vec![temp.path().join("absent.bin"), present.clone()],
            config: ShredConfig::dod(),
            ..ShredRequest::default()
        };
        let shred_id = start_shred(request).expect("shred starts");
        let snapshot = wait_for(&shred_id);

        assert_eq!(snapshot.status, ShredSessionStatus::Completed);
        assert_eq!(snapshot.summary.expect("summary").counts(), (1, 1));
        assert!(snapshot.located.is_none());
        assert!(!present.exists());
    }

    #[test]
    fn locate_failure_marks_session_failed() {
        let temp = TempDir::new().expect("tempdir");
        let request = ShredRequest {
            criteria: Some(MatchCriteria::from_pattern_strings(
                temp.path().join("missing"),
                "*",
                "",
            )),
            use_system_extractors: false,
            ..ShredRequest::default()
        };
        let shred_id = start_shred(request).expect("shred starts");
        let snapshot = wait_for(&shred_id);

        assert_eq!(snapshot.status, ShredSessionStatus::Failed);
        assert!(snapshot.error.is_some());
        assert!(snapshot.summary.is_none());
    }

    #[test]
    fn invalid_requests_are_rejected_before_a_session_exists() {
        let bad_config = ShredRequest {
            files: vec!["whatever".into()],
            config: ShredConfig::basic(0),
            ..ShredRequest::default()
        };
        assert!(start_shred(bad_config).is_err());
        let zero_interval = ShredRequest {
            files: vec!["whatever".into()],
            progress_interval_ms: 0,
            ..ShredRequest::default()
        };
        assert!(start_shred(zero_interval).is_err());
        assert!(start_shred(ShredRequest::default()).is_err());
        assert!(get_shred_session("no-such-session").is_err());
    }

    #[test]
    fn find_files_reports_without_deleting() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.log"), b"x").expect("write");
        let result = find_files(&MatchCriteria::from_pattern_strings(temp.path(), "*.log", ""))
            .expect("find");
        assert_eq!(result.files.len(), 1);
        assert!(temp.path().join("a.log").exists());
    }

    #[test]
    fn doctor_returns_runtime_snapshot() {
        let info = doctor();
        assert!(!info.os.is_empty());
        assert!(!info.notes.is_empty());
    }
}
