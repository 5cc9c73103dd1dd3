use std::fs;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use file_shredder_core::{
    locate, ContentFilter, FileEvent, MatchCriteria, PassPattern, ShredConfig, ShredEngine,
    ShredError, ShredEventKind, DOD_PASS_SEQUENCE,
};
use tempfile::TempDir;

fn collect_events(engine: &ShredEngine, path: &std::path::Path) -> (bool, Vec<FileEvent>) {
    let mut events = Vec::new();
    let ok = engine
        .shred_file_with_events(path, |event| events.push(event))
        .is_ok();
    (ok, events)
}

#[test]
fn performs_exactly_p_full_passes_then_deletes() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("data.bin");
    let size = 3 * 1024 * 1024 + 123;
    fs::write(&path, vec![0x42_u8; size])?;

    let engine = ShredEngine::new(ShredConfig::basic(4));
    let (ok, events) = collect_events(&engine, &path);

    assert!(ok);
    assert!(!path.exists());
    let written = events
        .iter()
        .filter_map(|event| match event {
            FileEvent::PassWritten { bytes, .. } => Some(*bytes),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(written, vec![size as u64; 4]);
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, FileEvent::Deleted))
            .count(),
        1
    );
    Ok(())
}

#[test]
fn empty_file_is_deleted_without_overwrite() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("empty.txt");
    fs::write(&path, b"")?;

    let engine = ShredEngine::new(ShredConfig::basic(3).with_verify(true));
    let (ok, events) = collect_events(&engine, &path);

    assert!(ok);
    assert!(!path.exists());
    assert_eq!(
        events,
        vec![FileEvent::Deleted, FileEvent::Progress { fraction: 1.0 }]
    );
    Ok(())
}

#[test]
fn progress_is_monotonic_and_ends_at_one() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("data.bin");
    fs::write(&path, vec![7_u8; 2 * 1024 * 1024 + 5])?;

    let mut fractions = Vec::new();
    let engine = ShredEngine::new(ShredConfig::basic(3).with_verify(true));
    assert!(engine.shred(&path, |fraction| fractions.push(fraction)));

    assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(fractions.last().copied(), Some(1.0));
    Ok(())
}

#[test]
fn dod_method_runs_the_fixed_seven_pass_sequence() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("two-mib.bin");
    let size = 2 * 1024 * 1024;
    fs::write(&path, vec![0x33_u8; size])?;

    let engine = ShredEngine::new(ShredConfig::dod().with_verify(true));
    let (ok, events) = collect_events(&engine, &path);
    assert!(ok);
    assert!(!path.exists());

    let patterns = events
        .iter()
        .filter_map(|event| match event {
            FileEvent::PassStarted { pattern, .. } => Some(*pattern),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(patterns, DOD_PASS_SEQUENCE.to_vec());

    let written = events
        .iter()
        .filter(|event| matches!(event, FileEvent::PassWritten { bytes, .. } if *bytes == size as u64))
        .count();
    assert_eq!(written, 7);

    let verified = events
        .iter()
        .filter_map(|event| match event {
            FileEvent::PassVerified { pass } => Some(*pass),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(verified, (1..=7).collect::<Vec<_>>());
    let fixed_passes = DOD_PASS_SEQUENCE
        .iter()
        .filter(|pattern| matches!(pattern, PassPattern::Fixed(_)))
        .count();
    assert_eq!(fixed_passes, 5);
    Ok(())
}

#[test]
fn locate_then_shred_batch_scenario() -> Result<()> {
    let temp = TempDir::new()?;
    let a = temp.path().join("a.txt");
    fs::write(&a, b"0123foo789")?;
    fs::write(temp.path().join("b.log"), b"")?;

    let mut criteria = MatchCriteria::from_pattern_strings(temp.path(), "*.txt", "");
    criteria.content_include = Some(ContentFilter::new("foo", 1));
    let found = locate(&criteria)?;
    assert_eq!(found.files.len(), 1);
    assert_eq!(found.excluded_count, 0);

    let engine = ShredEngine::new(ShredConfig::basic(3));
    let mut overall = Vec::new();
    let mut done = Vec::new();
    let summary = engine.shred_batch(
        &found.paths(),
        |fraction, _| overall.push(fraction),
        |path, success| done.push((path.to_path_buf(), success)),
    );

    assert_eq!(summary.counts(), (1, 0));
    assert!(!a.exists());
    assert!(temp.path().join("b.log").exists());
    assert_eq!(done.len(), 1);
    assert!(done[0].1);
    assert_eq!(overall.last().copied(), Some(1.0));
    Ok(())
}

#[test]
fn batch_continues_past_failures_in_input_order() -> Result<()> {
    let temp = TempDir::new()?;
    let first = temp.path().join("first.txt");
    let missing = temp.path().join("missing.txt");
    let last = temp.path().join("last.txt");
    fs::write(&first, b"one")?;
    fs::write(&last, b"three")?;

    let engine = ShredEngine::new(ShredConfig::basic(1));
    let output = engine.shred_batch_with_events(&[first.clone(), missing.clone(), last.clone()]);

    assert_eq!(output.summary.counts(), (2, 1));
    assert!(!first.exists());
    assert!(!last.exists());

    let done = output
        .events
        .iter()
        .filter_map(|event| match &event.kind {
            ShredEventKind::FileDone { index, success, .. } => Some((*index, *success)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(done, vec![(0, true), (1, false), (2, true)]);

    let seqs = output.events.iter().map(|event| event.seq).collect::<Vec<_>>();
    assert!(seqs.windows(2).all(|pair| pair[1] == pair[0] + 1));
    assert!(matches!(
        output.events.last().map(|event| &event.kind),
        Some(ShredEventKind::BatchDone { .. })
    ));
    Ok(())
}

#[test]
fn cancellation_is_checked_between_files() -> Result<()> {
    let temp = TempDir::new()?;
    let first = temp.path().join("first.txt");
    let second = temp.path().join("second.txt");
    fs::write(&first, b"one")?;
    fs::write(&second, b"two")?;

    let flag = Arc::new(AtomicBool::new(false));
    let engine = ShredEngine::new(ShredConfig::basic(2)).with_cancel_flag(Arc::clone(&flag));
    let summary = engine.shred_batch(
        &[first.clone(), second.clone()],
        |_, _| {},
        |_, _| flag.store(true, Ordering::Relaxed),
    );

    assert_eq!(summary.counts(), (1, 0));
    assert_eq!(summary.skipped, 1);
    assert!(summary.cancelled);
    assert!(!first.exists());
    assert!(second.exists());
    Ok(())
}

#[test]
fn empty_batch_reports_nothing_done() {
    let engine = ShredEngine::default();
    let paths: Vec<std::path::PathBuf> = Vec::new();
    let summary = engine.shred_batch(&paths, |_, _| {}, |_, _| {});
    assert_eq!(summary.counts(), (0, 0));
}

#[cfg(unix)]
#[test]
fn symlinks_are_not_shredded_through() -> Result<()> {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new()?;
    let target = temp.path().join("target.txt");
    let link = temp.path().join("link.txt");
    fs::write(&target, b"precious")?;
    symlink(&target, &link)?;

    let err = ShredEngine::new(ShredConfig::basic(1))
        .shred_file(&link)
        .expect_err("symlink refused");
    assert!(matches!(err, ShredError::NotRegularFile(_)));
    assert_eq!(fs::read(&target)?, b"precious");
    Ok(())
}

#[cfg(unix)]
#[test]
fn followed_links_are_shredded_at_their_target_once() -> Result<()> {
    use std::collections::BTreeSet;
    use std::os::unix::fs::symlink;

    let outside = TempDir::new()?;
    let secret = outside.path().join("secret.txt");
    fs::write(&secret, b"reachable only through a link")?;
    let temp = TempDir::new()?;
    let direct = temp.path().join("direct.txt");
    fs::write(&direct, b"listed directly and through an alias")?;
    symlink(&secret, temp.path().join("link.txt"))?;
    symlink(&direct, temp.path().join("alias.txt"))?;

    let mut criteria = MatchCriteria::from_pattern_strings(temp.path(), "*.txt", "");
    criteria.follow_links = true;
    let found = locate(&criteria)?;

    let listed = found.paths().into_iter().collect::<BTreeSet<_>>();
    let expected = [fs::canonicalize(&secret)?, fs::canonicalize(&direct)?]
        .into_iter()
        .collect::<BTreeSet<_>>();
    assert_eq!(listed, expected);

    let engine = ShredEngine::new(ShredConfig::basic(1));
    let summary = engine.shred_batch(&found.paths(), |_, _| {}, |_, _| {});

    assert_eq!(summary.counts(), (2, 0));
    assert!(!secret.exists());
    assert!(!direct.exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn unfollowed_links_are_never_candidates() -> Result<()> {
    use std::os::unix::fs::symlink;

    let outside = TempDir::new()?;
    let secret = outside.path().join("secret.txt");
    fs::write(&secret, b"outside the search root")?;
    let temp = TempDir::new()?;
    let direct = temp.path().join("direct.txt");
    fs::write(&direct, b"inside")?;
    symlink(&secret, temp.path().join("link.txt"))?;

    let found = locate(&MatchCriteria::from_pattern_strings(temp.path(), "*.txt", ""))?;
    assert_eq!(found.paths(), vec![fs::canonicalize(temp.path())?.join("direct.txt")]);

    let engine = ShredEngine::new(ShredConfig::basic(1));
    let summary = engine.shred_batch(&found.paths(), |_, _| {}, |_, _| {});

    assert_eq!(summary.counts(), (1, 0));
    assert!(secret.exists());
    assert!(fs::symlink_metadata(temp.path().join("link.txt")).is_ok());
    Ok(())
}
