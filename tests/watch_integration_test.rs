//! End-to-end tests against real inotify and real temp trees.

use std::fs;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use cdog::watcher::{Dispatch, EventDispatcher, InotifySource, WatchRegistry, WatchSource};
use cdog::{QuarantinePolicy, UnwantedExtensions};
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(10);

fn denylist() -> UnwantedExtensions {
    UnwantedExtensions::new([".gif", ".php"])
}

fn dispatcher(policy: QuarantinePolicy) -> EventDispatcher<InotifySource> {
    EventDispatcher::new(InotifySource::new(64).unwrap(), WatchRegistry::new(256), policy)
        .with_poll_interval(Duration::from_millis(20))
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

/// Read and dispatch events on this thread until `done` holds.
fn pump(
    d: &mut EventDispatcher<InotifySource>,
    mut done: impl FnMut(&EventDispatcher<InotifySource>) -> bool,
) -> Vec<Dispatch> {
    let mut seen = Vec::new();
    let start = Instant::now();
    while !done(d) && start.elapsed() < DEADLINE {
        let batch = d.source_mut().read_events(Duration::from_millis(50)).unwrap();
        for event in &batch {
            seen.push(d.dispatch(event));
        }
    }
    seen
}

#[test]
fn test_new_subdirectory_file_is_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let root = fs::canonicalize(temp_dir.path()).unwrap();
    let mut d = dispatcher(QuarantinePolicy::delete(denylist()));
    assert!(d.pin_root(&root).root.is_some());

    let flag = d.shutdown_flag();
    let worker = thread::spawn(move || {
        let result = d.run();
        (d, result)
    });

    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/evil.php"), b"<?php").unwrap();
    fs::write(root.join("sub/foo.txt"), b"hello").unwrap();

    let evil = root.join("sub/evil.php");
    assert!(wait_until(|| !evil.exists()), "evil.php was not removed");

    // Later files in the new directory are seen through its own watch.
    fs::write(root.join("sub/later.gif"), b"GIF89a").unwrap();
    let later = root.join("sub/later.gif");
    assert!(wait_until(|| !later.exists()), "later.gif was not removed");

    flag.store(true, Ordering::SeqCst);
    let (mut d, result) = worker.join().unwrap();
    result.unwrap();

    assert!(root.join("sub/foo.txt").exists());
    assert!(d.registry().handle_for(&root.join("sub")).is_some());
    assert_eq!(d.teardown(), 2);
}

#[test]
fn test_unwanted_file_is_moved_into_quarantine() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("www");
    let jail = temp_dir.path().join("jail");
    fs::create_dir(&root).unwrap();
    fs::create_dir(&jail).unwrap();
    fs::write(jail.join("cat.gif"), b"older").unwrap();

    let mut d = dispatcher(QuarantinePolicy::move_to(denylist(), &jail));
    d.pin_root(&root);

    fs::write(root.join("cat.gif"), b"newer").unwrap();
    let seen = pump(&mut d, |_| jail.join("cat.gif.1").exists());

    assert!(seen.iter().any(|outcome| matches!(outcome, Dispatch::Quarantined { .. })));
    assert!(!root.join("cat.gif").exists());
    assert_eq!(fs::read(jail.join("cat.gif")).unwrap(), b"older");
    assert_eq!(fs::read(jail.join("cat.gif.1")).unwrap(), b"newer");
}

#[test]
fn test_deleted_directory_is_retired_alone() {
    let temp_dir = TempDir::new().unwrap();
    let root = fs::canonicalize(temp_dir.path()).unwrap();
    for dir in ["a", "ab", "ab/inner"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    let mut d = dispatcher(QuarantinePolicy::delete(denylist()));
    d.pin_root(&root);
    assert_eq!(d.registry().len(), 4);

    fs::remove_dir_all(root.join("ab")).unwrap();
    pump(&mut d, |d| d.registry().len() == 2);

    assert_eq!(d.registry().len(), 2);
    assert!(d.registry().handle_for(&root).is_some());
    assert!(d.registry().handle_for(&root.join("a")).is_some());
    assert!(d.registry().handle_for(&root.join("ab")).is_none());
    assert!(d.registry().handle_for(&root.join("ab/inner")).is_none());
}

#[test]
fn test_symlinked_root_is_watched() {
    let temp_dir = TempDir::new().unwrap();
    let base = fs::canonicalize(temp_dir.path()).unwrap();
    let real = base.join("real");
    let link = base.join("www");
    fs::create_dir(&real).unwrap();
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let mut d = dispatcher(QuarantinePolicy::delete(denylist()));
    let report = d.pin_root(&link);

    assert!(report.root.is_some(), "symlinked root was not watched");
    assert_eq!(report.skipped, 0);
    assert_eq!(d.roots(), &[link.clone()]);
    assert_eq!(d.registry().handle_for(&real), report.root);

    fs::write(link.join("evil.php"), b"<?php").unwrap();
    pump(&mut d, |_| !real.join("evil.php").exists());

    assert!(!real.join("evil.php").exists());
}

fn wait_for_exit(child: &mut Child) -> Option<std::process::ExitStatus> {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(20));
    }
    let _ = child.kill();
    None
}

fn log_contains(log: &Path, needle: &str) -> bool {
    fs::read_to_string(log).is_ok_and(|content| content.contains(needle))
}

#[test]
fn test_binary_quarantines_and_stops_on_sigterm() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("www");
    let jail = temp_dir.path().join("jail");
    let log = temp_dir.path().join("cdog.log");
    fs::create_dir(&root).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_cdog"))
        .current_dir(temp_dir.path())
        .env("CDOG_WATCH__POLL_INTERVAL_MS", "20")
        .arg(format!("--moveto={}", jail.display()))
        .arg(format!("--logto={}", log.display()))
        .arg(&root)
        .spawn()
        .expect("Failed to start cdog");

    assert!(
        wait_until(|| log_contains(&log, "[dispatcher] started")),
        "cdog did not start"
    );
    assert!(jail.is_dir(), "quarantine directory is created at startup");

    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/evil.php"), b"<?php").unwrap();
    fs::write(root.join("sub/index.html"), b"<html>").unwrap();

    assert!(wait_until(|| jail.join("evil.php").exists()));
    assert!(!root.join("sub/evil.php").exists());
    assert!(root.join("sub/index.html").exists());

    // SAFETY: plain kill(2) on our own child's pid.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    assert_eq!(rc, 0);

    let status = wait_for_exit(&mut child).expect("cdog did not exit after SIGTERM");
    assert!(status.success());
    assert!(log_contains(&log, "released 2 watches"));
    assert!(log_contains(&log, &format!("pid {}", child.id())));
}
