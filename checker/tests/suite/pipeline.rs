//! End-to-end checker runs against real `sh` processes.
//!
//! Each test drives a single `CheckerInstance` and waits on its event channel
//! rather than sleeping for fixed amounts of time where it can.

use std::sync::Arc;
use std::time::Duration;

use syncheck_checker::{
    CheckerConfig, CheckerEntry, CheckerEvent, CheckerInstance, Range, Severity, TextDocument,
};
use tokio::sync::mpsc;

use crate::common::{
    EVENT_TIMEOUT, FakeHost, as_document, collect_for, count_started, is_settled, sh_checker,
    wait_for,
};

fn start(
    host: &Arc<FakeHost>,
    config: CheckerConfig,
    delay_ms: u64,
) -> (CheckerInstance, mpsc::Receiver<CheckerEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let instance = CheckerInstance::start(
        config,
        Duration::from_millis(delay_ms),
        Arc::clone(host),
        tx,
    );
    (instance, rx)
}

// ── Debounce ───────────────────────────────────────────────────────────

#[tokio::test]
async fn rapid_triggers_launch_one_run_with_latest_text() {
    let host = FakeHost::new();
    let log = host.root().join("runs.log");
    let script = format!("cat >> '{0}'; echo RUN >> '{0}'", log.display());
    let (instance, mut events) = start(&host, sh_checker("Log", "c", &script), 150);

    let doc = host.open_untitled("Untitled-1", "c", "one\n");
    instance.trigger(as_document(&doc)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    doc.set_text("two\n");
    instance.trigger(as_document(&doc)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    doc.set_text("three\n");
    instance.trigger(as_document(&doc)).await;

    let seen = wait_for(&mut events, is_settled).await;
    assert_eq!(count_started(&seen), 1);

    let later = collect_for(&mut events, Duration::from_millis(400)).await;
    assert_eq!(count_started(&later), 0, "unexpected extra run: {later:?}");

    let logged = std::fs::read_to_string(&log).unwrap();
    assert_eq!(logged, "three\nRUN\n");
}

#[tokio::test]
async fn other_languages_never_trigger() {
    let host = FakeHost::new();
    let (instance, mut events) = start(
        &host,
        sh_checker("GCC", "c", "echo '<stdin>:1:1: error: x'"),
        20,
    );

    let doc = host.open_untitled("Untitled-1", "python", "x = 1\n");
    instance.trigger(as_document(&doc)).await;
    host.emit_changed(&doc);

    let seen = collect_for(&mut events, Duration::from_millis(300)).await;
    assert!(seen.is_empty(), "got {seen:?}");
}

#[tokio::test]
async fn language_match_is_case_insensitive() {
    let host = FakeHost::new();
    let (_instance, mut events) = start(&host, sh_checker("GCC", "C", "cat > /dev/null"), 20);

    let doc = host.open_untitled("Untitled-1", "c", "int x;\n");
    host.emit_changed(&doc);

    let seen = wait_for(&mut events, is_settled).await;
    assert_eq!(count_started(&seen), 1);
}

#[tokio::test]
async fn active_document_is_checked_on_start() {
    let host = FakeHost::new();
    let doc = host.open_untitled("Untitled-1", "c", "int x\n");
    host.set_active(&doc);

    let (_instance, mut events) = start(
        &host,
        sh_checker("GCC", "c", "cat > /dev/null; echo '<stdin>:1:5: error: expected semicolon'"),
        20,
    );

    wait_for(&mut events, is_settled).await;
    let published = host.collection("GCC").get(doc.uri());
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].message(), "expected semicolon");
}

// ── Placement ──────────────────────────────────────────────────────────

#[tokio::test]
async fn stderr_diagnostic_lands_on_workspace_file() {
    let host = FakeHost::new();
    let (instance, mut events) = start(
        &host,
        sh_checker(
            "GCC",
            "c",
            "cat > /dev/null; echo 'file.c:3:1: error: missing semicolon' >&2; exit 1",
        ),
        20,
    );

    let doc = host.open_untitled("Untitled-1", "c", "int main() {}\n");
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, is_settled).await;

    let collection = host.collection("GCC");
    let placed = collection.get(&host.file_uri("file.c"));
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].range(), Range::on_line(2, 0, 1));
    assert_eq!(placed[0].severity(), Severity::Error);
    assert_eq!(placed[0].source(), "GCC");
    assert_eq!(placed[0].message(), "missing semicolon");
    assert!(collection.get(doc.uri()).is_empty());
    assert!(host.warnings().is_empty());
}

#[tokio::test]
async fn stdin_marker_targets_buffer_and_expands_word() {
    let host = FakeHost::new();
    let (instance, mut events) = start(
        &host,
        sh_checker(
            "GCC",
            "c",
            "cat > /dev/null; echo '<stdin>:2:7: error: unknown identifier'",
        ),
        20,
    );

    let doc = host.open_untitled("Untitled-1", "c", "int main() {\n    retrun 0;\n}\n");
    doc.set_dirty(true);
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, is_settled).await;

    let placed = host.collection("GCC").get(doc.uri());
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].range(), Range::on_line(1, 4, 10));
}

#[tokio::test]
async fn dirty_files_keep_point_ranges() {
    let host = FakeHost::new();
    let dirty = host.open_file("dirty.c", "c", "identifier\n");
    dirty.set_dirty(true);
    host.open_file("clean.c", "c", "identifier\n");

    let (instance, mut events) = start(
        &host,
        sh_checker(
            "GCC",
            "c",
            "cat > /dev/null; echo 'dirty.c:1:3: warning: a'; echo 'clean.c:1:3: warning: b'",
        ),
        20,
    );

    let trigger = host.open_untitled("Untitled-1", "c", "");
    instance.trigger(as_document(&trigger)).await;
    wait_for(&mut events, is_settled).await;

    let collection = host.collection("GCC");
    let dirty_placed = collection.get(&host.file_uri("dirty.c"));
    let clean_placed = collection.get(&host.file_uri("clean.c"));
    assert_eq!(dirty_placed[0].range(), Range::on_line(0, 2, 3));
    assert_eq!(clean_placed[0].range(), Range::on_line(0, 0, 10));
    assert_eq!(clean_placed[0].severity(), Severity::Warning);
}

#[tokio::test]
async fn run_settles_after_every_file_is_published() {
    let host = FakeHost::new();
    let (instance, mut events) = start(
        &host,
        sh_checker(
            "GCC",
            "c",
            "cat > /dev/null; echo 'a.c:1:1: error: x'; echo './sub/../b.c:2:1: warning: y'; echo 'a.c:4:1: error: z'",
        ),
        20,
    );

    let doc = host.open_untitled("Untitled-1", "c", "");
    instance.trigger(as_document(&doc)).await;
    let seen = wait_for(&mut events, is_settled).await;

    let published: Vec<usize> = seen
        .iter()
        .filter_map(|event| match event {
            CheckerEvent::Published { count, .. } => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(published.len(), 2);
    assert_eq!(published.iter().sum::<usize>(), 3);

    let collection = host.collection("GCC");
    assert_eq!(collection.get(&host.file_uri("a.c")).len(), 2);
    let b = collection.get(&host.file_uri("b.c"));
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].severity(), Severity::Warning);
}

#[tokio::test]
async fn new_run_clears_previous_results() {
    let host = FakeHost::new();
    let (instance, mut events) = start(
        &host,
        sh_checker("GCC", "c", "if grep -q bad; then echo 'a.c:1:1: error: bad'; fi"),
        20,
    );

    let doc = host.open_untitled("Untitled-1", "c", "bad\n");
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, is_settled).await;
    assert_eq!(host.collection("GCC").get(&host.file_uri("a.c")).len(), 1);

    doc.set_text("good\n");
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, is_settled).await;
    assert!(host.collection("GCC").is_empty());
}

// ── Superseded and disposed runs ───────────────────────────────────────

#[tokio::test]
async fn stale_run_output_is_discarded() {
    let host = FakeHost::new();
    let script = "read -r first; if [ \"$first\" = slow ]; then sleep 1; fi; \
                  echo \"<stdin>:1:1: warning: $first\"";
    let (instance, mut events) = start(&host, sh_checker("Race", "c", script), 20);

    let doc = host.open_untitled("Untitled-1", "c", "slow\n");
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, |e| matches!(e, CheckerEvent::RunStarted { .. })).await;

    doc.set_text("fast\n");
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, is_settled).await;
    wait_for(&mut events, |e| matches!(e, CheckerEvent::RunDiscarded { .. })).await;

    let placed = host.collection("Race").get(doc.uri());
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].message(), "fast");
}

#[tokio::test]
async fn superseded_run_does_not_publish_after_slow_lookup() {
    let host = FakeHost::new();
    let script = "read -r first; \
                  if [ \"$first\" = old ]; then echo 'held.c:1:1: error: superseded'; \
                  else echo 'other.c:1:1: warning: current'; fi";
    let (instance, mut events) = start(&host, sh_checker("Slow", "c", script), 20);
    let gate = host.hold_lookup("held.c");

    let doc = host.open_untitled("Untitled-1", "c", "old\n");
    instance.trigger(as_document(&doc)).await;
    tokio::time::timeout(EVENT_TIMEOUT, gate.started.notified())
        .await
        .expect("lookup of held.c never started");

    // The first run passed its completion check and is now waiting on the
    // lookup; a newer run supersedes it.
    doc.set_text("new\n");
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, is_settled).await;

    gate.release.notify_one();
    let later = collect_for(&mut events, Duration::from_millis(300)).await;
    let held = host.file_uri("held.c");
    assert!(
        !later
            .iter()
            .any(|e| matches!(e, CheckerEvent::Published { uri, .. } if *uri == held)),
        "superseded file was published: {later:?}"
    );

    let collection = host.collection("Slow");
    assert!(collection.get(&held).is_empty());
    let current = collection.get(&host.file_uri("other.c"));
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].message(), "current");
    instance.dispose().await;
}

#[tokio::test]
async fn dispose_during_run_prevents_late_writes() {
    let host = FakeHost::new();
    let (instance, mut events) = start(
        &host,
        sh_checker("Slow", "c", "sleep 0.5; echo '<stdin>:1:1: error: late'"),
        20,
    );

    let doc = host.open_untitled("Untitled-1", "c", "x\n");
    instance.trigger(as_document(&doc)).await;
    wait_for(&mut events, |e| matches!(e, CheckerEvent::RunStarted { .. })).await;

    instance.dispose().await;
    let collection = host.collection("Slow");
    assert!(collection.is_disposed());

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(collection.late_writes(), 0);
    assert!(collection.is_empty());
    assert!(host.warnings().is_empty());
}

#[tokio::test]
async fn dispose_cancels_pending_timer() {
    let host = FakeHost::new();
    let log = host.root().join("runs.log");
    let script = format!("echo RUN >> '{}'", log.display());
    let (instance, _events) = start(&host, sh_checker("Log", "c", &script), 100);

    let doc = host.open_untitled("Untitled-1", "c", "x\n");
    instance.trigger(as_document(&doc)).await;
    instance.dispose().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!log.exists());
}

// ── Failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_command_warns_and_fails_run() {
    let host = FakeHost::new();
    let config = CheckerConfig::from_entry(&CheckerEntry {
        command: "syncheck-no-such-checker".to_string(),
        display_name: "Missing".to_string(),
        arguments: Vec::new(),
        language_ids: vec!["c".to_string()],
    });
    let (instance, mut events) = start(&host, config, 20);

    let doc = host.open_untitled("Untitled-1", "c", "x\n");
    instance.trigger(as_document(&doc)).await;
    let seen = wait_for(&mut events, CheckerEvent::is_terminal).await;

    assert!(matches!(seen.last(), Some(CheckerEvent::RunFailed { .. })));
    let warnings = host.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Checker Missing received error"));
    assert!(warnings[0].contains("syncheck-no-such-checker"));
    assert!(host.collection("Missing").is_empty());
}
