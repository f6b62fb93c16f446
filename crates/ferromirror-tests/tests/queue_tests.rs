//! Transfer queue behaviour against the mock server
//!
//! Retries, deduplication, ordering and deactivation are all observed through
//! the server's call counters and the recording collaborators.

use ferromirror_config::{SettingKey, SettingsProvider};
use ferromirror_engine::TransferOutcome;
use ferromirror_tests::{Harness, MockOp, MockServer};
use ferromirror_types::Error;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn wait_for_calls(server: &MockServer, op: MockOp, count: usize) {
    timeout(Duration::from_secs(5), async {
        while server.calls(op) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("call never happened");
}

#[tokio::test]
async fn test_upload_recovers_from_two_transient_failures() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("src/app.js", b"console.log(1)");
    server.fail_times(MockOp::Upload, 2, Error::network("read ECONNRESET"));

    let outcome = h.engine.upload_file(&local).await.unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert_eq!(h.engine.connection_stats().await.reconnects, 2);
    assert_eq!(server.calls(MockOp::Upload), 3);
    assert_eq!(server.file("src/app.js").unwrap(), b"console.log(1)");
    assert!(h.notifier.errors().is_empty());
    assert!(h
        .notifier
        .statuses()
        .iter()
        .any(|s| s == "Upload src/app.js (retrying 2/3)"));
}

#[tokio::test]
async fn test_upload_gives_up_after_three_retries() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("index.html", b"<html>");
    server.fail_always(MockOp::Upload, Error::network("socket hang up"));

    let outcome = h.engine.upload_file(&local).await.unwrap();

    assert!(outcome.is_failed());
    // First attempt plus three retries
    assert_eq!(server.calls(MockOp::Upload), 4);
    assert_eq!(h.engine.connection_stats().await.reconnects, 3);
    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Gave up after 4 attempts"), "{}", errors[0]);
    assert!(h.logger.contains("retrying 3/3"));
    assert!(!h.engine.queue().is_active(&local.display().to_string()));
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("index.html", b"<html>");
    server.fail_always(MockOp::Upload, Error::protocol(Some(553), "Permission denied"));

    let outcome = h.engine.upload_file(&local).await.unwrap();

    assert!(outcome.is_failed());
    assert_eq!(server.calls(MockOp::Upload), 1);
    assert_eq!(h.engine.connection_stats().await.reconnects, 0);
    assert_eq!(
        h.notifier.errors(),
        vec!["Upload index.html failed: Server error 553: Permission denied"]
    );
}

#[tokio::test]
async fn test_busy_server_gets_specific_message() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("index.html", b"<html>");
    server.fail_always(
        MockOp::Upload,
        Error::other("User launched a task while another task is still running"),
    );

    h.engine.upload_file(&local).await.unwrap();

    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("still busy with another transfer"));
}

#[tokio::test]
async fn test_duplicate_upload_is_rejected_while_in_flight() {
    let server = MockServer::new();
    server.set_latency(MockOp::Upload, Duration::from_millis(200));
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("index.html", b"<html>");

    let engine = Arc::clone(&h.engine);
    let first_path = local.clone();
    let first = tokio::spawn(async move { engine.upload_file(first_path).await });
    wait_for_calls(&server, MockOp::Upload, 1).await;

    let second = h.engine.upload_file(&local).await;
    assert!(matches!(second, Err(Error::AlreadyQueued { .. })));

    assert_eq!(first.await.unwrap().unwrap(), TransferOutcome::Completed);
    assert_eq!(server.calls(MockOp::Upload), 1);

    // Settled items can be queued again
    assert_eq!(
        h.engine.upload_file(&local).await.unwrap(),
        TransferOutcome::Completed
    );
    assert_eq!(server.calls(MockOp::Upload), 2);
}

#[tokio::test]
async fn test_items_run_one_at_a_time_in_order() {
    let server = MockServer::new();
    server.set_latency(MockOp::Upload, Duration::from_millis(20));
    let h = Harness::connected(server.clone()).await.unwrap();
    let names = ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"];
    let paths: Vec<_> = names.iter().map(|n| h.write(n, n.as_bytes())).collect();

    let outcomes = join_all(paths.iter().map(|p| h.engine.upload_file(p))).await;

    assert!(outcomes
        .into_iter()
        .all(|o| o.unwrap() == TransferOutcome::Completed));
    assert_eq!(server.max_in_flight(), 1);
    let uploaded: Vec<String> = server
        .journal()
        .into_iter()
        .filter(|(op, _)| *op == MockOp::Upload)
        .map(|(_, path)| path)
        .collect();
    assert_eq!(uploaded, names);
}

#[tokio::test]
async fn test_upload_creates_remote_parents() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("assets/css/site.css", b"body{}");

    h.engine.upload_file(&local).await.unwrap();

    assert!(server.is_dir("assets/css"));
    assert_eq!(server.file("assets/css/site.css").unwrap(), b"body{}");
    let journal = server.journal();
    let mkdir = journal.iter().position(|(op, _)| *op == MockOp::Mkdir).unwrap();
    let upload = journal.iter().position(|(op, _)| *op == MockOp::Upload).unwrap();
    assert!(mkdir < upload);
}

#[tokio::test]
async fn test_path_outside_workspace_is_skipped_and_logged() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let outside = elsewhere.path().join("notes.txt");
    std::fs::write(&outside, "x").unwrap();

    let outcome = h.engine.upload_file(&outside).await.unwrap();

    assert!(matches!(outcome, TransferOutcome::Skipped { .. }));
    assert_eq!(server.calls(MockOp::Upload), 0);
    assert!(h.notifier.errors().is_empty());
    assert!(h.logger.contains("outside the workspace"));
}

#[tokio::test]
async fn test_deactivate_drops_queued_items() {
    let server = MockServer::new();
    server.set_latency(MockOp::Upload, Duration::from_millis(100));
    let h = Harness::connected(server.clone()).await.unwrap();
    let paths: Vec<_> = ["a.txt", "b.txt", "c.txt"]
        .iter()
        .map(|n| h.write(n, b"x"))
        .collect();

    let engine = Arc::clone(&h.engine);
    let drain = tokio::spawn(async move {
        join_all(paths.iter().map(|p| engine.upload_file(p)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect::<Vec<_>>()
    });
    wait_for_calls(&server, MockOp::Upload, 1).await;
    h.engine.deactivate().await.unwrap();

    let outcomes = drain.await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            TransferOutcome::Completed,
            TransferOutcome::Dropped,
            TransferOutcome::Dropped
        ]
    );
    assert_eq!(server.calls(MockOp::Upload), 1);
    assert!(!h.engine.is_active());
    assert_eq!(h.settings.get(SettingKey::Host), None);
    assert_eq!(server.disconnects(), 1);
}

#[tokio::test]
async fn test_delete_falls_back_to_directory_delete() {
    let server = MockServer::new()
        .with_file("assets/img/logo.png", b"png")
        .with_file("index.html", b"<html>");
    let h = Harness::connected(server.clone()).await.unwrap();

    let outcome = h.engine.delete_file(h.root().join("assets")).await.unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert!(!server.exists("assets"));
    assert!(!server.exists("assets/img/logo.png"));
    assert!(server.exists("index.html"));
    assert_eq!(server.calls(MockOp::Delete), 1);
    assert_eq!(server.calls(MockOp::DeleteDirectory), 1);
}

#[tokio::test]
async fn test_delete_of_missing_entry_fails_once() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();

    let outcome = h.engine.delete_file(h.root().join("gone.txt")).await.unwrap();

    assert!(outcome.is_failed());
    assert_eq!(h.notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_move_uses_rename() {
    let server = MockServer::new().with_file("a.txt", b"a");
    let h = Harness::connected(server.clone()).await.unwrap();

    let outcome = h
        .engine
        .move_file(h.root().join("a.txt"), h.root().join("docs/b.txt"))
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert!(!server.exists("a.txt"));
    assert_eq!(server.file("docs/b.txt").unwrap(), b"a");
    assert_eq!(server.calls(MockOp::Rename), 1);
    assert_eq!(server.calls(MockOp::Download), 0);
}

#[tokio::test]
async fn test_move_falls_back_to_copy() {
    let server = MockServer::new().with_file("a.txt", b"contents");
    server.fail_always(MockOp::Rename, Error::protocol(Some(502), "RNFR not implemented"));
    let h = Harness::connected(server.clone()).await.unwrap();

    let outcome = h
        .engine
        .move_file(h.root().join("a.txt"), h.root().join("b.txt"))
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert!(!server.exists("a.txt"));
    assert_eq!(server.file("b.txt").unwrap(), b"contents");
    assert_eq!(server.calls(MockOp::Download), 1);
    assert_eq!(server.calls(MockOp::Upload), 1);
    assert_eq!(server.calls(MockOp::Delete), 1);
}

#[tokio::test]
async fn test_failed_probe_reconnects_before_transfer() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("index.html", b"<html>");
    server.fail_times(MockOp::Pwd, 1, Error::network("connection closed by server"));

    let outcome = h.engine.upload_file(&local).await.unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    let stats = h.engine.connection_stats().await;
    assert_eq!(stats.probe_failures, 1);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(server.calls(MockOp::Connect), 2);
}

#[tokio::test]
async fn test_reconnect_failure_fails_the_item() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();
    let local = h.write("index.html", b"<html>");
    server.fail_times(MockOp::Upload, 1, Error::network("read ETIMEDOUT"));
    server.fail_always(MockOp::Connect, Error::connection("Connection refused"));

    let outcome = h.engine.upload_file(&local).await.unwrap();

    assert!(outcome.is_failed());
    assert_eq!(server.calls(MockOp::Upload), 1);
    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("could not establish a session"));
}

#[tokio::test]
async fn test_mkdir_is_idempotent() {
    let server = MockServer::new();
    let h = Harness::connected(server.clone()).await.unwrap();

    let first = h.engine.queue().enqueue_mkdir("a/b").await.unwrap();
    let second = h.engine.queue().enqueue_mkdir("a/b").await.unwrap();

    assert_eq!(first, TransferOutcome::Completed);
    assert_eq!(second, TransferOutcome::Completed);
    assert!(server.is_dir("a"));
    assert!(server.is_dir("a/b"));
}
