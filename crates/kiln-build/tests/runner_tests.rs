//! Integration tests for the build action runner.
//!
//! Watch sessions are driven through a `ChannelChangeSource`, except for one
//! test that exercises the polling file watcher end to end.

mod helpers;

use std::fs;
use std::time::Duration;

use futures::StreamExt;
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use helpers::{ScriptedBundler, Step, TEST_DEBOUNCE, TEST_TIMEOUT, browser, list_files, server};
use kiln_build::{
    AssetCopyEntry, BuildActionRunner, ChannelChangeSource, Diagnostic, Error, FileChange, RunnerConfig,
    RunnerPhase, server_output_filter,
};

fn watch_config(dir: &TempDir, token: &CancellationToken) -> RunnerConfig {
    RunnerConfig::new(dir.path().join("dist"), dir.path())
        .watch(true)
        .cancellation(token.clone())
}

#[tokio::test]
async fn test_single_shot_yields_exactly_one_outcome() {
    let dir = TempDir::new().unwrap();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let calls = bundler.calls();
    let config = RunnerConfig::new(dir.path().join("dist"), dir.path());

    let outcomes: Vec<_> = BuildActionRunner::new(bundler, config)
        .into_stream()
        .collect()
        .await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].as_ref().unwrap().success);
    assert_eq!(*calls.lock(), vec![None]);
}

#[tokio::test]
async fn test_single_shot_writes_index_html() {
    let dir = TempDir::new().unwrap();
    let html = "<!doctype html><app-root></app-root>";
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("index.html", html)])]);
    let config = RunnerConfig::new(dir.path().join("dist"), dir.path());
    let mut runner = BuildActionRunner::new(bundler, config);

    let outcome = runner.next().await.unwrap().unwrap();

    assert!(outcome.success);
    assert_eq!(
        fs::read_to_string(dir.path().join("dist/index.html")).unwrap(),
        html
    );
    assert!(runner.next().await.is_none());
    assert!(runner.next().await.is_none());
}

#[tokio::test]
async fn test_write_disabled_leaves_disk_untouched() {
    let dir = TempDir::new().unwrap();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let config = RunnerConfig::new(dir.path().join("dist"), dir.path()).write_to_file_system(false);
    let mut runner = BuildActionRunner::new(bundler, config);

    let outcome = runner.next().await.unwrap().unwrap();

    assert_eq!(outcome.output_files.unwrap().len(), 1);
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn test_server_file_filtered_from_disk_but_reported() {
    let dir = TempDir::new().unwrap();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![
        browser("browser/main.js", "m"),
        server("server/server.mjs", "s"),
    ])]);
    let config = RunnerConfig::new(dir.path().join("dist"), dir.path())
        .write_filter(Some(server_output_filter()));
    let mut runner = BuildActionRunner::new(bundler, config);

    let outcome = runner.next().await.unwrap().unwrap();

    let reported: Vec<_> = outcome
        .output_files
        .unwrap()
        .iter()
        .map(|file| file.path().to_string())
        .collect();
    assert_eq!(reported, vec!["browser/main.js", "server/server.mjs"]);
    assert_eq!(list_files(&dir.path().join("dist")), vec!["browser/main.js"]);
}

#[tokio::test]
async fn test_watch_change_triggers_second_outcome() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([
        Step::Succeed(vec![browser("main.js", "v1")]),
        Step::Succeed(vec![browser("main.js", "v2")]),
    ]);
    let calls = bundler.calls();
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    let first = runner.next().await.unwrap().unwrap();
    assert_eq!(first.iteration, 1);
    assert_eq!(runner.phase(), RunnerPhase::AwaitingChange);

    assert!(sender.send(FileChange::Modified(dir.path().join("src/main.ts"))));
    let second = timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(second.iteration, 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("dist/main.js")).unwrap(),
        "v2"
    );

    token.cancel();
    assert!(runner.next().await.is_none());
    assert_eq!(runner.phase(), RunnerPhase::Cancelled);
    assert_eq!(*calls.lock(), vec![None, Some(1)]);
}

#[tokio::test]
async fn test_cancel_while_waiting_stops_invocations_and_closes_source() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let calls = bundler.calls();
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    for _ in 0..3 {
        runner.next().await.unwrap().unwrap();
        sender.send(FileChange::Modified(dir.path().join("src/a.ts")));
    }
    assert_eq!(calls.lock().len(), 3);

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    // The change sent after the third outcome is pending, but cancellation
    // is checked first.
    token.cancelled().await;
    assert!(runner.next().await.is_none());

    assert!(sender.is_closed());
    assert_eq!(calls.lock().len(), 3);
    assert!(runner.next().await.is_none());
}

#[tokio::test]
async fn test_cancel_while_awaiting_change_ends_session() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));
    runner.next().await.unwrap().unwrap();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let next = timeout(TEST_TIMEOUT, runner.next()).await.unwrap();
    assert!(next.is_none());
    assert!(sender.is_closed());
}

#[tokio::test]
async fn test_cancel_mid_invocation_yields_no_partial_result() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Hang]);
    let config = RunnerConfig::new(dir.path().join("dist"), dir.path()).cancellation(token.clone());
    let mut runner = BuildActionRunner::new(bundler, config);

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let next = timeout(TEST_TIMEOUT, runner.next()).await.unwrap();
    assert!(next.is_none());
    assert_eq!(runner.phase(), RunnerPhase::Cancelled);
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn test_failed_invocation_in_watch_mode_keeps_waiting() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([
        Step::Fail(vec![Diagnostic::error("Cannot find module './missing'").at(
            "src/main.ts",
            3,
            20,
        )]),
        Step::Succeed(vec![browser("main.js", "fixed")]),
    ]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    let failed = runner.next().await.unwrap().unwrap();
    assert!(!failed.success);
    assert!(failed.output_files.is_none());
    assert_eq!(failed.errors().count(), 1);
    assert!(list_files(&dir.path().join("dist")).is_empty());
    assert_eq!(runner.phase(), RunnerPhase::AwaitingChange);

    sender.send(FileChange::Created(dir.path().join("src/missing.ts")));
    let fixed = timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(fixed.success);
    assert_eq!(list_files(&dir.path().join("dist")), vec!["main.js"]);

    token.cancel();
    assert!(runner.next().await.is_none());
}

#[tokio::test]
async fn test_fatal_bundler_error_ends_session() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Fatal("worker pool crashed".into())]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    let err = runner.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Bundler(ref msg) if msg == "worker pool crashed"));
    assert_eq!(runner.phase(), RunnerPhase::Terminated);
    assert!(sender.is_closed());
    assert!(runner.next().await.is_none());
}

#[tokio::test]
async fn test_delete_output_path_wipes_once() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let dist = dir.path().join("dist");
    fs::create_dir_all(dist.join("old")).unwrap();
    fs::write(dist.join("old/stale.js"), "stale").unwrap();
    fs::write(dist.join("unrelated.txt"), "pre-existing").unwrap();

    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let config = watch_config(&dir, &token).delete_output_path(true);
    let mut runner = BuildActionRunner::new(bundler, config).with_change_source(Box::new(source));

    runner.next().await.unwrap().unwrap();
    assert_eq!(list_files(&dist), vec!["main.js"]);

    // Another tool drops a file into the output directory mid-session.
    fs::write(dist.join("added-by-tool.txt"), "keep me").unwrap();
    sender.send(FileChange::Modified(dir.path().join("src/main.ts")));
    timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(list_files(&dist), vec!["added-by-tool.txt", "main.js"]);
    token.cancel();
}

#[tokio::test]
async fn test_delete_output_path_refuses_workspace_root() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("projects/app");
    fs::create_dir_all(&project).unwrap();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let config = RunnerConfig::new(dir.path(), &project)
        .workspace_root(dir.path())
        .delete_output_path(true);
    let mut runner = BuildActionRunner::new(bundler, config);

    let err = runner.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::InvalidOutputPath(_)));
    assert!(project.exists());
}

#[tokio::test]
async fn test_rebuild_writes_only_changes_and_removes_stale_outputs() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let dist = dir.path().join("dist");
    let bundler = ScriptedBundler::new([
        Step::Succeed(vec![
            browser("main.js", "main"),
            browser("chunk-abc.js", "lazy v1"),
            browser("styles.css", "body{}"),
        ]),
        Step::Succeed(vec![
            browser("main.js", "main"),
            browser("chunk-def.js", "lazy v2"),
            browser("styles.css", "body{}"),
        ]),
    ]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    runner.next().await.unwrap().unwrap();
    // Mark unchanged outputs so a rewrite would be noticed.
    fs::write(dist.join("main.js"), "untouched").unwrap();

    sender.send(FileChange::Modified(dir.path().join("src/lazy.ts")));
    timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(
        list_files(&dist),
        vec!["chunk-def.js", "main.js", "styles.css"]
    );
    assert_eq!(fs::read_to_string(dist.join("main.js")).unwrap(), "untouched");
    token.cancel();
}

#[tokio::test]
async fn test_subscription_follows_declared_inputs() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let input = dir.path().join("src/main.ts");
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])])
        .with_watch_files(vec![input.clone()]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    runner.next().await.unwrap().unwrap();
    sender.send(FileChange::Modified(input.clone()));
    timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(sender.subscribed_inputs(), vec![input]);
    token.cancel();
}

#[tokio::test]
async fn test_closed_change_source_ends_session() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    runner.next().await.unwrap().unwrap();
    drop(sender);

    let next = timeout(TEST_TIMEOUT, runner.next()).await.unwrap();
    assert!(next.is_none());
    assert_eq!(runner.phase(), RunnerPhase::Terminated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_watcher_detects_source_change() {
    let dir = TempDir::new().unwrap();
    let source_file = dir.path().join("src/main.ts");
    fs::create_dir_all(source_file.parent().unwrap()).unwrap();
    fs::write(&source_file, "export const v = 0;").unwrap();

    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let config = watch_config(&dir, &token).poll(Some(Duration::from_millis(50)));
    let mut runner = BuildActionRunner::new(bundler, config);
    runner.next().await.unwrap().unwrap();

    // Keep touching the source until the runner notices.
    let writer_token = token.clone();
    let writer_path = source_file.clone();
    let writer = tokio::spawn(async move {
        let mut version = 1;
        while !writer_token.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tokio::fs::write(&writer_path, format!("export const v = {version};")).await;
            version += 1;
        }
    });

    let second = timeout(TEST_TIMEOUT, runner.next())
        .await
        .expect("rebuild within timeout")
        .unwrap()
        .unwrap();
    assert_eq!(second.iteration, 2);

    token.cancel();
    writer.await.unwrap();
    assert!(runner.next().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_runs_on_spawned_task() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let runner = BuildActionRunner::new(
        bundler,
        watch_config(&dir, &token).delete_output_path(true),
    )
    .with_change_source(Box::new(source));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut stream = Box::pin(runner.into_stream());
        while let Some(item) = stream.next().await {
            if tx.send(item.map(|outcome| outcome.iteration)).is_err() {
                break;
            }
        }
    });

    let first = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.unwrap(), 1);
    sender.send(FileChange::Modified(dir.path().join("src/main.ts")));
    let second = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.unwrap(), 2);

    token.cancel();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_relative_watch_files_are_subscribed_as_absolute() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let bundler = ScriptedBundler::new([Step::Succeed(vec![browser("main.js", "m")])])
        .with_watch_files(vec!["src/main.ts".into(), "./src/../lib/util.ts".into()]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    runner.next().await.unwrap().unwrap();
    sender.send(FileChange::Modified(dir.path().join("src/main.ts")));
    timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(
        sender.subscribed_inputs(),
        vec![dir.path().join("src/main.ts"), dir.path().join("lib/util.ts")]
    );
    token.cancel();
}

#[tokio::test]
async fn test_asset_colliding_with_unchanged_output_on_rebuild_is_rejected() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let image = dir.path().join("logo.png");
    fs::write(&image, [0x89, 0x50]).unwrap();
    let bundler = ScriptedBundler::new([
        Step::Succeed(vec![browser("logo.png", "generated")]),
        Step::SucceedWithAssets(
            vec![browser("logo.png", "generated")],
            vec![AssetCopyEntry::new(&image, "logo.png")],
        ),
    ]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    runner.next().await.unwrap().unwrap();
    sender.send(FileChange::Modified(image.clone()));
    let err = timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateOutput(path) if path == "logo.png"));
    assert_eq!(
        fs::read_to_string(dir.path().join("dist/logo.png")).unwrap(),
        "generated"
    );
    assert_eq!(runner.phase(), RunnerPhase::Terminated);
}

#[tokio::test]
async fn test_dropped_asset_is_removed_on_rebuild() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let dist = dir.path().join("dist");
    let image = dir.path().join("hero.png");
    fs::write(&image, [1, 2, 3]).unwrap();
    let bundler = ScriptedBundler::new([
        Step::SucceedWithAssets(
            vec![browser("index.html", "i")],
            vec![AssetCopyEntry::new(&image, "media/hero.png")],
        ),
        Step::Succeed(vec![browser("index.html", "i")]),
    ]);
    let (source, sender) = ChannelChangeSource::new(TEST_DEBOUNCE);
    let mut runner = BuildActionRunner::new(bundler, watch_config(&dir, &token))
        .with_change_source(Box::new(source));

    runner.next().await.unwrap().unwrap();
    assert_eq!(list_files(&dist), vec!["index.html", "media/hero.png"]);

    sender.send(FileChange::Removed(image.clone()));
    timeout(TEST_TIMEOUT, runner.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(list_files(&dist), vec!["index.html"]);
    token.cancel();
}
