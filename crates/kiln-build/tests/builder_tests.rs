//! Integration tests for the builder entry points.

mod helpers;

use std::fs;
use std::path::Path;

use futures::StreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use helpers::{ScriptedBundler, Step, browser, list_files, server};
use kiln_build::{
    ApplicationOptions, BuildTarget, BuilderContext, CacheOptions, Error,
    InfrastructureSettings, LegacyBrowserOptions, build_application, build_legacy_browser,
};

fn context(workspace: &Path) -> BuilderContext {
    BuilderContext::new(workspace)
        .target(BuildTarget::new("app"))
        .framework_version("17.3.0")
}

fn app_options(json: &str) -> ApplicationOptions {
    serde_json::from_str(json).unwrap()
}

fn scripted(files: Vec<kiln_build::OutputFile>) -> ScriptedBundler {
    ScriptedBundler::new([Step::Succeed(files)])
}

#[tokio::test]
async fn test_build_application_writes_to_output_path() {
    let ws = TempDir::new().unwrap();
    let options = app_options(r#"{"browser": "src/main.ts", "outputPath": "dist/app"}"#);

    let mut session = build_application(
        options,
        &context(ws.path()),
        InfrastructureSettings::default(),
        |_| Ok(scripted(vec![browser("browser/main.js", "m"), browser("browser/index.html", "i")])),
    )
    .await;

    let outcome = session.next().await.unwrap().unwrap();
    assert!(outcome.success);
    assert!(session.next().await.is_none());
    assert_eq!(
        list_files(&ws.path().join("dist/app")),
        vec!["browser/index.html", "browser/main.js"]
    );
}

#[tokio::test]
async fn test_missing_target_yields_nothing() {
    let ws = TempDir::new().unwrap();
    let context = BuilderContext::new(ws.path()).framework_version("17.3.0");
    let mut invoked = false;

    let mut session = build_application(
        app_options(r#"{"browser": "src/main.ts"}"#),
        &context,
        InfrastructureSettings::default(),
        |_| {
            invoked = true;
            Ok(scripted(Vec::new()))
        },
    )
    .await;

    assert!(session.next().await.is_none());
    assert!(!invoked);
    let err = session.take_setup_error().unwrap();
    assert!(matches!(err, Error::MissingTarget(_)));
    assert_eq!(
        err.to_string(),
        "The 'application' builder requires a target to be specified."
    );
}

#[tokio::test]
async fn test_incompatible_framework_yields_nothing() {
    let ws = TempDir::new().unwrap();
    let context = BuilderContext::new(ws.path())
        .target(BuildTarget::new("app"))
        .framework_version("15.0.0");

    let mut session = build_application(
        app_options(r#"{"browser": "src/main.ts"}"#),
        &context,
        InfrastructureSettings::default(),
        |_| Ok(scripted(vec![browser("main.js", "m")])),
    )
    .await;

    assert!(session.next().await.is_none());
    assert!(matches!(
        session.setup_error(),
        Some(Error::IncompatibleVersion { .. })
    ));
    assert!(session.phase().is_none());
}

#[tokio::test]
async fn test_invalid_options_yield_nothing() {
    let ws = TempDir::new().unwrap();

    let mut session = build_application(
        app_options("{}"),
        &context(ws.path()),
        InfrastructureSettings::default(),
        |_| Ok(scripted(vec![browser("main.js", "m")])),
    )
    .await;

    assert!(session.next().await.is_none());
    assert!(matches!(session.setup_error(), Some(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn test_stale_cache_is_purged_before_build() {
    let ws = TempDir::new().unwrap();
    let cache = CacheOptions::new(ws.path().join(".kiln/cache"), "2.0.0");
    fs::create_dir_all(ws.path().join(".kiln/cache/1.0.0")).unwrap();
    fs::create_dir_all(ws.path().join(".kiln/cache/2.0.0")).unwrap();

    // Purging happens before the target is resolved.
    let context = BuilderContext::new(ws.path())
        .framework_version("17.3.0")
        .cache(cache);
    let mut session = build_application(
        app_options(r#"{"browser": "src/main.ts"}"#),
        &context,
        InfrastructureSettings::default(),
        |_| Ok(scripted(Vec::new())),
    )
    .await;

    assert!(session.next().await.is_none());
    assert!(!ws.path().join(".kiln/cache/1.0.0").exists());
    assert!(ws.path().join(".kiln/cache/2.0.0").exists());
}

#[tokio::test]
async fn test_server_files_written_only_with_ssr_and_server_entry() {
    let ws = TempDir::new().unwrap();
    let files = vec![browser("browser/main.js", "m"), server("server/server.mjs", "s")];

    let without_ssr = app_options(r#"{"browser": "main.ts", "outputPath": "plain"}"#);
    let mut session = build_application(
        without_ssr,
        &context(ws.path()),
        InfrastructureSettings::default(),
        |_| Ok(scripted(files.clone())),
    )
    .await;
    let outcome = session.next().await.unwrap().unwrap();
    assert_eq!(outcome.output_files.unwrap().len(), 2);
    assert_eq!(list_files(&ws.path().join("plain")), vec!["browser/main.js"]);

    let with_ssr = app_options(
        r#"{"browser": "main.ts", "server": "main.server.ts", "ssr": true, "outputPath": "ssr"}"#,
    );
    let mut session = build_application(
        with_ssr,
        &context(ws.path()),
        InfrastructureSettings::default(),
        |_| Ok(scripted(files.clone())),
    )
    .await;
    session.next().await.unwrap().unwrap();
    assert_eq!(
        list_files(&ws.path().join("ssr")),
        vec!["browser/main.js", "server/server.mjs"]
    );
}

#[tokio::test]
async fn test_write_false_suppresses_all_writes() {
    let ws = TempDir::new().unwrap();

    let mut session = build_application(
        app_options(r#"{"browser": "main.ts", "outputPath": "dist"}"#),
        &context(ws.path()),
        InfrastructureSettings { write: false },
        |_| Ok(scripted(vec![browser("main.js", "m")])),
    )
    .await;

    let outcome = session.next().await.unwrap().unwrap();
    assert_eq!(outcome.output_files.unwrap().len(), 1);
    assert!(!ws.path().join("dist").exists());
}

#[tokio::test]
async fn test_bundler_receives_normalized_options() {
    let ws = TempDir::new().unwrap();
    let mut seen = None;

    let mut session = build_application(
        app_options(r#"{"browser": "src/main.ts", "polyfills": "zone.js"}"#),
        &context(ws.path()),
        InfrastructureSettings { write: false },
        |normalized| {
            seen = Some(normalized.clone());
            Ok(scripted(Vec::new()))
        },
    )
    .await;
    session.next().await.unwrap().unwrap();

    let normalized = seen.unwrap();
    assert_eq!(normalized.polyfills, vec!["zone.js".to_string()]);
    assert_eq!(normalized.browser, ws.path().join("src/main.ts"));
    assert_eq!(normalized.output_path, ws.path().join("dist/app"));
}

#[tokio::test]
async fn test_legacy_browser_writes_flat_layout() {
    let ws = TempDir::new().unwrap();
    let options: LegacyBrowserOptions = serde_json::from_str(
        r#"{"main": "src/main.ts", "polyfills": "zone.js", "outputPath": "dist/legacy"}"#,
    )
    .unwrap();

    let mut session = build_legacy_browser(
        options,
        &context(ws.path()),
        InfrastructureSettings::default(),
        |normalized| {
            assert_eq!(normalized.polyfills, vec!["zone.js".to_string()]);
            Ok(scripted(vec![
                browser("index.html", "<app-root></app-root>"),
                browser("assets/i18n/en.json", "{}"),
            ]))
        },
    )
    .await;

    let outcome = session.next().await.unwrap().unwrap();
    assert!(outcome.success);
    assert_eq!(
        list_files(&ws.path().join("dist/legacy")),
        vec!["assets/i18n/en.json", "index.html"]
    );
}

#[tokio::test]
async fn test_legacy_browser_without_write_leaves_disk_untouched() {
    let ws = TempDir::new().unwrap();
    let options = LegacyBrowserOptions {
        main: Some("src/main.ts".into()),
        output_path: Some("dist/legacy".into()),
        ..Default::default()
    };

    let mut session = build_legacy_browser(
        options,
        &context(ws.path()),
        InfrastructureSettings { write: false },
        |_| Ok(scripted(vec![browser("index.html", "i")])),
    )
    .await;

    assert!(session.next().await.unwrap().unwrap().success);
    assert!(!ws.path().join("dist/legacy/index.html").exists());
}

#[tokio::test]
async fn test_cancellation_token_reaches_runner() {
    let ws = TempDir::new().unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let context = context(ws.path()).cancellation(token);

    let mut session = build_application(
        app_options(r#"{"browser": "main.ts"}"#),
        &context,
        InfrastructureSettings::default(),
        |_| Ok(scripted(vec![browser("main.js", "m")])),
    )
    .await;

    assert!(session.next().await.is_none());
    assert!(session.setup_error().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_stream_runs_on_spawned_task() {
    let ws = TempDir::new().unwrap();
    let options: LegacyBrowserOptions =
        serde_json::from_str(r#"{"main": "src/main.ts", "outputPath": "dist/legacy"}"#).unwrap();

    let session = build_legacy_browser(
        options,
        &context(ws.path()),
        InfrastructureSettings::default(),
        |_| Ok(scripted(vec![browser("index.html", "i")])),
    )
    .await;

    let outcomes = tokio::spawn(async move { session.into_stream().collect::<Vec<_>>().await })
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].as_ref().unwrap().success);
    assert_eq!(list_files(&ws.path().join("dist/legacy")), vec!["index.html"]);
}
