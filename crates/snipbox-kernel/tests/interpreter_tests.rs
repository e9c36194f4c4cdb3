//! Subprocess and background execution against a real `php` binary.
//!
//! Each test returns early when no interpreter is installed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use snipbox_kernel::process::which;
use snipbox_kernel::{
    Bindings, DiagnosticKind, Dispatcher, ExecutionMode, ExecutionRequest, SandboxConfig,
    SandboxError, SubprocessStaging,
};

fn php() -> Option<PathBuf> {
    let found = which("php");
    if found.is_none() {
        eprintln!("php not found in PATH, skipping");
    }
    found
}

fn dispatcher(php: &Path, cache: &Path) -> Dispatcher {
    let config = SandboxConfig::default()
        .with_cache_dir(cache)
        .with_interpreter(php);
    Dispatcher::new(config).expect("Failed to create dispatcher")
}

fn bindings(pairs: &[(&str, &str)]) -> Bindings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn diagnostic_kind(err: &SandboxError) -> DiagnosticKind {
    err.diagnostic()
        .unwrap_or_else(|| panic!("expected a diagnostic, got {err}"))
        .kind
}

// ============================================================================
// Subprocess
// ============================================================================

#[tokio::test]
async fn subprocess_reads_bindings_from_environment() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());

    let out = d
        .run_subprocess(
            "echo (int)$_SERVER['arg1'] * (int)$_SERVER['arg2'];",
            &bindings(&[("arg1", "3"), ("arg2", "6")]),
        )
        .await
        .unwrap();
    assert_eq!(out, "18");
}

#[tokio::test]
async fn subprocess_undefined_variable_is_reported() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());

    let err = d
        .run_subprocess("echo $undefinedArray[0];", &Bindings::new())
        .await
        .unwrap_err();
    // PHP 7 reports a notice, PHP 8 a warning.
    let kind = diagnostic_kind(&err);
    assert!(
        matches!(kind, DiagnosticKind::Notice | DiagnosticKind::Warning),
        "unexpected kind {kind:?}: {err}"
    );
}

#[tokio::test]
async fn subprocess_undefined_function_is_fatal() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());

    let err = d
        .run_subprocess("call_to_undefined_function();", &Bindings::new())
        .await
        .unwrap_err();
    assert_eq!(diagnostic_kind(&err), DiagnosticKind::FatalError);
    assert_eq!(err.code(), Some(2));
}

#[tokio::test]
async fn subprocess_syntax_error_is_parse_error() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());

    let err = d.run_subprocess("x x x", &Bindings::new()).await.unwrap_err();
    assert_eq!(diagnostic_kind(&err), DiagnosticKind::ParseError);
    assert_eq!(err.code(), Some(1));
}

#[tokio::test]
async fn subprocess_definitions_do_not_leak() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());
    let none = Bindings::new();

    d.run_subprocess("function leaked() { return 1; }", &none).await.unwrap();
    // Defining it again in a fresh process is fine.
    d.run_subprocess("function leaked() { return 1; }", &none).await.unwrap();
    let err = d.run_subprocess("echo leaked();", &none).await.unwrap_err();
    assert_eq!(diagnostic_kind(&err), DiagnosticKind::FatalError);
}

#[tokio::test]
async fn subprocess_from_staged_file() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let mut config = SandboxConfig::default()
        .with_cache_dir(cache.path())
        .with_interpreter(&php);
    config.subprocess_staging = SubprocessStaging::Disk;
    let d = Dispatcher::new(config).unwrap();

    let out = d.run_subprocess("echo 'staged';", &Bindings::new()).await.unwrap();
    assert_eq!(out, "staged");

    let err = d.run_subprocess("x x x", &Bindings::new()).await.unwrap_err();
    assert_eq!(diagnostic_kind(&err), DiagnosticKind::ParseError);

    let leftover = std::fs::read_dir(cache.path().join("staging")).unwrap().count();
    assert_eq!(leftover, 0, "staged scripts are removed");
}

#[tokio::test]
async fn subprocess_diagnostics_directive() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());

    let request = ExecutionRequest::new("echo ini_get('display_errors');").diagnostics(true);
    let result = d.execute(&request).await.unwrap().unwrap();
    assert_eq!(result.captured_output, "1");
}

// ============================================================================
// Background
// ============================================================================

const WRITE_INDEX: &str =
    "file_put_contents($_SERVER['writeDir'] . '/' . $_SERVER['index'] . '.txt', $_SERVER['index']);";

#[tokio::test]
async fn background_runs_detached() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());
    let write_dir = out.path().display().to_string();

    for index in 0..10 {
        let index = index.to_string();
        d.run_background(
            WRITE_INDEX,
            &bindings(&[("index", &index), ("writeDir", &write_dir)]),
            false,
        )
        .await
        .unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let all_written = || {
        (0..10).all(|i| {
            std::fs::read_to_string(out.path().join(format!("{i}.txt")))
                .map(|content| content == i.to_string())
                .unwrap_or(false)
        })
    };
    while !all_written() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "background children did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn background_wait_blocks_until_exit() {
    let Some(php) = php() else { return };
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let d = dispatcher(&php, cache.path());

    let request = ExecutionRequest::new(WRITE_INDEX)
        .bind("index", "7")
        .bind("writeDir", out.path().display().to_string())
        .mode(ExecutionMode::Background)
        .wait(true);
    assert!(d.execute(&request).await.unwrap().is_none());
    assert_eq!(std::fs::read_to_string(out.path().join("7.txt")).unwrap(), "7");
}
