//! Inline execution through a host evaluator.
//!
//! These run against the scripted test runtime, so no interpreter is needed.

use snipbox_kernel::store::parse_uri;
use snipbox_kernel::testing::{ScriptError, ScriptedRuntime};
use snipbox_kernel::{
    Bindings, Dispatcher, ExecutionMode, ExecutionRequest, InlineError, OutputStack,
    SandboxConfig, VirtualScriptStore,
};

fn dispatcher(cache: &tempfile::TempDir) -> Dispatcher {
    Dispatcher::new(SandboxConfig::default().with_cache_dir(cache.path()))
        .expect("Failed to create dispatcher")
        .with_store(VirtualScriptStore::new())
}

// ============================================================================
// Results
// ============================================================================

#[tokio::test]
async fn inline_arithmetic() {
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&cache);
    let mut runtime = ScriptedRuntime::new();

    let out = d.run_inline("echo 3 * 2;", &Bindings::new(), &mut runtime).await.unwrap();
    assert_eq!(out, "6");
}

#[tokio::test]
async fn inline_includes_through_virtual_location() {
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&cache);
    let mut runtime = ScriptedRuntime::new();

    d.run_inline("echo 1;", &Bindings::new(), &mut runtime).await.unwrap();

    let location = runtime.last_location().expect("inline runs by location");
    let token = parse_uri(location).unwrap();
    assert_eq!(token.len(), snipbox_kernel::stager::TOKEN_LEN);
    // Gone once the run is over.
    assert!(!d.store().contains(&token));
}

#[tokio::test]
async fn inline_definitions_persist_in_runtime() {
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&cache);
    let mut runtime = ScriptedRuntime::new();
    let none = Bindings::new();

    d.run_inline("const SIDE = 5;", &none, &mut runtime).await.unwrap();
    assert_eq!(d.run_inline("echo SIDE * SIDE;", &none, &mut runtime).await.unwrap(), "25");

    // A second declaration collides with the first, like redefining a function would.
    let err = d.run_inline("const SIDE = 6;", &none, &mut runtime).await.unwrap_err();
    assert_eq!(err.into_native(), Some(ScriptError::Redeclared("SIDE".to_string())));
}

#[tokio::test]
async fn inline_bindings_are_scoped_to_one_run() {
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&cache);
    let mut runtime = ScriptedRuntime::new();

    let mut bindings = Bindings::new();
    bindings.insert("arg1".to_string(), "3".to_string());
    bindings.insert("arg2".to_string(), "6".to_string());
    let out = d.run_inline("echo $arg1 * $arg2;", &bindings, &mut runtime).await.unwrap();
    assert_eq!(out, "18");

    let err = d.run_inline("echo $arg1;", &Bindings::new(), &mut runtime).await.unwrap_err();
    assert!(matches!(err, InlineError::Native(ScriptError::Undefined(_))));
}

#[tokio::test]
async fn inline_request_through_execute_with() {
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&cache);
    let mut runtime = ScriptedRuntime::new();

    let request = ExecutionRequest::new("echo $n * 2;")
        .bind("n", "21")
        .mode(ExecutionMode::Inline);
    let result = d.execute_with(&request, &mut runtime).await.unwrap().unwrap();
    assert_eq!(result.captured_output, "42");
}

// ============================================================================
// Caller's capture frame
// ============================================================================

#[tokio::test]
async fn caller_frame_survives_success() {
    let cache = tempfile::tempdir().unwrap();
    let output = OutputStack::new();
    let d = dispatcher(&cache).with_output(output.clone());
    let mut runtime = ScriptedRuntime::new();

    output.push();
    output.echo("A");

    let out = d.run_inline("echo 'inner';", &Bindings::new(), &mut runtime).await.unwrap();
    assert_eq!(out, "inner");
    assert_eq!(output.depth(), 1);
    assert_eq!(output.contents_string().as_deref(), Some("A"));
}

#[tokio::test]
async fn caller_frame_survives_failure() {
    let cache = tempfile::tempdir().unwrap();
    let output = OutputStack::new();
    let d = dispatcher(&cache).with_output(output.clone());
    let mut runtime = ScriptedRuntime::new();

    output.push();
    output.echo("A");

    let err = d
        .run_inline("echo 'partial'; throw failed;", &Bindings::new(), &mut runtime)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "uncaught: failed");
    assert_eq!(output.depth(), 1);
    assert_eq!(output.contents_string().as_deref(), Some("A"));
    assert!(d.store().is_empty());
}

#[tokio::test]
async fn caller_keeps_writing_after_inline() {
    let cache = tempfile::tempdir().unwrap();
    let output = OutputStack::new();
    let d = dispatcher(&cache).with_output(output.clone());
    let mut runtime = ScriptedRuntime::new();

    output.push();
    output.echo("A");
    d.run_inline("echo 2;", &Bindings::new(), &mut runtime).await.unwrap();
    output.echo("B");
    assert_eq!(output.pop().unwrap(), b"AB");
}

#[tokio::test]
async fn runtime_overflow_is_an_error_not_a_panic() {
    let cache = tempfile::tempdir().unwrap();
    let output = OutputStack::new();
    let d = dispatcher(&cache).with_output(output.clone());
    let mut runtime = ScriptedRuntime::new();

    output.push();
    output.echo("A");
    let err = d
        .run_inline("echo 9999999999 * 9999999999;", &Bindings::new(), &mut runtime)
        .await
        .unwrap_err();
    assert!(matches!(err, InlineError::Native(ScriptError::Overflow(_))));
    assert_eq!(output.contents_string().as_deref(), Some("A"));
    assert!(d.store().is_empty());
}

#[tokio::test]
async fn quoted_semicolons_survive_staging() {
    let cache = tempfile::tempdir().unwrap();
    let d = dispatcher(&cache);
    let mut runtime = ScriptedRuntime::new();

    let out = d.run_inline("echo 'a;b';", &Bindings::new(), &mut runtime).await.unwrap();
    assert_eq!(out, "a;b");
}
