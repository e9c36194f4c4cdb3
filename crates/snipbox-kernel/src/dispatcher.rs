//! Execution dispatcher: the three ways to run a snippet.
//!
//! | mode       | where it runs          | output        | failures                      |
//! |------------|------------------------|---------------|-------------------------------|
//! | inline     | host [`Evaluator`]     | captured      | evaluator's own error         |
//! | subprocess | interpreter child      | child stdout  | stderr classified             |
//! | background | detached child         | none          | only a failure to start       |

use std::io;
use std::path::PathBuf;

use anyhow::Context;

use snipbox_types::{Bindings, ExecutionMode, ExecutionRequest, ExecutionResult};

use crate::capture::OutputStack;
use crate::classifier::Classifier;
use crate::config::{InlineStaging, SandboxConfig, SubprocessStaging};
use crate::error::{InlineError, SandboxError, SandboxResult};
use crate::evaluator::{Evaluator, InlineScope, ScriptInput};
use crate::process::{self, Invocation};
use crate::stager::{CodeStager, CodeUnit, unique_token};
use crate::staging::{StagedScript, StagingDir};
use crate::store::{FileSource, ScriptLease, SourceProvider, VirtualScriptStore, VirtualSource};

/// Token mint attempts before giving up on a collision streak.
const MAX_TOKEN_ATTEMPTS: usize = 8;

/// Runs snippets inline, in a subprocess, or in the background.
#[derive(Debug)]
pub struct Dispatcher {
    config: SandboxConfig,
    program: PathBuf,
    stager: CodeStager,
    classifier: Classifier,
    store: VirtualScriptStore,
    staging: StagingDir,
    output: OutputStack,
}

impl Dispatcher {
    /// Create a dispatcher backed by the process-wide script store.
    pub fn new(config: SandboxConfig) -> anyhow::Result<Self> {
        let classifier = Classifier::from_patterns(&config.diagnostics)
            .context("Invalid diagnostic pattern in config")?;
        let program = config.interpreter.resolve_binary();
        let staging = StagingDir::new(config.staging_dir(), config.interpreter.extension.clone());

        tracing::debug!(
            interpreter = %program.display(),
            staging = %staging.path().display(),
            "dispatcher ready"
        );

        Ok(Self {
            stager: CodeStager::new(&config.interpreter),
            classifier,
            program,
            store: VirtualScriptStore::global().clone(),
            staging,
            output: OutputStack::new(),
            config,
        })
    }

    /// Use a private script store instead of the process-wide one.
    pub fn with_store(mut self, store: VirtualScriptStore) -> Self {
        self.store = store;
        self
    }

    /// Share an existing output stack with the host.
    pub fn with_output(mut self, output: OutputStack) -> Self {
        self.output = output;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Interpreter binary used for subprocess and background runs.
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    pub fn store(&self) -> &VirtualScriptStore {
        &self.store
    }

    /// The output stack inline evaluations write into.
    pub fn output(&self) -> &OutputStack {
        &self.output
    }

    pub fn stager(&self) -> &CodeStager {
        &self.stager
    }

    /// The most recently normalized code.
    pub fn last_code(&self) -> Option<String> {
        self.stager.last_code()
    }

    /// Run a request. Inline requests need an evaluator; see [`Dispatcher::execute_with`].
    ///
    /// Returns `None` for background runs, which produce no output.
    #[tracing::instrument(level = "info", skip(self, request), fields(mode = %request.mode, code_len = request.code.len()), err)]
    pub async fn execute(&self, request: &ExecutionRequest) -> SandboxResult<Option<ExecutionResult>> {
        match request.mode {
            ExecutionMode::Inline => Err(SandboxError::InlineUnsupported),
            ExecutionMode::Subprocess => self
                .subprocess(&request.code, &request.bindings, request.enable_diagnostics)
                .await
                .map(|out| Some(out.into())),
            ExecutionMode::Background => self
                .background(&request.code, &request.bindings, request.enable_diagnostics, request.wait_for_completion)
                .await
                .map(|()| None),
        }
    }

    /// Run a request, using `evaluator` for inline mode.
    pub async fn execute_with<E: Evaluator>(
        &self,
        request: &ExecutionRequest,
        evaluator: &mut E,
    ) -> Result<Option<ExecutionResult>, InlineError<E::Error>> {
        match request.mode {
            ExecutionMode::Inline => self
                .inline(&request.code, &request.bindings, request.enable_diagnostics, evaluator)
                .await
                .map(|out| Some(out.into())),
            _ => Ok(self.execute(request).await?),
        }
    }

    /// Run `code` inside the host runtime and return what it printed.
    ///
    /// Definitions made by the snippet persist in `evaluator`. The caller's
    /// pending output is set aside during the run and restored afterwards,
    /// whatever the outcome.
    pub async fn run_inline<E: Evaluator>(
        &self,
        code: &str,
        bindings: &Bindings,
        evaluator: &mut E,
    ) -> Result<String, InlineError<E::Error>> {
        self.inline(code, bindings, false, evaluator).await
    }

    /// Run `code` in a fresh interpreter and return its stdout.
    ///
    /// Anything the interpreter logs on stderr fails the run with a
    /// classified [`SandboxError::Diagnostic`].
    pub async fn run_subprocess(&self, code: &str, bindings: &Bindings) -> SandboxResult<String> {
        self.subprocess(code, bindings, false).await
    }

    /// Start `code` in a detached interpreter. With `wait`, block until it exits.
    pub async fn run_background(&self, code: &str, bindings: &Bindings, wait: bool) -> SandboxResult<()> {
        self.background(code, bindings, false, wait).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(mode = "inline", token = tracing::field::Empty))]
    async fn inline<E: Evaluator>(
        &self,
        code: &str,
        bindings: &Bindings,
        enable_diagnostics: bool,
        evaluator: &mut E,
    ) -> Result<String, InlineError<E::Error>> {
        let unit = self.stager.stage(code, enable_diagnostics, true);
        let scope = InlineScope {
            bindings,
            output: &self.output,
        };

        match self.config.inline_staging {
            InlineStaging::Virtual => {
                // The lease outlives the evaluation and removes the script on every path.
                let lease = self.lease_script(&unit)?;
                tracing::Span::current().record("token", lease.token());
                let uri = lease.uri();
                let provider = VirtualSource::new(self.store.clone());
                self.evaluate_captured(evaluator, &uri, &provider, &scope).await
            }
            InlineStaging::Disk => {
                let staged = self.stage_file(&unit).await?;
                let location = staged.path().display().to_string();
                let provider = FileSource::rooted(self.staging.path());
                self.evaluate_captured(evaluator, &location, &provider, &scope).await
            }
        }
    }

    async fn evaluate_captured<E: Evaluator>(
        &self,
        evaluator: &mut E,
        location: &str,
        provider: &dyn SourceProvider,
        scope: &InlineScope<'_>,
    ) -> Result<String, InlineError<E::Error>> {
        let frame = self.output.capture();
        let outcome = evaluator
            .evaluate(ScriptInput::Location { location, provider }, scope)
            .await;
        let captured = frame.finish();

        outcome.map_err(InlineError::Native)?;
        tracing::debug!(captured = captured.len(), "inline evaluation done");
        Ok(String::from_utf8_lossy(&captured).into_owned())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(mode = "subprocess"))]
    async fn subprocess(&self, code: &str, bindings: &Bindings, enable_diagnostics: bool) -> SandboxResult<String> {
        let unit = self.stager.stage(code, enable_diagnostics, true);
        let mut invocation = self.invocation(bindings);
        if self.config.use_staging_cwd {
            invocation.cwd = Some(self.staging.ensure().await?.to_path_buf());
        }

        // Held until the child is gone; removes the staged file on every path.
        let mut staged: Option<StagedScript> = None;
        let input = match self.config.subprocess_staging {
            SubprocessStaging::Pipe => Some(unit.normalized_source.as_bytes()),
            SubprocessStaging::Disk => {
                let script = self.stage_file(&unit).await?;
                invocation.args.push(script.path().as_os_str().to_owned());
                staged = Some(script);
                None
            }
        };

        let output = process::run_piped(&invocation, input).await?;
        drop(staged);

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(
            status = %output.status,
            stdout = stdout.len(),
            stderr = stderr.len(),
            "interpreter exited"
        );

        match self.classifier.classify(&stderr) {
            Some(diagnostic) => {
                tracing::debug!(kind = %diagnostic.kind, code = diagnostic.code(), "interpreter reported a diagnostic");
                Err(diagnostic.into())
            }
            None => Ok(stdout),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(mode = "background", wait))]
    async fn background(
        &self,
        code: &str,
        bindings: &Bindings,
        enable_diagnostics: bool,
        wait: bool,
    ) -> SandboxResult<()> {
        let unit = self.stager.stage(code, enable_diagnostics, false);
        let invocation = self
            .invocation(bindings)
            .arg(&self.config.interpreter.run_flag)
            .arg(&unit.normalized_source);

        process::spawn_detached(&invocation, wait).await
    }

    fn invocation(&self, bindings: &Bindings) -> Invocation {
        let mut invocation = Invocation::new(&self.program);
        invocation.args = self.config.interpreter.args.iter().map(Into::into).collect();
        invocation.env = bindings.clone();
        invocation.clear_env = self.config.clear_env;
        invocation
    }

    /// Write the unit into the store under a token no other run holds.
    fn lease_script(&self, unit: &CodeUnit) -> SandboxResult<ScriptLease> {
        let mut token = unit.token.clone();
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            if let Some(lease) = self.store.reserve(&token) {
                lease.handle().write(unit.normalized_source.as_bytes());
                return Ok(lease);
            }
            tracing::warn!("Script token {} already in use, minting another", token);
            token = unique_token(Some(&unit.raw_source));
        }
        Err(SandboxError::TokenExhausted)
    }

    /// Write the unit to the staging directory under a fresh file name.
    async fn stage_file(&self, unit: &CodeUnit) -> SandboxResult<StagedScript> {
        let mut token = unit.token.clone();
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            match self.staging.stage(&token, &unit.normalized_source).await {
                Err(SandboxError::Io { source, .. }) if source.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::warn!("Staged script {} already exists, minting another", token);
                    token = unique_token(Some(&unit.raw_source));
                }
                other => return other,
            }
        }
        Err(SandboxError::TokenExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRuntime;

    fn dispatcher(dir: &std::path::Path) -> Dispatcher {
        let config = SandboxConfig::default()
            .with_cache_dir(dir)
            .with_interpreter("/nonexistent/php");
        Dispatcher::new(config)
            .unwrap()
            .with_store(VirtualScriptStore::new())
    }

    #[tokio::test]
    async fn inline_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut runtime = ScriptedRuntime::new();

        let out = d.run_inline("echo 3 * 2;", &Bindings::new(), &mut runtime).await.unwrap();
        assert_eq!(out, "6");
        assert_eq!(d.last_code().as_deref(), Some("<?php echo 3 * 2;"));
        assert!(d.store().is_empty());
        assert_eq!(runtime.evaluations(), 1);
    }

    #[tokio::test]
    async fn inline_reads_bindings_from_scope() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut runtime = ScriptedRuntime::new();
        let mut bindings = Bindings::new();
        bindings.insert("arg1".to_string(), "7".to_string());

        let out = d.run_inline("echo $arg1 * 3;", &bindings, &mut runtime).await.unwrap();
        assert_eq!(out, "21");
    }

    #[tokio::test]
    async fn inline_failure_is_native_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut runtime = ScriptedRuntime::new();

        let err = d
            .run_inline("echo 1; throw boom;", &Bindings::new(), &mut runtime)
            .await
            .unwrap_err();
        let native = err.into_native().unwrap();
        assert_eq!(native.to_string(), "uncaught: boom");
        assert!(d.store().is_empty());
        assert_eq!(d.output().depth(), 0);
    }

    #[tokio::test]
    async fn inline_from_disk_staging() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SandboxConfig::default().with_cache_dir(dir.path());
        config.inline_staging = InlineStaging::Disk;
        let d = Dispatcher::new(config).unwrap().with_store(VirtualScriptStore::new());
        let mut runtime = ScriptedRuntime::new();

        let out = d.run_inline("echo 4 * 4;", &Bindings::new(), &mut runtime).await.unwrap();
        assert_eq!(out, "16");
        let leftover = std::fs::read_dir(dir.path().join("staging")).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn inline_request_without_evaluator_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let request = ExecutionRequest::new("echo 1;").mode(ExecutionMode::Inline);
        let err = d.execute(&request).await.unwrap_err();
        assert!(matches!(err, SandboxError::InlineUnsupported));
    }

    #[tokio::test]
    async fn missing_interpreter_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());

        let err = d.run_subprocess("echo 1;", &Bindings::new()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));

        let err = d.run_background("echo 1;", &Bindings::new(), false).await.unwrap_err();
        assert!(matches!(err, SandboxError::ForkFailed { .. }));
    }

    #[tokio::test]
    async fn background_does_not_force_entry_marker() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let _ = d.run_background("echo 1;", &Bindings::new(), false).await;
        assert_eq!(d.last_code().as_deref(), Some("echo 1;"));
    }

    #[tokio::test]
    async fn colliding_token_is_reminted() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let unit = CodeUnit {
            raw_source: "echo 1;".to_string(),
            normalized_source: "<?php echo 1;".to_string(),
            token: "taken".to_string(),
        };
        let _held = d.store().reserve("taken").unwrap();

        let lease = d.lease_script(&unit).unwrap();
        assert_ne!(lease.token(), "taken");
        assert_eq!(lease.handle().read(64), b"<?php echo 1;");
    }
}
