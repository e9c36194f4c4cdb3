//! snipbox CLI entry point.
//!
//! Usage:
//!   snipbox -c <code>               # Run a snippet in a fresh interpreter
//!   snipbox script.php              # Run a file's contents
//!   snipbox --background -c <code>  # Start it detached

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use snipbox_kernel::{Dispatcher, SandboxConfig, SandboxError};
use snipbox_types::{ExecutionMode, ExecutionRequest};

/// Exit status for a run that ended in a diagnostic.
const EXIT_DIAGNOSTIC: u8 = 1;
/// Exit status for bad arguments.
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var); stdout carries snippet output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match Options::parse(&args) {
        Ok(Parsed::Run(options)) => options,
        Ok(Parsed::Help) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Ok(Parsed::Version) => {
            println!(
                "snipbox {} ({} {})",
                env!("CARGO_PKG_VERSION"),
                env!("SNIPBOX_GIT_DESCRIBE"),
                env!("SNIPBOX_BUILD_DATE")
            );
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run 'snipbox --help' for usage.");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(options) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!(
        r#"snipbox v{}

Usage:
  snipbox [OPTIONS] -c <code>      Run a snippet
  snipbox [OPTIONS] <file>         Run the contents of a file

Options:
  -c <code>                        Code to run
  --background                     Run detached, print nothing
  --wait                           With --background, wait for the child to exit
  -D, --bind <name=value>          Add a binding (repeatable)
  --diagnostics                    Turn on full diagnostic reporting in the snippet
  --config <path>                  Load this config file instead of the default
  --json                           Print the outcome as JSON
  -h, --help                       Show this help
  -V, --version                    Show version

Examples:
  snipbox -c 'echo 3 * 2;'
  snipbox -D arg1=3 -D arg2=6 -c 'echo $_SERVER["arg1"] * $_SERVER["arg2"];'
  snipbox --background --wait job.php
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Parsed command line for a run.
#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    code: Option<String>,
    file: Option<PathBuf>,
    background: bool,
    wait: bool,
    bindings: Vec<(String, String)>,
    diagnostics: bool,
    config: Option<PathBuf>,
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Parsed {
    Run(Options),
    Help,
    Version,
}

impl Options {
    fn parse(args: &[String]) -> Result<Parsed> {
        let mut options = Options::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Parsed::Help),
                "-V" | "--version" => return Ok(Parsed::Version),
                "-c" => {
                    let code = iter.next().context("-c requires a code argument")?;
                    options.code = Some(code.clone());
                }
                "--background" => options.background = true,
                "--wait" => options.wait = true,
                "--diagnostics" => options.diagnostics = true,
                "--json" => options.json = true,
                "-D" | "--bind" => {
                    let pair = iter.next().with_context(|| format!("{arg} requires name=value"))?;
                    options.bindings.push(parse_binding(pair)?);
                }
                "--config" => {
                    let path = iter.next().context("--config requires a path")?;
                    options.config = Some(PathBuf::from(path));
                }
                _ if arg.starts_with("--bind=") => {
                    options.bindings.push(parse_binding(&arg["--bind=".len()..])?);
                }
                _ if arg.starts_with("--config=") => {
                    options.config = Some(PathBuf::from(&arg["--config=".len()..]));
                }
                _ if arg.starts_with('-') => bail!("Unknown option: {arg}"),
                path => {
                    if options.file.is_some() {
                        bail!("Only one script file may be given");
                    }
                    options.file = Some(PathBuf::from(path));
                }
            }
        }

        match (&options.code, &options.file) {
            (None, None) => bail!("Nothing to run: pass -c <code> or a file"),
            (Some(_), Some(_)) => bail!("Pass either -c <code> or a file, not both"),
            _ => {}
        }
        if options.wait && !options.background {
            bail!("--wait only applies with --background");
        }

        Ok(Parsed::Run(options))
    }

    fn mode(&self) -> ExecutionMode {
        if self.background {
            ExecutionMode::Background
        } else {
            ExecutionMode::Subprocess
        }
    }
}

fn parse_binding(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => bail!("Invalid binding '{pair}', expected name=value"),
    }
}

fn run(options: Options) -> Result<ExitCode> {
    let config = match &options.config {
        Some(path) => SandboxConfig::load_from(path)?,
        None => SandboxConfig::load()?,
    };

    let code = match (&options.code, &options.file) {
        (Some(code), _) => code.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?,
        (None, None) => bail!("Nothing to run"),
    };

    let mut request = ExecutionRequest::new(code)
        .mode(options.mode())
        .diagnostics(options.diagnostics)
        .wait(options.wait);
    for (name, value) in &options.bindings {
        request = request.bind(name, value);
    }

    let dispatcher = Dispatcher::new(config).context("Failed to create dispatcher")?;
    tracing::debug!(mode = %request.mode, bindings = request.bindings.len(), "running snippet");
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(dispatcher.execute(&request));

    match outcome {
        Ok(result) => {
            let output = result.map(|r| r.captured_output).unwrap_or_default();
            if options.json {
                println!("{}", json!({ "output": output }));
            } else {
                print!("{output}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(SandboxError::Diagnostic(diagnostic)) => {
            if options.json {
                println!(
                    "{}",
                    json!({
                        "error": diagnostic.message,
                        "kind": diagnostic.kind,
                        "code": diagnostic.code(),
                        "log": diagnostic.raw_log,
                    })
                );
            } else {
                eprintln!("{} [{}]", diagnostic, diagnostic.code());
                if diagnostic.raw_log.trim() != diagnostic.message {
                    eprint!("{}", diagnostic.raw_log);
                }
            }
            Ok(ExitCode::from(EXIT_DIAGNOSTIC))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn parse_run(list: &[&str]) -> Options {
        match Options::parse(&args(list)).unwrap() {
            Parsed::Run(options) => options,
            other => panic!("expected a run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_code() {
        let options = parse_run(&["-c", "echo 1;"]);
        assert_eq!(options.code.as_deref(), Some("echo 1;"));
        assert_eq!(options.mode(), ExecutionMode::Subprocess);
    }

    #[test]
    fn test_parse_everything() {
        let options = parse_run(&[
            "--background",
            "--wait",
            "-D",
            "a=1",
            "--bind=b=x=y",
            "--diagnostics",
            "--config=/tmp/s.toml",
            "--json",
            "job.php",
        ]);
        assert_eq!(options.mode(), ExecutionMode::Background);
        assert!(options.wait && options.diagnostics && options.json);
        assert_eq!(
            options.bindings,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x=y".to_string())
            ]
        );
        assert_eq!(options.config, Some(PathBuf::from("/tmp/s.toml")));
        assert_eq!(options.file, Some(PathBuf::from("job.php")));
    }

    #[test]
    fn test_parse_help_and_version() {
        assert_eq!(Options::parse(&args(&["-h"])).unwrap(), Parsed::Help);
        assert_eq!(Options::parse(&args(&["-c", "x", "--version"])).unwrap(), Parsed::Version);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Options::parse(&args(&[])).is_err());
        assert!(Options::parse(&args(&["-c"])).is_err());
        assert!(Options::parse(&args(&["-c", "x", "file.php"])).is_err());
        assert!(Options::parse(&args(&["-c", "x", "--wait"])).is_err());
        assert!(Options::parse(&args(&["-c", "x", "-D", "novalue"])).is_err());
        assert!(Options::parse(&args(&["-c", "x", "--frobnicate"])).is_err());
    }
}
