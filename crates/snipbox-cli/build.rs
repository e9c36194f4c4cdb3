//! Build script for snipbox-cli.
//!
//! Stamps `--version` with a git description and a build date. The date
//! honours `SOURCE_DATE_EPOCH` so packaged builds are reproducible.

use std::path::PathBuf;
use std::process::Command;

use chrono::{DateTime, Utc};

fn main() {
    println!("cargo::rerun-if-env-changed=SOURCE_DATE_EPOCH");
    if let Some(git_dir) = git(&["rev-parse", "--absolute-git-dir"]).map(PathBuf::from) {
        println!("cargo::rerun-if-changed={}", git_dir.join("HEAD").display());
        println!("cargo::rerun-if-changed={}", git_dir.join("index").display());
    }

    let describe = git(&["describe", "--always", "--dirty", "--abbrev=10"])
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo::rustc-env=SNIPBOX_GIT_DESCRIBE={describe}");
    println!("cargo::rustc-env=SNIPBOX_BUILD_DATE={}", build_date().format("%Y-%m-%d"));
}

/// Run git and return its trimmed stdout, or `None` outside a checkout.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn build_date() -> DateTime<Utc> {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|epoch| epoch.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}
