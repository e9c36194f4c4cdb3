//! Code stager: normalizes snippets and mints script tokens.
//!
//! Every execution goes through [`CodeStager::stage`], which trims the
//! source, optionally injects the interpreter's diagnostics directive, and
//! forces the code-entry marker when the snippet is loaded as a file.
//!
//! Tokens name virtual scripts and staging files. They mix a salt (or the
//! current time) with fresh randomness and hash the pair, so collisions are
//! astronomically unlikely but not impossible. They are not secrets.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::Mutex;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::config::InterpreterProfile;

/// Length of a script token in hex characters.
pub const TOKEN_LEN: usize = 32;

/// One staged execution: raw source, normalized source, token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    pub raw_source: String,
    pub normalized_source: String,
    pub token: String,
}

/// Normalizes source text for one interpreter profile.
#[derive(Debug)]
pub struct CodeStager {
    entry_marker: String,
    diagnostics_directive: String,
    last_code: Mutex<Option<String>>,
}

impl CodeStager {
    pub fn new(profile: &InterpreterProfile) -> Self {
        Self {
            entry_marker: profile.entry_marker.clone(),
            diagnostics_directive: profile.diagnostics_directive.clone(),
            last_code: Mutex::new(None),
        }
    }

    /// Normalize `code`.
    ///
    /// The directive goes first, then the entry marker is forced in front of
    /// everything when it is missing. The result is remembered as the last code.
    pub fn normalize(&self, code: &str, enable_diagnostics: bool, force_entry_marker: bool) -> String {
        let mut normalized = code.trim().to_string();

        if enable_diagnostics && !self.diagnostics_directive.trim().is_empty() {
            normalized = format!("{} {}", self.diagnostics_directive.trim(), normalized);
        }

        if force_entry_marker
            && !self.entry_marker.is_empty()
            && !normalized.contains(&self.entry_marker)
        {
            normalized = format!("{} {}", self.entry_marker, normalized.trim());
        }

        #[allow(clippy::expect_used)]
        let mut last = self.last_code.lock().expect("stager poisoned");
        *last = Some(normalized.clone());

        normalized
    }

    /// Normalize `code` and mint a token for it.
    pub fn stage(&self, code: &str, enable_diagnostics: bool, force_entry_marker: bool) -> CodeUnit {
        CodeUnit {
            raw_source: code.to_string(),
            normalized_source: self.normalize(code, enable_diagnostics, force_entry_marker),
            token: unique_token(None),
        }
    }

    /// The most recently normalized code, for debugging.
    pub fn last_code(&self) -> Option<String> {
        #[allow(clippy::expect_used)]
        let last = self.last_code.lock().expect("stager poisoned");
        last.clone()
    }
}

/// Mint a 32-character hex token from `salt` (or the clock) and fresh randomness.
pub fn unique_token(salt: Option<&str>) -> String {
    let mut digest = Sha256::new();

    match salt {
        Some(salt) if !salt.is_empty() => digest.update(salt.as_bytes()),
        _ => {
            let now = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default();
            digest.update(now.as_nanos().to_le_bytes());
        }
    }
    digest.update(random_u64().to_le_bytes());

    let mut token = String::with_capacity(TOKEN_LEN);
    for byte in digest.finalize().iter().take(TOKEN_LEN / 2) {
        token.push_str(&format!("{:02x}", byte));
    }
    token
}

/// Per-call randomness from two independently seeded `RandomState`s.
fn random_u64() -> u64 {
    let mut hasher = RandomState::new().build_hasher();
    let mut inner = RandomState::new().build_hasher();
    inner.write_u64(0x5eed);
    hasher.write_u64(inner.finish());
    hasher.finish()
}
