//! In-memory script buffers addressed by `sandbox://<token>`.
//!
//! Buffers are keyed by token in a shared map. Handles carry their own
//! cursor and read or write the shared buffer lazily, so opening a handle
//! never allocates. The store never expires entries on its own; writers
//! remove their token when done (see [`ScriptLease`]).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::{SandboxError, SandboxResult};

/// URI scheme for virtual scripts.
pub const SCHEME: &str = "sandbox";

static GLOBAL: LazyLock<VirtualScriptStore> = LazyLock::new(VirtualScriptStore::new);

/// Build the location of a virtual script.
pub fn script_uri(token: &str) -> String {
    format!("{}://{}", SCHEME, token)
}

/// Extract the token (the host component) from a `sandbox://` URI.
pub fn parse_uri(uri: &str) -> SandboxResult<String> {
    let rest = uri
        .split_once("://")
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(SCHEME))
        .map(|(_, rest)| rest)
        .ok_or_else(|| SandboxError::InvalidUri(uri.to_string()))?;

    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    if host.is_empty() {
        return Err(SandboxError::InvalidUri(uri.to_string()));
    }
    Ok(host.to_string())
}

/// Origin for [`ScriptHandle::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute position.
    Set,
    /// Relative to the cursor.
    Current,
    /// Relative to the end of the buffer.
    End,
}

/// Process-wide map from token to script bytes.
///
/// Thread-safe via internal `RwLock`. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct VirtualScriptStore {
    scripts: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl VirtualScriptStore {
    /// Create an independent, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The store shared by the whole process.
    pub fn global() -> &'static VirtualScriptStore {
        &GLOBAL
    }

    /// Open a handle on `sandbox://<token>`. The cursor starts at 0.
    pub fn open(&self, uri: &str) -> SandboxResult<ScriptHandle> {
        let token = parse_uri(uri)?;
        Ok(self.handle(token, false))
    }

    fn handle(&self, token: String, attached: bool) -> ScriptHandle {
        ScriptHandle {
            store: self.clone(),
            token,
            cursor: 0,
            attached,
        }
    }

    /// Claim `token` with an empty buffer.
    ///
    /// Returns `None` if the token is already in use. The returned lease
    /// removes the entry when dropped.
    pub fn reserve(&self, token: &str) -> Option<ScriptLease> {
        #[allow(clippy::expect_used)]
        let mut scripts = self.scripts.write().expect("script store poisoned");
        if scripts.contains_key(token) {
            return None;
        }
        scripts.insert(token.to_string(), Vec::new());
        Some(ScriptLease {
            store: self.clone(),
            token: token.to_string(),
        })
    }

    /// Remove a token's buffer. Returns true if it existed.
    pub fn remove(&self, token: &str) -> bool {
        #[allow(clippy::expect_used)]
        let mut scripts = self.scripts.write().expect("script store poisoned");
        scripts.remove(token).is_some()
    }

    pub fn contains(&self, token: &str) -> bool {
        #[allow(clippy::expect_used)]
        let scripts = self.scripts.read().expect("script store poisoned");
        scripts.contains_key(token)
    }

    /// Number of live buffers.
    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let scripts = self.scripts.read().expect("script store poisoned");
        scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn buffer_len(&self, token: &str) -> usize {
        #[allow(clippy::expect_used)]
        let scripts = self.scripts.read().expect("script store poisoned");
        scripts.get(token).map(Vec::len).unwrap_or(0)
    }
}

/// Seekable stream over one virtual script.
#[derive(Debug)]
pub struct ScriptHandle {
    store: VirtualScriptStore,
    token: String,
    cursor: usize,
    /// Set once the handle has seen its buffer. A removed buffer is never
    /// recreated by an attached handle.
    attached: bool,
}

impl ScriptHandle {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Read up to `count` bytes from the cursor.
    pub fn read(&mut self, count: usize) -> Vec<u8> {
        #[allow(clippy::expect_used)]
        let scripts = self.store.scripts.read().expect("script store poisoned");
        let Some(buffer) = scripts.get(&self.token) else {
            return Vec::new();
        };
        self.attached = true;

        let start = self.cursor.min(buffer.len());
        let end = start.saturating_add(count).min(buffer.len());
        let chunk = buffer[start..end].to_vec();
        self.cursor += chunk.len();
        chunk
    }

    /// Splice `data` into the buffer at the cursor, overwriting and extending.
    ///
    /// The first write through a fresh handle creates the buffer. Once the
    /// buffer has been removed, writes are refused and return 0.
    pub fn write(&mut self, data: &[u8]) -> usize {
        #[allow(clippy::expect_used)]
        let mut scripts = self.store.scripts.write().expect("script store poisoned");
        let buffer = match scripts.entry(self.token.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(_) if self.attached => return 0,
            Entry::Vacant(entry) => entry.insert(Vec::new()),
        };
        self.attached = true;

        let start = self.cursor.min(buffer.len());
        let end = (start + data.len()).min(buffer.len());
        buffer.splice(start..end, data.iter().copied());

        self.cursor = start + data.len();
        data.len()
    }

    /// Move the cursor. Fails, leaving the cursor alone, if the target is
    /// negative or past the end of the buffer.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> bool {
        let len = self.store.buffer_len(&self.token) as i64;
        let target = match whence {
            Whence::Set => Some(offset),
            Whence::Current => (self.cursor as i64).checked_add(offset),
            Whence::End => len.checked_add(offset),
        };

        match target {
            Some(pos) if (0..=len).contains(&pos) => {
                self.cursor = pos as usize;
                true
            }
            _ => false,
        }
    }

    pub fn tell(&self) -> usize {
        self.cursor
    }

    pub fn eof(&self) -> bool {
        self.cursor >= self.store.buffer_len(&self.token)
    }
}

impl io::Read for ScriptHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = ScriptHandle::read(self, buf.len());
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

impl io::Write for ScriptHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(ScriptHandle::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for ScriptHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                Whence::Set,
            ),
            io::SeekFrom::Current(n) => (n, Whence::Current),
            io::SeekFrom::End(n) => (n, Whence::End),
        };

        if ScriptHandle::seek(self, offset, whence) {
            Ok(self.cursor as u64)
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek out of bounds in {}", script_uri(&self.token)),
            ))
        }
    }
}

/// Scoped ownership of a store entry; removes it on drop.
#[derive(Debug)]
pub struct ScriptLease {
    store: VirtualScriptStore,
    token: String,
}

impl ScriptLease {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Location to hand to a source provider.
    pub fn uri(&self) -> String {
        script_uri(&self.token)
    }

    /// A fresh handle positioned at 0.
    pub fn handle(&self) -> ScriptHandle {
        self.store.handle(self.token.clone(), true)
    }
}

impl Drop for ScriptLease {
    fn drop(&mut self) {
        self.store.remove(&self.token);
    }
}
