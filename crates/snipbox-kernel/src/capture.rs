//! Output capture stack for inline executions.
//!
//! The host and the evaluator share one [`OutputStack`]: a cloneable handle
//! to a stack of byte buffers. Writes land in the top frame; with no frame
//! open they are rejected and the host decides where that output goes.
//!
//! ```text
//!   host frame "A" ──suspend──▶ saved "A"
//!                               push ─▶ [inline frame] ◀── evaluator writes
//!                               pop  ─▶ captured output
//!   host frame "A" ◀──resume─── saved "A"
//! ```
//!
//! [`CaptureFrame`] performs that dance and undoes it on drop, so the
//! frames that existed before an inline execution are restored exactly on
//! every exit path.

use std::sync::{Arc, Mutex};

/// Cloneable handle to a stack of capture frames.
#[derive(Debug, Clone, Default)]
pub struct OutputStack {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl OutputStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_frames<R>(&self, f: impl FnOnce(&mut Vec<Vec<u8>>) -> R) -> R {
        #[allow(clippy::expect_used)]
        let mut frames = self.frames.lock().expect("output stack poisoned");
        f(&mut frames)
    }

    /// Open a new, empty frame.
    pub fn push(&self) {
        self.with_frames(|frames| frames.push(Vec::new()));
    }

    /// Close the top frame and return its content.
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.with_frames(|frames| frames.pop())
    }

    /// Append to the top frame. Returns false if no frame is open.
    pub fn write(&self, data: &[u8]) -> bool {
        self.with_frames(|frames| match frames.last_mut() {
            Some(top) => {
                top.extend_from_slice(data);
                true
            }
            None => false,
        })
    }

    /// Append text to the top frame.
    pub fn echo(&self, text: &str) -> bool {
        self.write(text.as_bytes())
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.with_frames(|frames| frames.len())
    }

    /// Content of the top frame, without closing it.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.with_frames(|frames| frames.last().cloned())
    }

    /// Content of the top frame as text.
    pub fn contents_string(&self) -> Option<String> {
        self.contents()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Length of the top frame's content (0 with no frame open).
    pub fn pending_len(&self) -> usize {
        self.with_frames(|frames| frames.last().map(Vec::len).unwrap_or(0))
    }

    /// Start a nested capture. See [`CaptureFrame`].
    pub fn capture(&self) -> CaptureFrame {
        CaptureFrame::open(self.clone())
    }
}

/// A scoped capture frame.
///
/// Opening saves and closes the caller's top frame if it has pending
/// content, then pushes a fresh frame. [`CaptureFrame::finish`] returns what
/// was captured. Dropping (finished or not) unwinds any frames left open
/// above the base depth and reopens the saved frame with its content.
#[derive(Debug)]
pub struct CaptureFrame {
    stack: OutputStack,
    base_depth: usize,
    saved: Option<Vec<u8>>,
    captured: Option<Vec<u8>>,
}

impl CaptureFrame {
    fn open(stack: OutputStack) -> Self {
        let saved = if stack.pending_len() > 0 { stack.pop() } else { None };
        let base_depth = stack.depth();
        stack.push();
        Self {
            stack,
            base_depth,
            saved,
            captured: None,
        }
    }

    /// Close the frame and return its content.
    pub fn finish(mut self) -> Vec<u8> {
        self.unwind();
        self.captured.take().unwrap_or_default()
    }

    /// Pop everything above the base depth; keep the frame we pushed.
    fn unwind(&mut self) {
        while self.stack.depth() > self.base_depth + 1 {
            self.stack.pop();
        }
        if self.stack.depth() == self.base_depth + 1 {
            self.captured = self.stack.pop();
        }
    }
}

impl Drop for CaptureFrame {
    fn drop(&mut self) {
        if self.stack.depth() > self.base_depth {
            self.unwind();
        }
        if let Some(saved) = self.saved.take() {
            self.stack.push();
            self.stack.write(&saved);
        }
    }
}
