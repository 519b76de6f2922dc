//! Output sinks and scoped output interception.
//!
//! Phase bodies never write to stdout directly: they receive a [`SharedOutput`]
//! handle. During interception that handle points at a fresh [`OutputBuffer`];
//! otherwise it is the caller's real sink. A failing body gets its captured
//! output replayed between `begin`/`end` banners, a passing body's output is
//! dropped.
//!
//! Sinks are `Rc<RefCell<_>>` based and therefore single-threaded, matching the
//! harness's one logical thread of control.

use std::cell::RefCell;
use std::fmt;
use std::io::Write as _;
use std::rc::Rc;

// ============================================================================
// OUTPUT SINKS
// ============================================================================

/// Destination for harness and test-body text.
pub trait OutputSink {
    fn write_str(&mut self, text: &str);
}

/// Collects output into a String.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    pub buffer: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl OutputSink for OutputBuffer {
    fn write_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}

/// Writes to the process stdout, flushing so partial status lines show up
/// before a long-running body starts.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_str(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Discards everything. Used to suppress reconciliation chatter.
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_str(&mut self, _text: &str) {}
}

/// Ergonomic wrapper for shared, mutable output sinks.
#[derive(Clone)]
pub struct SharedOutput(pub Rc<RefCell<dyn OutputSink>>);

impl SharedOutput {
    /// Create a new SharedOutput from any OutputSink.
    pub fn new<T: OutputSink + 'static>(sink: T) -> Self {
        SharedOutput(Rc::new(RefCell::new(sink)))
    }

    pub fn stdout() -> Self {
        Self::new(StdoutSink)
    }

    pub fn null() -> Self {
        Self::new(NullSink)
    }

    /// A fresh in-memory sink together with a handle to read it back.
    pub fn buffer() -> (Self, Rc<RefCell<OutputBuffer>>) {
        let buffer = Rc::new(RefCell::new(OutputBuffer::new()));
        (SharedOutput(buffer.clone()), buffer)
    }

    pub fn write(&self, text: &str) {
        self.0.borrow_mut().write_str(text);
    }

    pub fn line(&self, text: &str) {
        let mut sink = self.0.borrow_mut();
        sink.write_str(text);
        sink.write_str("\n");
    }
}

impl fmt::Write for SharedOutput {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

impl fmt::Debug for SharedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedOutput")
    }
}

// ============================================================================
// INTERCEPTION
// ============================================================================

/// Run `body` with its output captured unless `verbose` is set.
///
/// The error returned by `body` is passed through untouched; only the captured
/// output is replayed, and only when there is some.
pub fn with_capture<T, E, F>(name: &str, verbose: bool, out: &SharedOutput, body: F) -> Result<T, E>
where
    F: FnOnce(&SharedOutput) -> Result<T, E>,
{
    let (result, captured) = capture(verbose, out, body);
    if let Some(captured) = captured {
        replay_captured(name, &captured, out);
    }
    result
}

/// Capture step of [`with_capture`], for callers that must print their own
/// status line before the captured output is replayed. The captured text is
/// returned only when `body` failed.
pub fn capture<T, E, F>(verbose: bool, out: &SharedOutput, body: F) -> (Result<T, E>, Option<String>)
where
    F: FnOnce(&SharedOutput) -> Result<T, E>,
{
    if verbose {
        return (body(out), None);
    }

    let (sink, buffer) = SharedOutput::buffer();
    let result = body(&sink);
    let captured = match result {
        Ok(_) => None,
        Err(_) => Some(std::mem::take(&mut buffer.borrow_mut().buffer)),
    };
    (result, captured)
}

/// Print captured output between labeled banners.
pub fn replay_captured(name: &str, captured: &str, out: &SharedOutput) {
    if captured.is_empty() {
        return;
    }
    let extra_cr = if captured.ends_with('\n') { "" } else { "\n" };
    out.line(&format!(
        "================== {}() output begin =================\n{}{}=================== {}() output end ==================\n",
        name, captured, extra_cr, name
    ));
}
