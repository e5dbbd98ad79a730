//! Output sinks.
//!
//! An [`OutputSink`] receives `begin(dim)`, then `emit(t, y)` once per
//! output point in increasing time, then `end()`. Sinks are attached to
//! a solver through an [`OutputModule`](crate::OutputModule), which
//! decides which points to emit.

use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Errors raised by an [`OutputSink`].
#[derive(Debug)]
pub enum SinkError {
    /// The underlying writer failed.
    Io(io::Error),
    /// A point of the wrong length was emitted.
    DimensionMismatch {
        /// Length announced by `begin`.
        expected: usize,
        /// Length of the emitted point.
        found: usize,
    },
    /// Shared storage was poisoned by a panicking thread.
    Poisoned,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DimensionMismatch { expected, found } => {
                write!(f, "point of length {found}, expected {expected}")
            }
            Self::Poisoned => write!(f, "sink storage poisoned"),
        }
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Push-style consumer of output points.
pub trait OutputSink: Send {
    /// Called once before the first point with the state dimension.
    fn begin(&mut self, dim: usize) -> Result<(), SinkError>;

    /// Receive one output point.
    fn emit(&mut self, t: f64, y: &[f64]) -> Result<(), SinkError>;

    /// Called once after the last point.
    fn end(&mut self) -> Result<(), SinkError>;
}

// ── MemorySink ─────────────────────────────────────────────────

/// Output points collected in memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Solution {
    /// Output times.
    pub times: Vec<f64>,
    /// States, one per time.
    pub values: Vec<Vec<f64>>,
}

impl Solution {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether no point was recorded.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// The last recorded point.
    pub fn last(&self) -> Option<(f64, &[f64])> {
        Some((*self.times.last()?, self.values.last()?.as_slice()))
    }
}

/// Collects points into a shared [`Solution`].
///
/// Clones share storage: keep one clone, hand the other to the solver,
/// and read the result after the run.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    solution: Arc<Mutex<Solution>>,
    dim: usize,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything collected so far.
    pub fn solution(&self) -> Solution {
        self.solution
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl OutputSink for MemorySink {
    fn begin(&mut self, dim: usize) -> Result<(), SinkError> {
        self.dim = dim;
        let mut s = self.solution.lock().map_err(|_| SinkError::Poisoned)?;
        s.times.clear();
        s.values.clear();
        Ok(())
    }

    fn emit(&mut self, t: f64, y: &[f64]) -> Result<(), SinkError> {
        if y.len() != self.dim {
            return Err(SinkError::DimensionMismatch {
                expected: self.dim,
                found: y.len(),
            });
        }
        let mut s = self.solution.lock().map_err(|_| SinkError::Poisoned)?;
        s.times.push(t);
        s.values.push(y.to_vec());
        Ok(())
    }

    fn end(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

// ── TextSink ───────────────────────────────────────────────────

/// Writes one line per point: the time, then each state component,
/// separated by single spaces.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and callers can
/// use `BufWriter<File>`.
pub struct TextSink<W: Write + Send> {
    writer: W,
    lines: u64,
}

impl<W: Write + Send> TextSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Lines written so far.
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> OutputSink for TextSink<W> {
    fn begin(&mut self, _dim: usize) -> Result<(), SinkError> {
        Ok(())
    }

    fn emit(&mut self, t: f64, y: &[f64]) -> Result<(), SinkError> {
        write!(self.writer, "{t}")?;
        for v in y {
            write!(self.writer, " {v}")?;
        }
        writeln!(self.writer)?;
        self.lines += 1;
        Ok(())
    }

    fn end(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

// ── FanOut ─────────────────────────────────────────────────────

/// Forwards every call to each inner sink in order, stopping at the
/// first error.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn OutputSink>>,
}

impl FanOut {
    /// No sinks yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Box<dyn OutputSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of inner sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no inner sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl OutputSink for FanOut {
    fn begin(&mut self, dim: usize) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|s| s.begin(dim))
    }

    fn emit(&mut self, t: f64, y: &[f64]) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|s| s.emit(t, y))
    }

    fn end(&mut self) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|s| s.end())
    }
}
